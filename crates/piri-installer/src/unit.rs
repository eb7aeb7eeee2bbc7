use crate::paths::PathConfig;

/// One unit file to install: its file name under `systemd/<version>/` (and,
/// by symlink, under the host supervisor's unit directory) and its rendered
/// contents.
#[derive(Debug, Clone)]
pub struct UnitFile {
    pub file_name: String,
    pub contents: String,
}

/// Renders the unit files for a version (spec §4.4 step 5/9: "same
/// templates as install, parameterized by version and service user"). The
/// exact unit file contents are an external-collaborator concern (spec §1
/// Non-goals list wire protocols and ABIs as out of scope, and unit-file
/// wording is template detail of the same kind); the installer only needs
/// the rendered bytes and a destination file name.
pub trait UnitRenderer: Send + Sync {
    fn render(&self, version: &str, paths: &PathConfig) -> Vec<UnitFile>;
}

#[cfg(test)]
pub(crate) struct FixedUnitRenderer {
    pub units: Vec<UnitFile>,
}

#[cfg(test)]
impl UnitRenderer for FixedUnitRenderer {
    fn render(&self, _version: &str, _paths: &PathConfig) -> Vec<UnitFile> {
        self.units.clone()
    }
}
