use std::path::PathBuf;

/// The installer's on-disk layout (spec §3 "Path layout"), passed explicitly
/// into every operation rather than read from process-wide mutable state
/// (spec §9 Design Notes: "Global configuration in the source").
#[derive(Debug, Clone)]
pub struct PathConfig {
    /// `<opt>` — the installer-managed root, e.g. `/opt/piri`.
    pub opt_dir: PathBuf,
    /// `/etc/<host-units>` — where the host supervisor looks for unit files.
    pub host_units_dir: PathBuf,
    /// `<path-symlink>` — a PATH-convenience symlink to `bin/current/<binary>`.
    pub path_symlink: PathBuf,
    /// Where the privilege-escalation rule is written (e.g. a sudoers.d file).
    pub sudoers_path: PathBuf,
    pub binary_name: String,
    pub config_name: String,
    pub service_user: String,
    pub main_unit: String,
    pub update_timer_unit: String,
    pub supervisor_cli: PathBuf,
}

impl PathConfig {
    pub fn bin_dir(&self, version: &str) -> PathBuf {
        self.opt_dir.join("bin").join(version)
    }

    pub fn bin_current(&self) -> PathBuf {
        self.opt_dir.join("bin").join("current")
    }

    pub fn bin_path(&self, version: &str) -> PathBuf {
        self.bin_dir(version).join(&self.binary_name)
    }

    pub fn systemd_dir(&self, version: &str) -> PathBuf {
        self.opt_dir.join("systemd").join(version)
    }

    pub fn systemd_current(&self) -> PathBuf {
        self.opt_dir.join("systemd").join("current")
    }

    pub fn etc_dir(&self) -> PathBuf {
        self.opt_dir.join("etc")
    }

    pub fn config_path(&self) -> PathBuf {
        self.etc_dir().join(&self.config_name)
    }

    pub fn host_unit_path(&self, unit_file_name: &str) -> PathBuf {
        self.host_units_dir.join(unit_file_name)
    }

    /// The exact single-unit sudoers rule form (spec §6): the service user
    /// may restart exactly the one main unit, nothing else.
    pub fn privilege_escalation_rule(&self) -> String {
        format!(
            "{} ALL=(root) NOPASSWD: {} restart {}\n",
            self.service_user,
            self.supervisor_cli.display(),
            self.main_unit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> PathConfig {
        PathConfig {
            opt_dir: PathBuf::from("/opt/piri"),
            host_units_dir: PathBuf::from("/etc/systemd/system"),
            path_symlink: PathBuf::from("/usr/local/bin/piri"),
            sudoers_path: PathBuf::from("/etc/sudoers.d/piri"),
            binary_name: "piri".to_string(),
            config_name: "piri.toml".to_string(),
            service_user: "piri".to_string(),
            main_unit: "piri.service".to_string(),
            update_timer_unit: "piri-update.timer".to_string(),
            supervisor_cli: PathBuf::from("/usr/bin/systemctl"),
        }
    }

    #[test]
    fn layout_matches_spec_convention() {
        let p = paths();
        assert_eq!(p.bin_dir("1.0.0"), PathBuf::from("/opt/piri/bin/1.0.0"));
        assert_eq!(p.bin_current(), PathBuf::from("/opt/piri/bin/current"));
        assert_eq!(p.bin_path("1.0.0"), PathBuf::from("/opt/piri/bin/1.0.0/piri"));
        assert_eq!(p.systemd_current(), PathBuf::from("/opt/piri/systemd/current"));
        assert_eq!(p.config_path(), PathBuf::from("/opt/piri/etc/piri.toml"));
        assert_eq!(p.host_unit_path("piri.service"), PathBuf::from("/etc/systemd/system/piri.service"));
    }

    #[test]
    fn privilege_escalation_rule_names_exactly_one_unit() {
        let p = paths();
        assert_eq!(
            p.privilege_escalation_rule(),
            "piri ALL=(root) NOPASSWD: /usr/bin/systemctl restart piri.service\n"
        );
    }
}
