//! Renders the systemd unit files an install/update cycle writes (spec
//! §4.4 steps 5/9). The installer only needs rendered bytes and a
//! destination file name (`piri_installer::UnitRenderer`); this is the one
//! production renderer, filling in the template the corpus otherwise
//! leaves abstract.
//!
//! Three units come out of one render: the main service, an update timer,
//! and the oneshot service the timer activates. The timer's companion unit
//! follows systemd's own default-unit convention (same basename, `.timer`
//! swapped for `.service`) rather than inventing a naming scheme.

use piri_installer::{PathConfig, UnitFile, UnitRenderer};

pub struct SystemdUnitRenderer;

impl SystemdUnitRenderer {
    fn main_service(&self, version: &str, paths: &PathConfig) -> UnitFile {
        let contents = format!(
            "[Unit]\n\
             Description=Piri storage provider node\n\
             After=network-online.target\n\
             Wants=network-online.target\n\
             \n\
             [Service]\n\
             Type=simple\n\
             User={user}\n\
             ExecStart={bin} serve --config {config}\n\
             Restart=on-failure\n\
             RestartSec=5\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            user = paths.service_user,
            bin = paths.bin_path(version).display(),
            config = paths.config_path().display(),
        );
        UnitFile { file_name: paths.main_unit.clone(), contents }
    }

    fn update_timer(&self, paths: &PathConfig) -> UnitFile {
        let contents = "[Unit]\n\
             Description=Periodic check for Piri updates\n\
             \n\
             [Timer]\n\
             OnCalendar=*-*-* *:00:00\n\
             RandomizedDelaySec=600\n\
             Persistent=true\n\
             \n\
             [Install]\n\
             WantedBy=timers.target\n"
            .to_string();
        UnitFile { file_name: paths.update_timer_unit.clone(), contents }
    }

    fn update_timer_service_name(&self, paths: &PathConfig) -> String {
        paths.update_timer_unit.trim_end_matches(".timer").to_string() + ".service"
    }

    fn update_service(&self, version: &str, paths: &PathConfig) -> UnitFile {
        let contents = format!(
            "[Unit]\n\
             Description=Run a Piri managed-update cycle\n\
             \n\
             [Service]\n\
             Type=oneshot\n\
             User={user}\n\
             ExecStart={bin} update --config {config}\n",
            user = paths.service_user,
            bin = paths.bin_path(version).display(),
            config = paths.config_path().display(),
        );
        UnitFile { file_name: self.update_timer_service_name(paths), contents }
    }
}

impl UnitRenderer for SystemdUnitRenderer {
    fn render(&self, version: &str, paths: &PathConfig) -> Vec<UnitFile> {
        vec![self.main_service(version, paths), self.update_timer(paths), self.update_service(version, paths)]
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

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
    fn renders_main_timer_and_companion_units() {
        let units = SystemdUnitRenderer.render("1.0.0", &paths());
        let names: Vec<&str> = units.iter().map(|u| u.file_name.as_str()).collect();
        assert_eq!(names, vec!["piri.service", "piri-update.timer", "piri-update.service"]);
    }

    #[test]
    fn main_service_runs_serve_with_rendered_paths() {
        let units = SystemdUnitRenderer.render("1.0.0", &paths());
        let main = units.iter().find(|u| u.file_name == "piri.service").unwrap();
        assert!(main.contents.contains("ExecStart=/opt/piri/bin/1.0.0/piri serve --config /opt/piri/etc/piri.toml"));
        assert!(main.contents.contains("User=piri"));
    }

    #[test]
    fn update_timer_is_persistent() {
        let units = SystemdUnitRenderer.render("1.0.0", &paths());
        let timer = units.iter().find(|u| u.file_name == "piri-update.timer").unwrap();
        assert!(timer.contents.contains("Persistent=true"));
    }

    #[test]
    fn update_service_invokes_update_subcommand() {
        let units = SystemdUnitRenderer.render("1.0.0", &paths());
        let svc = units.iter().find(|u| u.file_name == "piri-update.service").unwrap();
        assert!(svc.contents.contains("ExecStart=/opt/piri/bin/1.0.0/piri update --config /opt/piri/etc/piri.toml"));
    }
}
