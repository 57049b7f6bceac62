use std::{fs, path::Path};

use tracing::info;

use crate::{
    batch::CommandBatch,
    cmd,
    config::InstallConfig,
    error::InstallerError,
    is_dry_run,
    layout::PartitionLayout,
    session::InstallerSession,
    steps, ui,
};

/// Directory (inside the target) that receives the configuration copy.
pub const CONFIG_DIR: &str = "var/log/hyprarch";
pub const CONFIG_FILE: &str = "user_configuration.json";

/// [`InstallerSession`] backed by the Arch install tools on the live system.
pub struct ArchSession {
    target: String,
    mountpoint: String,
    /// Set once the layout is applied, for teardown.
    layout: Option<PartitionLayout>,
}

impl ArchSession {
    pub fn new(target: impl Into<String>, mountpoint: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            mountpoint: mountpoint.into(),
            layout: None,
        }
    }
}

impl InstallerSession for ArchSession {
    fn target(&self) -> &str {
        &self.target
    }

    fn mountpoint(&self) -> &str {
        &self.mountpoint
    }

    fn enter_layout(&mut self, layout: &PartitionLayout) -> Result<(), InstallerError> {
        if layout.device != self.target {
            return Err(InstallerError::Config(format!(
                "session is bound to {} but the layout targets {}",
                self.target, layout.device
            )));
        }
        info!(device = %self.target, "applying partition layout");

        // Anything left from a previous run would keep the device busy.
        steps::mount::teardown(layout, &self.mountpoint);
        self.layout = Some(layout.clone());

        steps::partition::run(layout)?;
        steps::format::run(layout)?;
        steps::mount::run(layout, &self.mountpoint)
    }

    fn leave_layout(&mut self, committed: bool) {
        cmd::run_best_effort("sync", &[]);
        if committed {
            return;
        }
        if let Some(ref layout) = self.layout {
            ui::print_warning(&format!("Releasing {} after a failed step.", self.mountpoint));
            steps::mount::teardown(layout, &self.mountpoint);
        }
    }

    fn setup_system_base(&mut self, config: &InstallConfig) -> Result<(), InstallerError> {
        steps::ntp::run()?;
        steps::packages::install(config)?;
        steps::mirrors::write_target(&self.mountpoint, &config.mirror_region)?;
        steps::fstab::generate(&self.mountpoint)
    }

    fn copy_config(&mut self, config: &InstallConfig) -> Result<(), InstallerError> {
        let dir = Path::new(&self.mountpoint).join(CONFIG_DIR);
        let path = dir.join(CONFIG_FILE);
        let json = config.to_json()?;

        if !is_dry_run() {
            fs::create_dir_all(&dir)?;
            fs::write(&path, json)?;
        }
        ui::print_success(&format!("Configuration copied to {}.", path.display()));
        Ok(())
    }

    fn bootstrap(&mut self, config: &InstallConfig) -> Result<(), InstallerError> {
        steps::chroot::configure(config)
    }

    fn add_service(&mut self, name: &str, enabled: bool) -> Result<(), InstallerError> {
        steps::chroot::set_service(&self.mountpoint, name, enabled)
    }

    fn execute(&mut self, batch: &CommandBatch) -> Result<(), InstallerError> {
        steps::chroot::execute(&self.mountpoint, batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Secret, mirror::MirrorRegion};

    fn config(mnt: &str) -> InstallConfig {
        InstallConfig::builder()
            .mountpoint(mnt)
            .mirror_region(MirrorRegion {
                description: "t".into(),
                servers: vec!["https://m.example/$repo/os/$arch".into()],
            })
            .root_password(Secret::new("hunter2"))
            .user_password("arch", Secret::new("swordfish"))
            .build()
            .unwrap()
    }

    #[test]
    fn copy_config_writes_secret_free_json() {
        let dir = tempfile::tempdir().unwrap();
        let mnt = dir.path().to_str().unwrap();
        let cfg = config(mnt);

        let mut session = ArchSession::new(cfg.target.clone(), mnt);
        session.copy_config(&cfg).unwrap();

        let written =
            fs::read_to_string(dir.path().join(CONFIG_DIR).join(CONFIG_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(json["target"], "/dev/sda");
        assert_eq!(json["keyboard_layout"], "jp106");
        assert_eq!(json["users"][0]["name"], "arch");
        assert_eq!(json["partition_layout"]["partitions"][0]["mountpoint"], "/boot");
        assert!(!written.contains("hunter2"));
        assert!(!written.contains("swordfish"));
    }

    #[test]
    fn refuses_layout_for_another_device() {
        let mut session = ArchSession::new("/dev/sda", "/mnt");
        let err = session
            .enter_layout(&PartitionLayout::default_for("/dev/sdb"))
            .unwrap_err();
        assert!(matches!(err, InstallerError::Config(_)));
    }
}
