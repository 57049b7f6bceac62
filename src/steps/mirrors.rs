use std::{env, fs, path::Path};

use crate::{
    cmd,
    error::InstallerError,
    is_dry_run,
    mirror::{MirrorRegion, MirrorSelector},
    ui,
};

const MIRRORLIST: &str = "/etc/pacman.d/mirrorlist";
const FALLBACK_MIRROR: &str = "https://geo.mirror.pkgbuild.com/$repo/os/$arch";

/// Ranks mirrors with `reflector` and saves them as the live system's
/// mirrorlist, which `pacstrap` then copies into the target.
pub struct ReflectorMirrors {
    latest: u32,
    save_to: String,
}

impl ReflectorMirrors {
    pub fn new() -> Self {
        let save_to = if is_dry_run() {
            env::temp_dir()
                .join("hyprarch-mirrorlist")
                .to_string_lossy()
                .into_owned()
        } else {
            MIRRORLIST.to_string()
        };
        Self { latest: 20, save_to }
    }

    fn args(&self) -> Vec<String> {
        vec![
            "--latest".into(),
            self.latest.to_string(),
            "--protocol".into(),
            "https".into(),
            "--sort".into(),
            "rate".into(),
            "--save".into(),
            self.save_to.clone(),
        ]
    }

    fn description(&self) -> String {
        format!("{} most recently synced, ranked by rate", self.latest)
    }
}

impl Default for ReflectorMirrors {
    fn default() -> Self {
        Self::new()
    }
}

impl MirrorSelector for ReflectorMirrors {
    fn select_fastest(&mut self) -> Result<MirrorRegion, InstallerError> {
        if is_dry_run() {
            // Reuse whatever the host has; reflector hits the network for minutes.
            let existing = fs::read_to_string(MIRRORLIST).unwrap_or_default();
            let mut region = MirrorRegion::from_mirrorlist("host mirrorlist (dry-run)", &existing);
            if region.servers.is_empty() {
                region.servers.push(FALLBACK_MIRROR.to_string());
            }
            ui::print_warning("Dry-run: skipping reflector, using the host mirrorlist.");
            return Ok(region);
        }

        let args = self.args();
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        cmd::run_with_spinner(
            "reflector",
            &argv,
            "Running reflector to rank the fastest mirrors…",
            &format!("Mirrorlist saved to {}.", self.save_to),
        )?;

        let content = fs::read_to_string(&self.save_to)?;
        let region = MirrorRegion::from_mirrorlist(self.description(), &content);
        if region.servers.is_empty() {
            return Err(InstallerError::Mirror(format!(
                "reflector wrote no servers to {}",
                self.save_to
            )));
        }
        Ok(region)
    }
}

/// Writes the recorded mirrors as the installed system's mirrorlist, so
/// later `pacman` runs in the target use the ranked servers.
pub fn write_target(mnt: &str, region: &MirrorRegion) -> Result<(), InstallerError> {
    let path = Path::new(mnt).join(MIRRORLIST.trim_start_matches('/'));
    tracing::debug!(path = %path.display(), servers = region.servers.len(), "write mirrorlist");
    if is_dry_run() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, region.to_mirrorlist())?;
    ui::print_success(&format!("{} mirrors written to {}.", region.servers.len(), path.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflector_arguments() {
        let m = ReflectorMirrors {
            latest: 20,
            save_to: "/tmp/mirrorlist".into(),
        };
        assert_eq!(
            m.args(),
            ["--latest", "20", "--protocol", "https", "--sort", "rate", "--save", "/tmp/mirrorlist"]
        );
        assert!(m.description().contains("20"));
    }

    #[test]
    fn recorded_region_becomes_target_mirrorlist() {
        let dir = tempfile::tempdir().unwrap();
        let region = MirrorRegion {
            description: "ranked".into(),
            servers: vec!["https://a.example/$repo/os/$arch".into()],
        };
        write_target(dir.path().to_str().unwrap(), &region).unwrap();

        let written = fs::read_to_string(dir.path().join("etc/pacman.d/mirrorlist")).unwrap();
        assert_eq!(MirrorRegion::from_mirrorlist("x", &written).servers, region.servers);
    }
}
