use tracing::{error, info};

use crate::{
    batch::{self, ShellMode},
    config::{InstallConfig, InstallConfigBuilder},
    error::InstallerError,
    mirror::MirrorSelector,
    session::{InstallerSession, LayoutScope},
};

/// Services enabled in the installed system, in this order.
pub const SERVICES: [&str; 4] = [
    "sddm.service",
    "iwd.service",
    "sshd.service",
    "bluetooth.service",
];

pub const TOTAL_STEPS: u8 = 6;

// ── Reporting ─────────────────────────────────────────────────────────────────

/// Where progress and the final messages go. The binary prints to the
/// terminal; tests record.
pub trait Reporter {
    fn step(&mut self, step: u8, title: &str);
    fn info(&mut self, msg: &str);
    fn success(&mut self, msg: &str);
    fn failure(&mut self, msg: &str);
    /// Closing instructions for the user.
    fn next_steps(&mut self, lines: &[String]);
}

// ── Outcome ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Bootstrap reported an error; nothing after it ran.
    BootstrapFailed(String),
}

// ── Phase 1: configuration ────────────────────────────────────────────────────

/// Ranks mirrors and freezes the configuration record.
pub fn prepare<M, R>(
    builder: InstallConfigBuilder,
    mirrors: &mut M,
    reporter: &mut R,
) -> Result<InstallConfig, InstallerError>
where
    M: MirrorSelector + ?Sized,
    R: Reporter + ?Sized,
{
    reporter.step(1, "Mirror Selection");
    reporter.info("Ranking mirrors by download rate…");
    let region = mirrors.select_fastest()?;
    info!(servers = region.servers.len(), "mirror region selected");
    reporter.success(&format!(
        "{} mirrors selected ({}).",
        region.servers.len(),
        region.description
    ));

    reporter.step(2, "Configuration");
    let config = builder.mirror_region(region).build()?;
    info!(
        device = %config.target,
        packages = config.custom_packages.len(),
        "configuration built"
    );
    reporter.success(&format!(
        "Configuration ready: {} on {}, {} packages.",
        config.hostname,
        config.target,
        config.custom_packages.len()
    ));

    Ok(config)
}

// ── Phase 2: installation ─────────────────────────────────────────────────────

/// Lays out the disk, bootstraps, and provisions the installed system.
///
/// Only a bootstrap failure is turned into an [`Outcome`]; every other
/// error is returned as-is and nothing is retried.
pub fn install<S, R>(
    config: &InstallConfig,
    session: &mut S,
    shell_mode: ShellMode,
    reporter: &mut R,
) -> Result<Outcome, InstallerError>
where
    S: InstallerSession + ?Sized,
    R: Reporter + ?Sized,
{
    if session.target() != config.target || session.mountpoint() != config.mountpoint {
        return Err(InstallerError::Config(format!(
            "session is bound to {} at {}, configuration targets {} at {}",
            session.target(),
            session.mountpoint(),
            config.target,
            config.mountpoint
        )));
    }
    let user = config
        .sudo_user()
        .map(|u| u.name.as_str())
        .ok_or_else(|| InstallerError::Config("configuration has no sudo user".into()))?;
    info!(device = session.target(), mountpoint = session.mountpoint(), "installing");

    reporter.step(4, "Disk Layout & Base System");
    {
        let mut scope = LayoutScope::enter(&mut *session, &config.partition_layout)?;
        scope.setup_system_base(config)?;
        scope.copy_config(config)?;
        scope.commit();
    }
    reporter.success("Base system installed.");

    reporter.step(5, "Bootstrap");
    if let Err(e) = session.bootstrap(config) {
        error!(error = %e, "bootstrap failed");
        reporter.failure(&format!("Installation failed: {}. Check the logs for details.", e));
        return Ok(Outcome::BootstrapFailed(e.to_string()));
    }
    reporter.success("System bootstrapped.");

    reporter.step(6, "Post-install Provisioning");
    for name in SERVICES {
        session.add_service(name, true)?;
        info!(service = name, "service enabled");
    }
    reporter.success(&format!("Enabled {}.", SERVICES.join(", ")));

    for b in [batch::aur_helper(user, shell_mode), batch::dotfiles(user, shell_mode)] {
        reporter.info(&format!("Running: {}…", b.label));
        session.execute(&b)?;
        reporter.success(&format!("{} done.", b.label));
    }

    reporter.success("Installation complete! Reboot into your new Hyprland system.");
    reporter.next_steps(&next_steps(user));
    Ok(Outcome::Completed)
}

/// Printed after a successful run.
pub fn next_steps(user: &str) -> Vec<String> {
    vec![
        "SDDM starts automatically. Select the \"Hyprland\" session at the login screen.".into(),
        format!(
            "1. Log in as \"{}\" with the password you entered. The default shell is now fish.",
            user
        ),
        format!(
            "2. Run the dotfiles setup script: /home/{}/dotfiles/install.sh",
            user
        ),
        "3. Install AUR apps, e.g.: yay -S quickshell obsidian".into(),
    ]
}
