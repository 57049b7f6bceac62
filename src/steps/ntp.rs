use crate::{cmd, error::InstallerError, ui};

/// Enables NTP on the live system.
/// An incorrect clock can cause package-signature validation to fail.
pub fn run() -> Result<(), InstallerError> {
    ui::print_info("An accurate clock prevents package-signature validation errors.");

    cmd::run_with_spinner(
        "timedatectl",
        &["set-ntp", "true"],
        "Enabling NTP time synchronization…",
        "System clock synchronized.",
    )
}
