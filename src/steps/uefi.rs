use std::path::Path;

use crate::{error::InstallerError, is_dry_run, ui};

/// Ensures the live system booted in UEFI mode by checking the presence of
/// `/sys/firmware/efi/efivars`. GRUB is installed with the EFI target.
///
/// In dry-run mode the path won't exist on most dev machines,
/// so we simulate a UEFI result so the full flow can be exercised.
pub fn check() -> Result<(), InstallerError> {
    let is_uefi = is_dry_run() || Path::new("/sys/firmware/efi/efivars").exists();

    if !is_uefi {
        ui::print_error("BIOS/Legacy mode detected — no EFI variables found.");
        return Err(InstallerError::NotUefi);
    }

    ui::print_success("UEFI mode detected — EFI system partition will be created.");
    Ok(())
}
