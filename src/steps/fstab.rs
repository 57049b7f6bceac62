use crate::{cmd, error::InstallerError, is_dry_run, ui};

/// Generates `<mnt>/etc/fstab` using UUIDs via `genfstab`.
///
/// Equivalent to: `genfstab -U /mnt >> /mnt/etc/fstab`
pub fn generate(mnt: &str) -> Result<(), InstallerError> {
    let etc = format!("{}/etc", mnt);
    let fstab = format!("{}/fstab", etc);

    // pacstrap creates <mnt>/etc, but guard just in case.
    if !is_dry_run() {
        std::fs::create_dir_all(&etc)?;
    }

    let pb = ui::spinner(format!("Generating {} (UUID-based)…", fstab));
    let result = cmd::run_append_to_file("genfstab", &["-U", mnt], &fstab);

    if result.is_ok() {
        ui::done_spinner(pb, &format!("fstab written to {}.", fstab));
    } else {
        pb.finish_and_clear();
    }

    result
}
