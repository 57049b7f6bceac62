use console::style;
use dialoguer::Confirm;
use tracing::warn;

use crate::{
    config::InstallConfig,
    error::InstallerError,
    is_assume_yes, is_dry_run,
    layout::{partition_path, PartitionLayout},
    lsblk::{self, BlockDevice},
    ui,
};

/// Verifies the target device and asks for confirmation before it is wiped.
pub fn confirm(config: &InstallConfig) -> Result<(), InstallerError> {
    let device = inspect(&config.target)?;

    if !device.is_disk() {
        return Err(InstallerError::Device(
            device.path,
            format!("is a '{}', not a whole disk", device.kind),
        ));
    }
    if device.readonly {
        return Err(InstallerError::Device(device.path, "is read-only".into()));
    }

    config.partition_layout.validate_against(device.size_bytes)?;
    check_mounts(config)?;

    let size = device.display_size();
    println!();
    ui::print_kv_box(
        "Target",
        &[
            ("Device", device.path.as_str()),
            ("Size", size.as_str()),
            ("Model", device.model.as_str()),
        ],
    );
    println!();
    let rows = layout_rows(&config.partition_layout);
    let rows: Vec<(&str, &str)> = rows.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    ui::print_kv_box("Partition Layout", &rows);
    println!();
    println!(
        "  {}",
        style(format!("⚠  ALL DATA ON {} WILL BE PERMANENTLY ERASED.", device.path))
            .red()
            .bold()
    );
    println!();

    if is_assume_yes() {
        ui::print_warning("--yes given, not asking for confirmation.");
        return Ok(());
    }

    if !Confirm::new()
        .with_prompt(format!("Erase {} and install?", device.path))
        .default(false)
        .interact()?
    {
        return Err(InstallerError::Cancelled);
    }
    Ok(())
}

fn inspect(path: &str) -> Result<BlockDevice, InstallerError> {
    match lsblk::inspect(path) {
        Ok(dev) => Ok(dev),
        Err(e) if is_dry_run() => {
            // No such disk on a dev machine; pretend a 64 GiB one.
            warn!(error = %e, "dry-run: simulating target device");
            Ok(BlockDevice {
                path: path.to_string(),
                size_bytes: 64 * 1024 * 1024 * 1024,
                kind: "disk".into(),
                model: "simulated".into(),
                readonly: false,
            })
        }
        Err(e) => Err(e),
    }
}

/// Leftovers under our own mountpoint are torn down later; anything else
/// mounted from the target (e.g. the live medium) is a hard stop.
fn check_mounts(config: &InstallConfig) -> Result<(), InstallerError> {
    let mounts = match lsblk::mounted_on(&config.target) {
        Ok(m) => m,
        Err(_) if is_dry_run() => return Ok(()),
        Err(e) => return Err(e),
    };

    let (ours, foreign): (Vec<String>, Vec<String>) = mounts
        .into_iter()
        .partition(|m| is_within(m, &config.mountpoint) || m == "[SWAP]");

    if !foreign.is_empty() {
        return Err(InstallerError::Device(
            config.target.clone(),
            format!("has mounted filesystems: {}", foreign.join(", ")),
        ));
    }
    if !ours.is_empty() {
        ui::print_warning(&format!(
            "{} is still mounted from a previous run; it will be unmounted.",
            ours.join(", ")
        ));
    }
    Ok(())
}

fn is_within(path: &str, root: &str) -> bool {
    let root = root.trim_end_matches('/');
    path == root || path.starts_with(&format!("{}/", root))
}

fn layout_rows(layout: &PartitionLayout) -> Vec<(String, String)> {
    layout
        .numbered()
        .map(|(n, p)| {
            (
                p.mountpoint.to_string(),
                format!(
                    "{}  {}  {}",
                    partition_path(&layout.device, n),
                    p.size,
                    p.fs_type.as_str()
                ),
            )
        })
        .collect()
}
