use crate::{
    cmd,
    error::InstallerError,
    layout::{partition_path, Mountpoint, PartitionLayout, Size},
};

/// Wipes the partition table of `layout.device` and recreates it from `layout`.
pub fn run(layout: &PartitionLayout) -> Result<(), InstallerError> {
    let disk = layout.device.as_str();

    cmd::run_with_spinner(
        "sgdisk",
        &["--zap-all", disk],
        &format!("Wiping partition table on {}…", disk),
        &format!("Partition table on {} wiped.", disk),
    )?;

    for (n, args) in create_args(layout) {
        let mut argv: Vec<&str> = args.iter().map(String::as_str).collect();
        argv.push(disk);
        let path = partition_path(disk, n);
        cmd::run_with_spinner(
            "sgdisk",
            &argv,
            &format!("Creating {}…", path),
            &format!("{} created.", path),
        )?;
    }

    // The kernel has to see the new table before mkfs can open the partitions.
    cmd::run_with_spinner(
        "partprobe",
        &[disk],
        "Re-reading partition table…",
        "Kernel partition table updated.",
    )?;
    cmd::run_best_effort("udevadm", &["settle"]);

    Ok(())
}

/// `sgdisk` arguments (without the disk) for every partition, numbered from 1.
pub fn create_args(layout: &PartitionLayout) -> Vec<(u32, Vec<String>)> {
    layout
        .numbered()
        .map(|(n, p)| {
            let end = match p.size {
                Size::Mib(mib) => format!("+{}M", mib),
                Size::Remaining => "0".to_string(),
            };
            (
                n,
                vec![
                    format!("--new={}:{}M:{}", n, p.start_mib, end),
                    format!("--typecode={}:{}", n, p.fs_type.gpt_type_code()),
                    format!("--change-name={}:{}", n, label(&p.mountpoint, p.is_esp())),
                ],
            )
        })
        .collect()
}

fn label(mountpoint: &Mountpoint, esp: bool) -> String {
    match mountpoint {
        _ if esp => "EFI".to_string(),
        Mountpoint::Swap => "swap".to_string(),
        Mountpoint::Path(p) if p == "/" => "root".to_string(),
        Mountpoint::Path(p) => p.trim_start_matches('/').replace('/', "-"),
    }
}
