use crate::{
    cmd,
    error::InstallerError,
    layout::{partition_path, Filesystem, PartitionLayout},
};

/// Creates the filesystem of every partition in `layout`.
pub fn run(layout: &PartitionLayout) -> Result<(), InstallerError> {
    for (n, p) in layout.numbered() {
        let path = partition_path(&layout.device, n);
        let (program, args) = mkfs_command(p.fs_type, &path);
        cmd::run_with_spinner(
            program,
            &args,
            &format!("Formatting {} as {}…", path, p.fs_type.as_str()),
            &format!("{} formatted as {} ({}).", path, p.fs_type.as_str(), p.mountpoint),
        )?;
    }
    Ok(())
}

/// Program and arguments that format `path` as `fs`.
pub fn mkfs_command(fs: Filesystem, path: &str) -> (&'static str, Vec<&str>) {
    match fs {
        Filesystem::Vfat => ("mkfs.fat", vec!["-F32", "-n", "EFI", path]),
        Filesystem::LinuxSwap => ("mkswap", vec!["-L", "swap", path]),
        // -F: the device may still carry an old signature.
        Filesystem::Ext4 => ("mkfs.ext4", vec!["-F", "-L", "root", path]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mkfs_per_filesystem() {
        assert_eq!(
            mkfs_command(Filesystem::Vfat, "/dev/sda1"),
            ("mkfs.fat", vec!["-F32", "-n", "EFI", "/dev/sda1"])
        );
        assert_eq!(mkfs_command(Filesystem::LinuxSwap, "/dev/sda2").0, "mkswap");
        assert_eq!(
            mkfs_command(Filesystem::Ext4, "/dev/sda3"),
            ("mkfs.ext4", vec!["-F", "-L", "root", "/dev/sda3"])
        );
    }
}
