use crate::{
    cmd,
    error::InstallerError,
    layout::{partition_path, Mountpoint, PartitionLayout},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountAction {
    Mount { device: String, target: String },
    Swap { device: String },
}

/// Mounts every partition of `layout` under `mnt`.
///
/// Mount order:
///   1. Root  → mnt
///   2. Other paths, shallowest first (mkdir -p before each)
///   3. Swap  → swapon
pub fn run(layout: &PartitionLayout, mnt: &str) -> Result<(), InstallerError> {
    for action in plan(layout, mnt) {
        match action {
            MountAction::Mount { device, target } => {
                cmd::run_with_spinner(
                    "mkdir",
                    &["-p", &target],
                    &format!("Creating {}…", target),
                    &format!("Directory {} ready.", target),
                )?;
                cmd::run_with_spinner(
                    "mount",
                    &[&device, &target],
                    &format!("Mounting {} → {}…", device, target),
                    &format!("{} mounted at {}.", device, target),
                )?;
            }
            MountAction::Swap { device } => {
                // Deactivate first in case a previous run left it on.
                cmd::run_best_effort("swapoff", &[&device]);
                cmd::run_with_spinner(
                    "swapon",
                    &[&device],
                    &format!("Activating swap on {}…", device),
                    &format!("Swap on {} activated.", device),
                )?;
            }
        }
    }
    Ok(())
}

/// Releases everything [`run`] set up. Errors are ignored.
pub fn teardown(layout: &PartitionLayout, mnt: &str) {
    for action in plan(layout, mnt) {
        if let MountAction::Swap { device } = action {
            cmd::run_best_effort("swapoff", &[&device]);
        }
    }
    cmd::run_best_effort("umount", &["-R", mnt]);
}

pub fn plan(layout: &PartitionLayout, mnt: &str) -> Vec<MountAction> {
    let mut mounts: Vec<(usize, MountAction)> = Vec::new();
    let mut swaps = Vec::new();

    for (n, p) in layout.numbered() {
        let device = partition_path(&layout.device, n);
        match p.mountpoint {
            Mountpoint::Swap => swaps.push(MountAction::Swap { device }),
            Mountpoint::Path(ref path) => {
                let depth = path.split('/').filter(|s| !s.is_empty()).count();
                let target = if path == "/" {
                    mnt.to_string()
                } else {
                    format!("{}{}", mnt.trim_end_matches('/'), path)
                };
                mounts.push((depth, MountAction::Mount { device, target }));
            }
        }
    }

    mounts.sort_by_key(|(depth, _)| *depth);
    mounts.into_iter().map(|(_, a)| a).chain(swaps).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_first_then_boot_then_swap() {
        let plan = plan(&PartitionLayout::default_for("/dev/sda"), "/mnt");
        assert_eq!(
            plan,
            [
                MountAction::Mount {
                    device: "/dev/sda3".into(),
                    target: "/mnt".into()
                },
                MountAction::Mount {
                    device: "/dev/sda1".into(),
                    target: "/mnt/boot".into()
                },
                MountAction::Swap {
                    device: "/dev/sda2".into()
                },
            ]
        );
    }

    #[test]
    fn nvme_names_and_trailing_slash() {
        let plan = plan(&PartitionLayout::default_for("/dev/nvme0n1"), "/target/");
        assert_eq!(
            plan[1],
            MountAction::Mount {
                device: "/dev/nvme0n1p1".into(),
                target: "/target/boot".into()
            }
        );
    }
}
