//! Individual installation steps, each driving one Arch tool.

pub mod chroot;
pub mod credentials;
pub mod format;
pub mod fstab;
pub mod mirrors;
pub mod mount;
pub mod ntp;
pub mod packages;
pub mod partition;
pub mod target;
pub mod uefi;
