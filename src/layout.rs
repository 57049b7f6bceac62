use std::{collections::BTreeSet, fmt};

use serde::{Serialize, Serializer};
use thiserror::Error;

// ── Units ─────────────────────────────────────────────────────────────────────

pub const MIB: u64 = 1024 * 1024;

/// First usable MiB; the GPT header and alignment gap live before it.
pub const ALIGNMENT_MIB: u64 = 1;

/// Space kept free at the end of the disk for the backup GPT header.
pub const GPT_TAIL_MIB: u64 = 1;

/// Smallest acceptable size for a partition that takes the remaining space.
pub const MIN_REMAINING_MIB: u64 = 1024;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("layout for {0} has no partitions")]
    Empty(String),

    #[error("partition {0} starts inside the partition table area")]
    StartsInPartitionTable(usize),

    #[error("partition {0} has a size of zero")]
    ZeroSize(usize),

    #[error("partition {0} starts before partition {1}")]
    Unordered(usize, usize),

    #[error("partitions {0} and {1} overlap")]
    Overlap(usize, usize),

    #[error("only the last partition may take the remaining space (partition {0} does not)")]
    RemainingNotLast(usize),

    #[error("more than one EFI system partition")]
    MultipleEsp,

    #[error("expected exactly one partition mounted at /, found {0}")]
    RootMount(usize),

    #[error("partition {0} ends past the addressable range")]
    OutOfRange(usize),

    #[error("device holds {capacity_mib} MiB but the layout needs at least {required_mib} MiB")]
    TooSmall { required_mib: u64, capacity_mib: u64 },
}

// ── Partition attributes ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Filesystem {
    #[serde(rename = "vfat")]
    Vfat,
    #[serde(rename = "linux-swap")]
    LinuxSwap,
    #[serde(rename = "ext4")]
    Ext4,
}

impl Filesystem {
    pub fn as_str(self) -> &'static str {
        match self {
            Filesystem::Vfat => "vfat",
            Filesystem::LinuxSwap => "linux-swap",
            Filesystem::Ext4 => "ext4",
        }
    }

    /// `sgdisk` type code for a partition holding this filesystem.
    pub fn gpt_type_code(self) -> &'static str {
        match self {
            Filesystem::Vfat => "ef00",
            Filesystem::LinuxSwap => "8200",
            Filesystem::Ext4 => "8300",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionFlag {
    Boot,
    Esp,
}

/// How much of the disk a partition occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Mib(u64),
    /// Everything from the start offset to the end of the disk (`100%`).
    Remaining,
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Size::Mib(n) if *n >= 1024 && n % 1024 == 0 => write!(f, "{}G", n / 1024),
            Size::Mib(n) => write!(f, "{}M", n),
            Size::Remaining => f.write_str("100%"),
        }
    }
}

impl Serialize for Size {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mountpoint {
    Path(String),
    Swap,
}

impl Mountpoint {
    pub fn path(p: impl Into<String>) -> Self {
        Mountpoint::Path(p.into())
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Mountpoint::Path(p) if p == "/")
    }
}

impl fmt::Display for Mountpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mountpoint::Path(p) => f.write_str(p),
            Mountpoint::Swap => f.write_str("swap"),
        }
    }
}

impl Serialize for Mountpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ── Partition ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub start_mib: u64,
    pub size: Size,
    pub mountpoint: Mountpoint,
    pub fs_type: Filesystem,
    pub flags: BTreeSet<PartitionFlag>,
}

impl Partition {
    pub fn new(start_mib: u64, size: Size, mountpoint: Mountpoint, fs_type: Filesystem) -> Self {
        Self {
            start_mib,
            size,
            mountpoint,
            fs_type,
            flags: BTreeSet::new(),
        }
    }

    pub fn with_flags(mut self, flags: &[PartitionFlag]) -> Self {
        self.flags.extend(flags.iter().copied());
        self
    }

    pub fn is_esp(&self) -> bool {
        self.flags.contains(&PartitionFlag::Esp)
    }

    /// Exclusive end offset, or `None` for a partition that runs to the end of the disk.
    /// `number` names the partition in the overflow error.
    pub fn end_mib(&self, number: usize) -> Result<Option<u64>, LayoutError> {
        match self.size {
            Size::Mib(n) => self
                .start_mib
                .checked_add(n)
                .map(Some)
                .ok_or(LayoutError::OutOfRange(number)),
            Size::Remaining => Ok(None),
        }
    }
}

// ── Layout ────────────────────────────────────────────────────────────────────

/// Ordered partitions of one device, laid out start to end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionLayout {
    pub device: String,
    pub partitions: Vec<Partition>,
}

impl PartitionLayout {
    /// The fixed layout:
    ///   p1 → /boot  1024M  vfat   (boot, esp)
    ///   p2 → swap   8G     linux-swap
    ///   p3 → /      rest   ext4
    pub fn default_for(device: impl Into<String>) -> Self {
        let boot = Partition::new(
            ALIGNMENT_MIB,
            Size::Mib(1024),
            Mountpoint::path("/boot"),
            Filesystem::Vfat,
        )
        .with_flags(&[PartitionFlag::Boot, PartitionFlag::Esp]);
        let swap = Partition::new(
            ALIGNMENT_MIB + 1024,
            Size::Mib(8 * 1024),
            Mountpoint::Swap,
            Filesystem::LinuxSwap,
        );
        let root = Partition::new(
            ALIGNMENT_MIB + 1024 + 8 * 1024,
            Size::Remaining,
            Mountpoint::path("/"),
            Filesystem::Ext4,
        );

        Self {
            device: device.into(),
            partitions: vec![boot, swap, root],
        }
    }

    /// Structural checks that do not depend on the device size.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.partitions.is_empty() {
            return Err(LayoutError::Empty(self.device.clone()));
        }

        for (i, p) in self.partitions.iter().enumerate() {
            let number = i + 1;
            if p.start_mib < ALIGNMENT_MIB {
                return Err(LayoutError::StartsInPartitionTable(number));
            }
            if p.size == Size::Mib(0) {
                return Err(LayoutError::ZeroSize(number));
            }
            p.end_mib(number)?;
        }

        for (i, pair) in self.partitions.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            let Some(prev_end) = prev.end_mib(i + 1)? else {
                return Err(LayoutError::RemainingNotLast(i + 1));
            };
            if next.start_mib < prev.start_mib {
                return Err(LayoutError::Unordered(i + 2, i + 1));
            }
            if next.start_mib < prev_end {
                return Err(LayoutError::Overlap(i + 1, i + 2));
            }
        }

        if self.partitions.iter().filter(|p| p.is_esp()).count() > 1 {
            return Err(LayoutError::MultipleEsp);
        }

        let roots = self.partitions.iter().filter(|p| p.mountpoint.is_root()).count();
        if roots != 1 {
            return Err(LayoutError::RootMount(roots));
        }

        Ok(())
    }

    /// `validate()` plus a check that every extent fits in `capacity_bytes`.
    pub fn validate_against(&self, capacity_bytes: u64) -> Result<(), LayoutError> {
        self.validate()?;

        let capacity_mib = capacity_bytes / MIB;
        let number = self.partitions.len();
        let last = &self.partitions[number - 1];
        let required_mib = match last.end_mib(number)? {
            Some(end) => Some(end),
            None => last.start_mib.checked_add(MIN_REMAINING_MIB),
        }
        .and_then(|end| end.checked_add(GPT_TAIL_MIB))
        .ok_or(LayoutError::OutOfRange(number))?;

        if required_mib > capacity_mib {
            return Err(LayoutError::TooSmall {
                required_mib,
                capacity_mib,
            });
        }
        Ok(())
    }

    /// 1-based partition numbers paired with their descriptors.
    pub fn numbered(&self) -> impl Iterator<Item = (u32, &Partition)> {
        self.partitions.iter().zip(1u32..).map(|(p, n)| (n, p))
    }
}

/// Kernel device name for partition `n` of `disk`.
///
/// `/dev/sda` → `/dev/sda1`, `/dev/nvme0n1` → `/dev/nvme0n1p1`.
pub fn partition_path(disk: &str, n: u32) -> String {
    if disk.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{}p{}", disk, n)
    } else {
        format!("{}{}", disk, n)
    }
}
