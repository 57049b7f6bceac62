use std::collections::HashMap;

use crate::{cmd, error::InstallerError};

// ── Data types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    pub path: String,   // /dev/sda
    pub size_bytes: u64,
    pub kind: String,   // disk, part, loop, rom
    pub model: String,  // SAMSUNG SSD 870
    pub readonly: bool,
}

impl BlockDevice {
    pub fn is_disk(&self) -> bool {
        self.kind == "disk"
    }

    /// Size in GiB with one decimal, for display.
    pub fn display_size(&self) -> String {
        format!("{:.1} GiB", self.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Describes one block device (without its children).
pub fn inspect(path: &str) -> Result<BlockDevice, InstallerError> {
    let output = cmd::run_capture(
        "lsblk",
        &[
            "--pairs",
            "--bytes",
            "--nodeps",
            "--output",
            "NAME,SIZE,TYPE,MODEL,RO",
            path,
        ],
    )?;

    output
        .lines()
        .find_map(parse_device)
        .ok_or_else(|| InstallerError::Device(path.to_string(), "not reported by lsblk".into()))
}

/// Paths of mounted filesystems that live on `path` or its partitions.
pub fn mounted_on(path: &str) -> Result<Vec<String>, InstallerError> {
    let output = cmd::run_capture("lsblk", &["--pairs", "--output", "MOUNTPOINT", path])?;
    Ok(output
        .lines()
        .filter_map(|l| parse_pairs(l).remove("MOUNTPOINT"))
        .filter(|m| !m.is_empty())
        .collect())
}

fn parse_device(line: &str) -> Option<BlockDevice> {
    let mut m = parse_pairs(line);
    let name = m.remove("NAME")?;
    Some(BlockDevice {
        path: format!("/dev/{}", name),
        size_bytes: m.get("SIZE")?.parse().ok()?,
        kind: m.remove("TYPE").unwrap_or_default(),
        model: m
            .remove("MODEL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "—".to_string()),
        readonly: m.get("RO").map(String::as_str) == Some("1"),
    })
}

// ── lsblk --pairs parser ──────────────────────────────────────────────────────
//
// Each line looks like:   NAME="sda" SIZE="512110190592" TYPE="disk" MODEL="SAMSUNG SSD 870"

fn parse_pairs(line: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut rest = line.trim();

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].split_whitespace().last().unwrap_or("").to_string();
        rest = &rest[eq + 1..];

        if !rest.starts_with('"') {
            break;
        }
        rest = &rest[1..]; // skip opening "

        let Some(close) = rest.find('"') else { break };
        let value = rest[..close].to_string();
        rest = &rest[close + 1..]; // skip closing "

        if !key.is_empty() {
            map.insert(key, value);
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_disk_line() {
        let dev = parse_device(
            r#"NAME="sda" SIZE="512110190592" TYPE="disk" MODEL="Samsung SSD 870 EVO" RO="0""#,
        )
        .unwrap();
        assert_eq!(dev.path, "/dev/sda");
        assert_eq!(dev.size_bytes, 512_110_190_592);
        assert!(dev.is_disk());
        assert_eq!(dev.model, "Samsung SSD 870 EVO");
        assert!(!dev.readonly);
        assert_eq!(dev.display_size(), "476.9 GiB");
    }

    #[test]
    fn missing_model_and_readonly_flag() {
        let dev = parse_device(r#"NAME="sr0" SIZE="1073741824" TYPE="rom" MODEL="" RO="1""#).unwrap();
        assert_eq!(dev.model, "—");
        assert!(dev.readonly);
        assert!(!dev.is_disk());
    }

    #[test]
    fn rejects_unparseable_size() {
        assert_eq!(parse_device(r#"NAME="sda" SIZE="20G" TYPE="disk""#), None);
        assert_eq!(parse_device(""), None);
    }

    #[test]
    fn pair_parser_handles_empty_values() {
        let m = parse_pairs(r#"NAME="sda1" MOUNTPOINT="" PARTTYPENAME="EFI System""#);
        assert_eq!(m["NAME"], "sda1");
        assert_eq!(m["MOUNTPOINT"], "");
        assert_eq!(m["PARTTYPENAME"], "EFI System");
    }
}
