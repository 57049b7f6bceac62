use serde::Serialize;

use crate::error::InstallerError;

/// Ranked package-repository endpoints, fastest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorRegion {
    /// Human-readable summary of how the mirrors were picked.
    pub description: String,
    pub servers: Vec<String>,
}

impl MirrorRegion {
    /// Parses a pacman `mirrorlist`, keeping active `Server = …` lines in order.
    pub fn from_mirrorlist(description: impl Into<String>, content: &str) -> Self {
        let servers = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.starts_with('#'))
            .filter_map(|l| {
                let (key, val) = l.split_once('=')?;
                (key.trim() == "Server").then(|| val.trim().to_string())
            })
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            description: description.into(),
            servers,
        }
    }

    /// Renders the region back into `mirrorlist` format.
    pub fn to_mirrorlist(&self) -> String {
        let mut out = format!("# {}\n", self.description);
        for s in &self.servers {
            out.push_str(&format!("Server = {}\n", s));
        }
        out
    }
}

/// Picks the fastest mirrors for the package bootstrap.
pub trait MirrorSelector {
    fn select_fastest(&mut self) -> Result<MirrorRegion, InstallerError>;
}
