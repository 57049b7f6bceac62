use thiserror::Error;

use crate::layout::LayoutError;

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command '{0}' failed with exit code {1}")]
    CommandFailed(String, i32),

    #[error("Command '{0}' not found — is it installed?")]
    CommandNotFound(String),

    #[error("Installation cancelled by user")]
    Cancelled,

    #[error("This installer must be run as root (sudo)")]
    NotRoot,

    #[error("This installer requires a UEFI boot (no /sys/firmware/efi/efivars)")]
    NotUefi,

    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid partition layout: {0}")]
    Layout(#[from] LayoutError),

    #[error("Mirror selection failed: {0}")]
    Mirror(String),

    #[error("Target device {0}: {1}")]
    Device(String, String),

    #[error("Could not serialize configuration: {0}")]
    Json(#[from] serde_json::Error),
}
