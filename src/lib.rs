//! Unattended Arch Linux + Hyprland installer.
//!
//! [`provision`] drives the install through the [`session::InstallerSession`]
//! and [`mirror::MirrorSelector`] traits; [`arch`] and [`steps`] implement
//! them with the standard Arch install tools.

pub mod arch;
pub mod batch;
pub mod cmd;
pub mod config;
pub mod error;
pub mod layout;
pub mod lsblk;
pub mod mirror;
pub mod provision;
pub mod session;
pub mod steps;
pub mod ui;

use std::sync::atomic::{AtomicBool, Ordering};

// ── Global run flags ──────────────────────────────────────────────────────────

/// When `true`, no system command is actually executed.
/// All shell operations are simulated with a short delay.
/// Set by passing `--dry-run` on the command line.
pub static DRY_RUN: AtomicBool = AtomicBool::new(false);

/// When `true`, confirmation prompts are skipped (`--yes`).
pub static ASSUME_YES: AtomicBool = AtomicBool::new(false);

#[inline]
pub fn is_dry_run() -> bool {
    DRY_RUN.load(Ordering::Relaxed)
}

#[inline]
pub fn is_assume_yes() -> bool {
    ASSUME_YES.load(Ordering::Relaxed)
}
