use std::sync::atomic::Ordering;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use hyprarch_installer::{
    arch::ArchSession,
    batch::ShellMode,
    config::InstallConfig,
    error::InstallerError,
    is_dry_run,
    provision::{self, Outcome, Reporter},
    steps::{self, mirrors::ReflectorMirrors},
    ui::{self, ConsoleReporter},
    ASSUME_YES, DRY_RUN,
};

/// Wipes /dev/sda and installs Arch Linux with Hyprland, SDDM and fish.
#[derive(Debug, Parser)]
#[command(name = "hyprarch-installer", version, about)]
struct Cli {
    /// Simulate every command; nothing on disk is touched.
    #[arg(long)]
    dry_run: bool,

    /// Do not ask for confirmation before erasing the disk.
    #[arg(short = 'y', long)]
    yes: bool,

    /// Whether post-install commands share one shell or each get their own.
    #[arg(long, value_enum, default_value_t = ShellMode::Isolated)]
    shell_mode: ShellMode,

    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    DRY_RUN.store(cli.dry_run, Ordering::Relaxed);
    ASSUME_YES.store(cli.yes, Ordering::Relaxed);

    match run(&cli) {
        Ok(Outcome::Completed) => {}
        Ok(Outcome::BootstrapFailed(_)) => std::process::exit(1),
        Err(e) => {
            println!();
            ui::print_error(&format!("{}", e));
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<Outcome, InstallerError> {
    // ── Guard ─────────────────────────────────────────────────────────────────
    check_root()?;

    // ── Welcome ───────────────────────────────────────────────────────────────
    ui::print_banner();

    if is_dry_run() {
        ui::print_warning("DRY-RUN MODE — no disk will be touched, no command will run.");
    }

    ui::print_info("This installer erases the target disk and installs Arch + Hyprland.");
    ui::print_info("Everything after the password prompts runs unattended.");
    steps::uefi::check()?;
    println!();

    let builder = steps::credentials::ask(InstallConfig::builder())?;

    // ── Steps 1-2: mirrors + configuration ────────────────────────────────────
    let mut reporter = ConsoleReporter;
    let config = provision::prepare(builder, &mut ReflectorMirrors::new(), &mut reporter)?;

    // ── Step 3: confirm the target ────────────────────────────────────────────
    reporter.step(3, "Target Confirmation");
    steps::target::confirm(&config)?;

    // ── Steps 4-6: install ────────────────────────────────────────────────────
    let mut session = ArchSession::new(config.target.as_str(), config.mountpoint.as_str());
    provision::install(&config, &mut session, cli.shell_mode, &mut reporter)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Checks that the process is running as root (UID 0).
/// Skipped automatically in dry-run mode.
fn check_root() -> Result<(), InstallerError> {
    if is_dry_run() {
        return Ok(()); // no root needed to simulate
    }

    let uid = std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|s| {
            s.lines()
                .find(|l| l.starts_with("Uid:"))
                .and_then(|l| l.split_whitespace().nth(1))
                .and_then(|v| v.parse::<u32>().ok())
        })
        .unwrap_or(1); // default to non-root if unreadable

    if uid != 0 {
        return Err(InstallerError::NotRoot);
    }

    Ok(())
}
