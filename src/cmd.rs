use std::{
    fs::OpenOptions,
    io::{self, Write},
    process::{Command, Stdio},
    thread,
    time::Duration,
};

use dialoguer::Confirm;
use tracing::{debug, warn};

use crate::{error::InstallerError, is_assume_yes, is_dry_run, ui};

// ── Internal helpers ──────────────────────────────────────────────────────────

fn not_found_or_io(program: &str, err: io::Error) -> InstallerError {
    if err.kind() == io::ErrorKind::NotFound {
        InstallerError::CommandNotFound(program.to_string())
    } else {
        InstallerError::Io(err)
    }
}

fn failed(program: &str, code: Option<i32>) -> InstallerError {
    let code = code.unwrap_or(-1);
    warn!(program, code, "command failed");
    InstallerError::CommandFailed(program.to_string(), code)
}

fn print_captured_output(stdout: &[u8], stderr: &[u8]) {
    let out = String::from_utf8_lossy(stdout);
    let err = String::from_utf8_lossy(stderr);
    if !out.trim().is_empty() {
        eprintln!("{}", out.trim());
    }
    if !err.trim().is_empty() {
        eprintln!("{}", err.trim());
    }
}

/// Logs the command and, in dry-run mode, pretends it ran.
/// Returns `true` when the caller should skip the real execution.
fn simulated(program: &str, args: &[&str]) -> bool {
    debug!(program, ?args, "exec");
    if is_dry_run() {
        thread::sleep(Duration::from_millis(150));
        return true;
    }
    false
}

/// Maps a binary name to the Arch package that ships it.
fn package_for(program: &str) -> &str {
    match program {
        "mkfs.fat" | "mkfs.vfat" | "fsck.fat" | "fatlabel" => "dosfstools",
        "mkfs.ext4" | "e2fsck" | "resize2fs" | "tune2fs" => "e2fsprogs",
        "mkswap" | "swapon" | "swapoff" | "mount" | "umount" | "lsblk" | "blkid"
        | "findmnt" | "wipefs" => "util-linux",
        "sgdisk" => "gptfdisk",
        "partprobe" => "parted",
        "pacstrap" | "genfstab" | "arch-chroot" => "arch-install-scripts",
        "reflector" => "reflector",
        "timedatectl" | "udevadm" => "systemd",
        other => other,
    }
}

/// When `program` is not found, asks the user if they want to install the
/// correct package via `pacman -S`. Returns `Ok(())` if installed successfully,
/// or `Err(CommandNotFound)` if the user declines or runs unattended.
fn offer_install(program: &str) -> Result<(), InstallerError> {
    let pkg = package_for(program);

    ui::print_warning(&format!("Command '{}' not found.", program));
    if is_assume_yes() {
        ui::print_info(&format!("Install it with:  pacman -S {}", pkg));
        return Err(InstallerError::CommandNotFound(program.to_string()));
    }
    println!();

    if !Confirm::new()
        .with_prompt(format!("Install '{}' with pacman?", pkg))
        .default(true)
        .interact()?
    {
        return Err(InstallerError::CommandNotFound(program.to_string()));
    }

    println!();
    let status = Command::new("pacman")
        .args(["-Sy", "--noconfirm", pkg])
        .status()
        .map_err(|e| not_found_or_io("pacman", e))?;

    if !status.success() {
        return Err(failed("pacman", status.code()));
    }

    // pacman may succeed with a package that does not provide the binary.
    let available = Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);

    if !available {
        ui::print_error(&format!(
            "'{}' still not found after install. Check the package name.",
            program
        ));
        return Err(InstallerError::CommandNotFound(program.to_string()));
    }

    Ok(())
}

/// Runs `attempt`, offering to install the missing tool once on `CommandNotFound`.
fn with_install_retry<T>(
    program: &str,
    attempt: impl Fn() -> Result<T, InstallerError>,
) -> Result<T, InstallerError> {
    match attempt() {
        Err(InstallerError::CommandNotFound(_)) => {
            offer_install(program)?;
            attempt()
        }
        other => other,
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs a command silently, discarding all output and ignoring any error.
/// Use for cleanup operations where partial failure is acceptable (e.g. umount).
pub fn run_best_effort(program: &str, args: &[&str]) {
    if simulated(program, args) {
        return;
    }
    let _ = Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

/// Run a command that **takes over the terminal** (stdin/stdout/stderr inherited).
/// Use for long programs whose own output matters: `pacstrap`, `makepkg`.
pub fn run_interactive(program: &str, args: &[&str]) -> Result<(), InstallerError> {
    with_install_retry(program, || {
        if simulated(program, args) {
            return Ok(());
        }
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| not_found_or_io(program, e))?;

        if !status.success() {
            return Err(failed(program, status.code()));
        }
        Ok(())
    })
}

/// Run a command **silently** while displaying a spinner.
/// On success prints `done_msg` with a ✓.
/// On failure prints captured output and returns an error.
pub fn run_with_spinner(
    program: &str,
    args: &[&str],
    spin_msg: &str,
    done_msg: &str,
) -> Result<(), InstallerError> {
    with_install_retry(program, || {
        let pb = ui::spinner(spin_msg);
        if simulated(program, args) {
            ui::done_spinner(pb, done_msg);
            return Ok(());
        }
        let result = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| not_found_or_io(program, e));
        pb.finish_and_clear();

        match result {
            Err(e) => Err(e),
            Ok(output) if !output.status.success() => {
                print_captured_output(&output.stdout, &output.stderr);
                Err(failed(program, output.status.code()))
            }
            Ok(_) => {
                ui::print_success(done_msg);
                Ok(())
            }
        }
    })
}

/// Run a command, capture its stdout, and return it as a `String`.
///
/// Read-only queries still run in dry-run mode.
pub fn run_capture(program: &str, args: &[&str]) -> Result<String, InstallerError> {
    debug!(program, ?args, "capture");
    with_install_retry(program, || {
        let output = Command::new(program)
            .args(args)
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| not_found_or_io(program, e))?;

        if !output.status.success() {
            return Err(failed(program, output.status.code()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    })
}

/// Run a command with `input` piped to its stdin and its output captured.
///
/// Used for `chpasswd`: the input is never logged.
pub fn run_with_stdin(program: &str, args: &[&str], input: &[u8]) -> Result<(), InstallerError> {
    with_install_retry(program, || {
        if simulated(program, args) {
            return Ok(());
        }
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| not_found_or_io(program, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input)?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            print_captured_output(&output.stdout, &output.stderr);
            return Err(failed(program, output.status.code()));
        }
        Ok(())
    })
}

/// Run a command and **append** its stdout to a file (equivalent to `>> path`).
pub fn run_append_to_file(
    program: &str,
    args: &[&str],
    file_path: &str,
) -> Result<(), InstallerError> {
    with_install_retry(program, || {
        if simulated(program, args) {
            return Ok(());
        }
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(file_path)?;

        let status = Command::new(program)
            .args(args)
            .stdout(file)
            .stderr(Stdio::piped())
            .status()
            .map_err(|e| not_found_or_io(program, e))?;

        if !status.success() {
            return Err(failed(program, status.code()));
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_tools_to_arch_packages() {
        assert_eq!(package_for("mkfs.fat"), "dosfstools");
        assert_eq!(package_for("sgdisk"), "gptfdisk");
        assert_eq!(package_for("arch-chroot"), "arch-install-scripts");
        assert_eq!(package_for("reflector"), "reflector");
        assert_eq!(package_for("git"), "git");
    }

    #[test]
    fn captures_stdout() {
        let out = run_capture("echo", &["hello"]).unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn reports_exit_code() {
        match run_capture("false", &[]) {
            Err(InstallerError::CommandFailed(p, code)) => {
                assert_eq!(p, "false");
                assert_eq!(code, 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn appends_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fstab");
        let path = path.to_str().unwrap();
        std::fs::write(path, "# header\n").unwrap();
        run_append_to_file("echo", &["UUID=abc / ext4"], path).unwrap();
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "# header\nUUID=abc / ext4\n"
        );
    }
}
