use std::{
    fs, io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::{
    batch::CommandBatch,
    cmd,
    config::{Bootloader, InstallConfig},
    error::InstallerError,
    is_dry_run, ui,
};

/// Drop-in granting the wheel group sudo.
const SUDOERS_DROPIN: &str = "etc/sudoers.d/10-wheel";

/// Temporary rule that lives only while a command batch runs.
const BATCH_SUDOERS: &str = "etc/sudoers.d/99-install-batch";

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Runs `args` inside the installed system with a spinner.
fn in_target(mnt: &str, args: &[&str], spin_msg: &str, done_msg: &str) -> Result<(), InstallerError> {
    let mut argv = vec![mnt];
    argv.extend_from_slice(args);
    cmd::run_with_spinner("arch-chroot", &argv, spin_msg, done_msg)
}

/// Writes `content` to `<mnt>/<rel>`, creating parent directories.
fn write_target_file(mnt: &str, rel: &str, content: &str) -> Result<(), InstallerError> {
    let path = Path::new(mnt).join(rel);
    tracing::debug!(path = %path.display(), "write");
    if is_dry_run() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, content)?;
    Ok(())
}

// ── Bootstrap ─────────────────────────────────────────────────────────────────

/// Configures the installed system: clock, locale, keymap, network identity,
/// accounts and bootloader.
pub fn configure(config: &InstallConfig) -> Result<(), InstallerError> {
    let mnt = config.mountpoint.as_str();

    // Clock
    let zone = format!("/usr/share/zoneinfo/{}", config.timezone);
    in_target(
        mnt,
        &["ln", "-sf", &zone, "/etc/localtime"],
        &format!("Setting timezone to {}…", config.timezone),
        &format!("Timezone set to {}.", config.timezone),
    )?;
    in_target(
        mnt,
        &["hwclock", "--systohc"],
        "Syncing hardware clock…",
        "Hardware clock set.",
    )?;

    // Locale + console keymap
    let current = read_locale_gen(mnt)?;
    write_target_file(mnt, "etc/locale.gen", &enable_locale(&current, &config.locale))?;
    in_target(
        mnt,
        &["locale-gen"],
        &format!("Generating locale {}…", config.locale),
        &format!("Locale {} generated.", config.locale),
    )?;
    write_target_file(mnt, "etc/locale.conf", &format!("LANG={}\n", config.locale))?;
    write_target_file(
        mnt,
        "etc/vconsole.conf",
        &format!("KEYMAP={}\n", config.keyboard_layout),
    )?;

    // Network identity
    write_target_file(mnt, "etc/hostname", &format!("{}\n", config.hostname))?;
    write_target_file(mnt, "etc/hosts", &hosts_file(&config.hostname))?;
    ui::print_success(&format!("Hostname set to {}.", config.hostname));

    create_users(config)?;

    match config.bootloader {
        Bootloader::Grub => install_grub(mnt)?,
    }

    info!(hostname = %config.hostname, "bootstrap finished");
    Ok(())
}

fn create_users(config: &InstallConfig) -> Result<(), InstallerError> {
    let mnt = config.mountpoint.as_str();

    for user in &config.users {
        let mut args = vec!["useradd", "-m", "-s", "/bin/bash"];
        if user.sudo {
            args.extend(["-G", "wheel"]);
        }
        args.push(&user.name);
        in_target(
            mnt,
            &args,
            &format!("Creating user {}…", user.name),
            &format!("User {} created.", user.name),
        )?;
    }

    // chpasswd reads `name:password` lines from stdin; nothing hits argv or logs.
    let mut input = format!("root:{}\n", config.root_password.expose());
    for user in &config.users {
        input.push_str(&format!("{}:{}\n", user.name, user.password.expose()));
    }
    cmd::run_with_stdin("arch-chroot", &[mnt, "chpasswd"], input.as_bytes())?;
    ui::print_success("Passwords set.");

    write_target_file(mnt, SUDOERS_DROPIN, "%wheel ALL=(ALL:ALL) ALL\n")?;
    if !is_dry_run() {
        fs::set_permissions(
            Path::new(mnt).join(SUDOERS_DROPIN),
            fs::Permissions::from_mode(0o440),
        )?;
    }
    ui::print_success("wheel group allowed to use sudo.");
    Ok(())
}

fn install_grub(mnt: &str) -> Result<(), InstallerError> {
    in_target(
        mnt,
        &[
            "grub-install",
            "--target=x86_64-efi",
            "--efi-directory=/boot",
            "--bootloader-id=GRUB",
        ],
        "Installing GRUB (x86_64-efi)…",
        "GRUB installed to the EFI partition.",
    )?;
    in_target(
        mnt,
        &["grub-mkconfig", "-o", "/boot/grub/grub.cfg"],
        "Generating /boot/grub/grub.cfg…",
        "GRUB configuration written.",
    )
}

// ── Services & batches ────────────────────────────────────────────────────────

pub fn set_service(mnt: &str, name: &str, enabled: bool) -> Result<(), InstallerError> {
    let verb = if enabled { "enable" } else { "disable" };
    in_target(
        mnt,
        &["systemctl", verb, name],
        &format!("systemctl {} {}…", verb, name),
        &format!("{} {}d.", name, verb),
    )
}

/// Runs every script of `batch` through `sh -c` in the installed system.
/// The first failing script stops the batch.
///
/// Users named in the batch get password-less sudo while it runs
/// (`makepkg -si` calls `sudo pacman`); the rule is removed afterwards.
pub fn execute(mnt: &str, batch: &CommandBatch) -> Result<(), InstallerError> {
    execute_with(mnt, batch, |script| {
        // makepkg and git print progress; hand over the terminal.
        cmd::run_interactive("arch-chroot", &[mnt, "sh", "-c", script])
    })
}

fn execute_with<F>(mnt: &str, batch: &CommandBatch, mut run: F) -> Result<(), InstallerError>
where
    F: FnMut(&str) -> Result<(), InstallerError>,
{
    let mut sudoers = BatchSudoers::grant(mnt, &batch_users(batch))?;

    let result = batch.scripts().iter().try_for_each(|script| {
        info!(batch = %batch.label, %script, "run");
        ui::print_info(&script.replace('\n', "; "));
        run(script.as_str())
    });

    // A batch error wins; a leftover rule fails an otherwise clean batch.
    let released = sudoers.release();
    result.and(released)
}

/// Temporary sudoers drop-in for the users of one batch.
/// Removed by [`BatchSudoers::release`] or, on early exit, by `Drop`.
struct BatchSudoers {
    path: Option<PathBuf>,
}

impl BatchSudoers {
    fn grant(mnt: &str, users: &[&str]) -> Result<Self, InstallerError> {
        if users.is_empty() {
            return Ok(Self { path: None });
        }
        write_target_file(mnt, BATCH_SUDOERS, &nopasswd_rules(users))?;
        if is_dry_run() {
            return Ok(Self { path: None });
        }

        let guard = Self {
            path: Some(Path::new(mnt).join(BATCH_SUDOERS)),
        };
        if let Some(ref path) = guard.path {
            fs::set_permissions(path, fs::Permissions::from_mode(0o440))?;
        }
        Ok(guard)
    }

    fn release(&mut self) -> Result<(), InstallerError> {
        let Some(path) = self.path.take() else {
            return Ok(());
        };
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "temporary sudoers rule left behind");
                ui::print_warning(&format!(
                    "Could not remove {}: {}. Delete it before rebooting.",
                    path.display(),
                    e
                ));
                Err(e.into())
            }
        }
    }
}

impl Drop for BatchSudoers {
    fn drop(&mut self) {
        // Failures are reported inside `release`.
        let _ = self.release();
    }
}

fn batch_users(batch: &CommandBatch) -> Vec<&str> {
    let mut users: Vec<&str> = batch.commands.iter().filter_map(|c| c.user.as_deref()).collect();
    users.sort_unstable();
    users.dedup();
    users
}

fn nopasswd_rules(users: &[&str]) -> String {
    users
        .iter()
        .map(|u| format!("{} ALL=(ALL:ALL) NOPASSWD: ALL\n", u))
        .collect()
}

// ── File contents ─────────────────────────────────────────────────────────────

/// Current `<mnt>/etc/locale.gen`; a missing file reads as empty.
fn read_locale_gen(mnt: &str) -> Result<String, InstallerError> {
    if is_dry_run() {
        return Ok(String::new());
    }
    match fs::read_to_string(Path::new(mnt).join("etc/locale.gen")) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

/// Uncomments `<locale> <charset>` in a `locale.gen`, appending it if absent.
pub fn enable_locale(content: &str, locale: &str) -> String {
    let charset = locale.rsplit_once('.').map(|(_, c)| c).unwrap_or("UTF-8");
    let entry = format!("{} {}", locale, charset);

    let mut found = false;
    let mut out: Vec<String> = content
        .lines()
        .map(|l| {
            let bare = l.trim_start_matches('#').trim();
            if bare == entry {
                found = true;
                entry.clone()
            } else {
                l.to_string()
            }
        })
        .collect();

    if !found {
        out.push(entry);
    }
    out.join("\n") + "\n"
}

pub fn hosts_file(hostname: &str) -> String {
    format!(
        "127.0.0.1\tlocalhost\n::1\t\tlocalhost\n127.0.1.1\t{0}.localdomain\t{0}\n",
        hostname
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncomments_existing_locale() {
        let gen = "# en_GB.UTF-8 UTF-8\n#en_US.UTF-8 UTF-8\n#en_US ISO-8859-1\n";
        assert_eq!(
            enable_locale(gen, "en_US.UTF-8"),
            "# en_GB.UTF-8 UTF-8\nen_US.UTF-8 UTF-8\n#en_US ISO-8859-1\n"
        );
    }

    #[test]
    fn appends_missing_locale() {
        assert_eq!(enable_locale("", "ja_JP.UTF-8"), "ja_JP.UTF-8 UTF-8\n");
        assert_eq!(
            enable_locale("# comment\n", "en_US.UTF-8"),
            "# comment\nen_US.UTF-8 UTF-8\n"
        );
    }

    #[test]
    fn hosts_contains_hostname() {
        let hosts = hosts_file("arch");
        assert!(hosts.contains("127.0.1.1\tarch.localdomain\tarch"));
        assert!(hosts.starts_with("127.0.0.1\tlocalhost\n"));
    }

    #[test]
    fn batch_users_are_deduplicated() {
        let batch = crate::batch::aur_helper("arch", crate::batch::ShellMode::Isolated);
        assert_eq!(batch_users(&batch), ["arch"]);
        assert_eq!(nopasswd_rules(&["arch"]), "arch ALL=(ALL:ALL) NOPASSWD: ALL\n");
    }

    #[test]
    fn locale_gen_read_errors_are_not_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let mnt = dir.path().to_str().unwrap();
        assert_eq!(read_locale_gen(mnt).unwrap(), "");

        fs::create_dir_all(dir.path().join("etc")).unwrap();
        fs::write(dir.path().join("etc/locale.gen"), "#en_US.UTF-8 UTF-8\n").unwrap();
        assert_eq!(read_locale_gen(mnt).unwrap(), "#en_US.UTF-8 UTF-8\n");

        fs::write(
            dir.path().join("etc/locale.gen"),
            b"#de_DE.UTF-8 UTF-8\n#en_US.UTF-8 UTF-8\n\xff\n",
        )
        .unwrap();
        assert!(matches!(read_locale_gen(mnt), Err(InstallerError::Io(_))));
    }

    fn sudoers_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join(BATCH_SUDOERS)
    }

    #[test]
    fn sudoers_rule_lives_only_during_a_passing_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mnt = dir.path().to_str().unwrap();
        let batch = crate::batch::dotfiles("arch", crate::batch::ShellMode::Isolated);

        let mut seen = Vec::new();
        execute_with(mnt, &batch, |script| {
            let path = sudoers_path(&dir);
            assert_eq!(fs::read_to_string(&path).unwrap(), nopasswd_rules(&["arch"]));
            assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o440);
            seen.push(script.to_string());
            Ok(())
        })
        .unwrap();

        assert_eq!(seen.len(), 2);
        assert!(!sudoers_path(&dir).exists());
    }

    #[test]
    fn sudoers_rule_is_removed_after_a_failing_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mnt = dir.path().to_str().unwrap();
        let batch = crate::batch::aur_helper("arch", crate::batch::ShellMode::Isolated);

        let mut calls = 0;
        let err = execute_with(mnt, &batch, |_| {
            calls += 1;
            Err(InstallerError::CommandFailed("git".into(), 128))
        })
        .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(err, InstallerError::CommandFailed(ref p, 128) if p == "git"));
        assert!(!sudoers_path(&dir).exists());
    }

    #[test]
    fn leftover_sudoers_rule_fails_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mnt = dir.path().to_str().unwrap();
        let batch = crate::batch::dotfiles("arch", crate::batch::ShellMode::Isolated);

        // A non-empty directory in place of the rule cannot be removed with remove_file.
        let err = execute_with(mnt, &batch, |_| {
            let path = sudoers_path(&dir);
            if path.is_file() {
                fs::remove_file(&path).unwrap();
                fs::create_dir_all(path.join("stuck")).unwrap();
            }
            Ok(())
        })
        .unwrap_err();

        assert!(matches!(err, InstallerError::Io(_)));
        assert!(sudoers_path(&dir).exists());
    }

    #[test]
    fn root_only_batch_grants_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mnt = dir.path().to_str().unwrap();
        let batch = CommandBatch::new(
            "cleanup",
            crate::batch::ShellMode::Isolated,
            vec![crate::batch::CommandSpec::new("rm", ["-rf", "/home/arch/build"])],
        );

        execute_with(mnt, &batch, |_| {
            assert!(!sudoers_path(&dir).exists());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn writes_into_target_root() {
        let dir = tempfile::tempdir().unwrap();
        let mnt = dir.path().to_str().unwrap();
        write_target_file(mnt, "etc/hostname", "arch\n").unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("etc/hostname")).unwrap(),
            "arch\n"
        );
    }
}
