use console::style;

use crate::{cmd, config::InstallConfig, error::InstallerError, ui};

/// Installs `base` plus every configured package into `mnt` via `pacstrap`.
pub fn install(config: &InstallConfig) -> Result<(), InstallerError> {
    let args = pacstrap_args(config);

    ui::print_info(&format!(
        "Installing {} packages into {}…",
        style(args.len() - 2).cyan().bold(),
        config.mountpoint
    ));
    println!();

    // pacstrap streams download progress to the terminal.
    let argv: Vec<&str> = args.iter().map(String::as_str).collect();
    cmd::run_interactive("pacstrap", &argv)?;

    ui::print_success("Base system installed.");
    Ok(())
}

/// `-K <mnt> base <packages…>`, with duplicates dropped and order kept.
pub fn pacstrap_args(config: &InstallConfig) -> Vec<String> {
    let mut args = vec!["-K".to_string(), config.mountpoint.clone()];
    let wanted = std::iter::once("base")
        .chain(std::iter::once(config.bootloader.package_name()))
        .chain(config.custom_packages.iter().map(String::as_str));

    for pkg in wanted {
        if !args[2..].iter().any(|a| a == pkg) {
            args.push(pkg.to_string());
        }
    }
    args
}
