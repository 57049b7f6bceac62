use dialoguer::Password;

use crate::{
    config::{InstallConfigBuilder, Secret},
    error::InstallerError,
    ui,
};

/// Asks for the root password and one password per declared user.
///
/// Runs before anything touches the disk so the rest of the install can go
/// unattended. Passwords only live in memory.
pub fn ask(builder: InstallConfigBuilder) -> Result<InstallConfigBuilder, InstallerError> {
    ui::print_info("Passwords are kept in memory only and never written to logs.");
    println!();

    let mut builder = builder.root_password(prompt("root")?);
    for name in builder.user_names() {
        let secret = prompt(&name)?;
        builder = builder.user_password(&name, secret);
    }

    ui::print_success("Credentials collected.");
    Ok(builder)
}

fn prompt(account: &str) -> Result<Secret, InstallerError> {
    let pw = Password::new()
        .with_prompt(format!("Password for '{}'", account))
        .with_confirmation("Repeat password", "Passwords do not match, try again.")
        .interact()?;
    Ok(Secret::new(pw))
}
