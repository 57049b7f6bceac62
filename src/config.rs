use std::fmt;

use serde::Serialize;

use crate::{error::InstallerError, layout::PartitionLayout, mirror::MirrorRegion};

// ── Fixed installation target ─────────────────────────────────────────────────

/// Block device that gets wiped. Confirm it before running.
pub const TARGET_DEVICE: &str = "/dev/sda";
pub const MOUNTPOINT: &str = "/mnt";

/// Desktop/session stack: Hyprland, SDDM, PipeWire, fish.
pub const DEFAULT_PACKAGES: &[&str] = &[
    // core system & microcode
    "linux",
    "linux-firmware",
    "intel-ucode",
    // graphics
    "mesa",
    "vulkan-intel",
    // networking & bluetooth
    "iwd",
    "dhcpcd",
    "openssh",
    "bluez",
    "bluez-utils",
    // needed by makepkg for the AUR helper
    "base-devel",
    // wayland compositor & utilities
    "hyprland",
    "sddm",
    "waybar",
    "wofi",
    "wl-clipboard",
    "xdg-desktop-portal-hyprland",
    "mako",
    "thunar",
    "polkit-kde-agent",
    "grim",
    "slurp",
    // archives
    "unzip",
    "unrar",
    // terminal & shell
    "alacritty",
    "fish",
    "starship",
    "git",
    "code",
    // audio
    "pipewire",
    "pipewire-alsa",
    "pipewire-pulse",
    "pavucontrol",
    // browser & fonts
    "firefox",
    "ttf-dejavu",
    "ttf-nerd-fonts-symbols",
    "nano",
    // bootloader
    "grub",
    "efibootmgr",
    "sudo",
];

// ── Secret ────────────────────────────────────────────────────────────────────

/// A password held in memory only. Never printed, never serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("********")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("********")
    }
}

// ── Enumerated settings ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bootloader {
    Grub,
}

impl Bootloader {
    pub fn package_name(self) -> &'static str {
        match self {
            Bootloader::Grub => "grub",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Minimal,
}

// ── User accounts ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub name: String,
    #[serde(skip)]
    pub password: Secret,
    pub sudo: bool,
}

/// A user as declared in the builder, before its password is known.
#[derive(Debug, Clone)]
struct UserSpec {
    name: String,
    password: Option<Secret>,
    sudo: bool,
}

// ── Configuration record ──────────────────────────────────────────────────────

/// Every installation parameter. Built once through [`InstallConfigBuilder`]
/// and passed by reference afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct InstallConfig {
    pub target: String,
    pub mountpoint: String,
    /// Always false: the target is formatted in the clear.
    pub disk_encryption: bool,
    pub partition_layout: PartitionLayout,
    pub mirror_region: MirrorRegion,
    pub hostname: String,
    pub keyboard_layout: String,
    pub locale: String,
    pub timezone: String,
    pub bootloader: Bootloader,
    pub swap: bool,
    #[serde(skip)]
    pub root_password: Secret,
    pub users: Vec<User>,
    pub profile: Profile,
    pub desktop_environment: Option<String>,
    pub custom_packages: Vec<String>,
}

impl InstallConfig {
    pub fn builder() -> InstallConfigBuilder {
        InstallConfigBuilder::default()
    }

    /// The account allowed to use sudo. `build` guarantees exactly one;
    /// a hand-assembled record may have none.
    pub fn sudo_user(&self) -> Option<&User> {
        self.users.iter().find(|u| u.sudo)
    }

    /// JSON copy written into the installed system; secrets are skipped.
    pub fn to_json(&self) -> Result<String, InstallerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct InstallConfigBuilder {
    target: String,
    mountpoint: String,
    layout: Option<PartitionLayout>,
    mirror_region: Option<MirrorRegion>,
    hostname: String,
    keyboard_layout: String,
    locale: String,
    timezone: String,
    bootloader: Bootloader,
    swap: bool,
    root_password: Option<Secret>,
    users: Vec<UserSpec>,
    packages: Vec<String>,
}

impl Default for InstallConfigBuilder {
    fn default() -> Self {
        Self {
            target: TARGET_DEVICE.to_string(),
            mountpoint: MOUNTPOINT.to_string(),
            layout: None,
            mirror_region: None,
            hostname: "arch".to_string(),
            keyboard_layout: "jp106".to_string(),
            locale: "en_US.UTF-8".to_string(),
            timezone: "UTC".to_string(),
            bootloader: Bootloader::Grub,
            swap: true,
            root_password: None,
            users: vec![UserSpec {
                name: "arch".to_string(),
                password: None,
                sudo: true,
            }],
            packages: DEFAULT_PACKAGES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl InstallConfigBuilder {
    /// Changes the device; the layout follows unless one was set explicitly.
    pub fn target(mut self, device: impl Into<String>) -> Self {
        self.target = device.into();
        self
    }

    pub fn mountpoint(mut self, path: impl Into<String>) -> Self {
        self.mountpoint = path.into();
        self
    }

    pub fn partition_layout(mut self, layout: PartitionLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn mirror_region(mut self, region: MirrorRegion) -> Self {
        self.mirror_region = Some(region);
        self
    }

    pub fn hostname(mut self, name: impl Into<String>) -> Self {
        self.hostname = name.into();
        self
    }

    pub fn timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = tz.into();
        self
    }

    pub fn root_password(mut self, secret: Secret) -> Self {
        self.root_password = Some(secret);
        self
    }

    /// Declares an extra account. A later call with the same name replaces it.
    pub fn user(mut self, name: impl Into<String>, sudo: bool) -> Self {
        let name = name.into();
        self.users.retain(|u| u.name != name);
        self.users.push(UserSpec {
            name,
            password: None,
            sudo,
        });
        self
    }

    pub fn user_password(mut self, name: &str, secret: Secret) -> Self {
        if let Some(u) = self.users.iter_mut().find(|u| u.name == name) {
            u.password = Some(secret);
        }
        self
    }

    pub fn packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.packages = packages.into_iter().map(Into::into).collect();
        self
    }

    /// Names of the declared accounts, in declaration order.
    pub fn user_names(&self) -> Vec<String> {
        self.users.iter().map(|u| u.name.clone()).collect()
    }

    pub fn build(self) -> Result<InstallConfig, InstallerError> {
        let mirror_region = self
            .mirror_region
            .ok_or_else(|| InstallerError::Config("no mirror region selected".into()))?;
        if mirror_region.servers.is_empty() {
            return Err(InstallerError::Config("mirror region has no servers".into()));
        }

        if self.packages.is_empty() {
            return Err(InstallerError::Config("package list is empty".into()));
        }

        if !valid_hostname(&self.hostname) {
            return Err(InstallerError::Config(format!(
                "invalid hostname '{}'",
                self.hostname
            )));
        }

        let sudoers = self.users.iter().filter(|u| u.sudo).count();
        if sudoers != 1 {
            return Err(InstallerError::Config(format!(
                "exactly one sudo user is required, found {}",
                sudoers
            )));
        }

        let root_password = self
            .root_password
            .ok_or_else(|| InstallerError::Config("no root password set".into()))?;

        let mut users = Vec::with_capacity(self.users.len());
        for declared in self.users {
            if !valid_username(&declared.name) {
                return Err(InstallerError::Config(format!(
                    "invalid user name '{}'",
                    declared.name
                )));
            }
            let password = declared.password.ok_or_else(|| {
                InstallerError::Config(format!("no password set for user '{}'", declared.name))
            })?;
            users.push(User {
                name: declared.name,
                password,
                sudo: declared.sudo,
            });
        }

        let partition_layout = self
            .layout
            .unwrap_or_else(|| PartitionLayout::default_for(self.target.as_str()));
        if partition_layout.device != self.target {
            return Err(InstallerError::Config(format!(
                "layout is for {} but the target is {}",
                partition_layout.device, self.target
            )));
        }
        partition_layout.validate()?;

        Ok(InstallConfig {
            target: self.target,
            mountpoint: self.mountpoint,
            disk_encryption: false,
            partition_layout,
            mirror_region,
            hostname: self.hostname,
            keyboard_layout: self.keyboard_layout,
            locale: self.locale,
            timezone: self.timezone,
            bootloader: self.bootloader,
            swap: self.swap,
            root_password,
            users,
            profile: Profile::Minimal,
            desktop_environment: None,
            custom_packages: self.packages,
        })
    }
}

// ── Validation helpers ────────────────────────────────────────────────────────

/// `useradd` rules: lowercase start, then `[a-z0-9_-]`, at most 32 chars.
fn valid_username(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= 32
        && (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

fn valid_hostname(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> MirrorRegion {
        MirrorRegion {
            description: "test".into(),
            servers: vec!["https://mirror.example/$repo/os/$arch".into()],
        }
    }

    fn complete() -> InstallConfigBuilder {
        InstallConfig::builder()
            .mirror_region(region())
            .root_password(Secret::new("root-pw"))
            .user_password("arch", Secret::new("user-pw"))
    }

    #[test]
    fn defaults_match_fixed_install() {
        let config = complete().build().unwrap();
        assert_eq!(config.target, "/dev/sda");
        assert_eq!(config.mountpoint, "/mnt");
        assert!(!config.disk_encryption);
        assert_eq!(config.hostname, "arch");
        assert_eq!(config.keyboard_layout, "jp106");
        assert_eq!(config.locale, "en_US.UTF-8");
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.bootloader, Bootloader::Grub);
        assert!(config.swap);
        assert_eq!(config.profile, Profile::Minimal);
        assert_eq!(config.partition_layout.device, "/dev/sda");
    }

    #[test]
    fn has_packages_and_one_sudo_user() {
        let config = complete().build().unwrap();
        assert!(!config.custom_packages.is_empty());
        assert!(config.custom_packages.iter().any(|p| p == "hyprland"));
        assert_eq!(config.users.iter().filter(|u| u.sudo).count(), 1);
        assert_eq!(config.sudo_user().map(|u| u.name.as_str()), Some("arch"));
    }

    #[test]
    fn hand_built_record_without_users_has_no_sudo_user() {
        let mut config = complete().build().unwrap();
        config.users.clear();
        assert!(config.sudo_user().is_none());
    }

    #[test]
    fn mirror_region_is_required() {
        let err = InstallConfig::builder()
            .root_password(Secret::new("x"))
            .user_password("arch", Secret::new("y"))
            .build()
            .unwrap_err();
        assert!(matches!(err, InstallerError::Config(m) if m.contains("mirror")));
    }

    #[test]
    fn rejects_empty_package_list() {
        let err = complete().packages(Vec::<String>::new()).build().unwrap_err();
        assert!(matches!(err, InstallerError::Config(m) if m.contains("package")));
    }

    #[test]
    fn rejects_second_sudo_user() {
        let err = complete()
            .user("alice", true)
            .user_password("alice", Secret::new("pw"))
            .build()
            .unwrap_err();
        assert!(matches!(err, InstallerError::Config(m) if m.contains("sudo")));
    }

    #[test]
    fn extra_unprivileged_user_is_fine() {
        let config = complete()
            .user("guest", false)
            .user_password("guest", Secret::new("pw"))
            .build()
            .unwrap();
        assert_eq!(config.users.len(), 2);
        assert_eq!(config.sudo_user().map(|u| u.name.as_str()), Some("arch"));
    }

    #[test]
    fn passwords_are_required() {
        let err = InstallConfig::builder()
            .mirror_region(region())
            .root_password(Secret::new("x"))
            .build()
            .unwrap_err();
        assert!(matches!(err, InstallerError::Config(m) if m.contains("arch")));

        let err = InstallConfig::builder()
            .mirror_region(region())
            .user_password("arch", Secret::new("y"))
            .build()
            .unwrap_err();
        assert!(matches!(err, InstallerError::Config(m) if m.contains("root")));
    }

    #[test]
    fn overrides_keep_other_defaults() {
        let config = complete().hostname("box").timezone("Asia/Tokyo").build().unwrap();
        assert_eq!(config.hostname, "box");
        assert_eq!(config.timezone, "Asia/Tokyo");
        assert_eq!(config.keyboard_layout, "jp106");
    }

    #[test]
    fn rejects_bad_names() {
        assert!(complete().hostname("bad host").build().is_err());
        let err = complete()
            .user("Bad User", false)
            .user_password("Bad User", Secret::new("pw"))
            .build()
            .unwrap_err();
        assert!(matches!(err, InstallerError::Config(m) if m.contains("user name")));
    }

    #[test]
    fn layout_follows_target() {
        let config = complete().target("/dev/nvme0n1").build().unwrap();
        assert_eq!(config.partition_layout.device, "/dev/nvme0n1");

        let err = complete()
            .target("/dev/vdb")
            .partition_layout(PartitionLayout::default_for("/dev/sda"))
            .build()
            .unwrap_err();
        assert!(matches!(err, InstallerError::Config(_)));
    }

    #[test]
    fn secrets_never_leak() {
        let config = complete().build().unwrap();
        let debug = format!("{:?}", config);
        let json = config.to_json().unwrap();
        for text in [&debug, &json] {
            assert!(!text.contains("root-pw"));
            assert!(!text.contains("user-pw"));
        }
        assert!(debug.contains("********"));
        assert!(json.contains("\"sudo\": true"));
        assert_eq!(config.root_password.expose(), "root-pw");
    }

    #[test]
    fn username_rules() {
        assert!(valid_username("arch"));
        assert!(valid_username("_svc-1"));
        assert!(!valid_username(""));
        assert!(!valid_username("1arch"));
        assert!(!valid_username("Arch"));
        assert!(!valid_username(&"a".repeat(33)));
    }
}
