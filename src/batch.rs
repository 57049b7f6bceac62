use clap::ValueEnum;

// ── Shell context ─────────────────────────────────────────────────────────────

/// How the commands of one batch share (or don't share) a shell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ShellMode {
    /// Each command runs in a fresh process; its `cwd` applies to it alone.
    #[default]
    Isolated,
    /// The whole batch runs as one `sh -e` script; a `cd` sticks until the
    /// next command that sets its own directory.
    Persistent,
}

// ── Command descriptor ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    /// Run as this account instead of root.
    pub user: Option<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            user: None,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<String>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn as_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// `program args…` with every word quoted, prefixed with `runuser` when
    /// a user is set. Does not include the working directory.
    pub fn command_line(&self) -> String {
        let mut words: Vec<String> = Vec::with_capacity(self.args.len() + 4);
        if let Some(ref user) = self.user {
            words.extend(["runuser".to_string(), "-u".to_string(), quote(user), "--".to_string()]);
        }
        words.push(quote(&self.program));
        words.extend(self.args.iter().map(|a| quote(a)));
        words.join(" ")
    }

    /// Single self-contained shell line, `cd` included.
    pub fn shell_line(&self) -> String {
        match self.cwd {
            Some(ref dir) => format!("cd {} && {}", quote(dir), self.command_line()),
            None => self.command_line(),
        }
    }
}

// ── Batch ─────────────────────────────────────────────────────────────────────

/// Ordered commands executed as one unit inside the installed system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBatch {
    pub label: String,
    pub commands: Vec<CommandSpec>,
    pub mode: ShellMode,
}

impl CommandBatch {
    pub fn new(label: impl Into<String>, mode: ShellMode, commands: Vec<CommandSpec>) -> Self {
        Self {
            label: label.into(),
            commands,
            mode,
        }
    }

    /// Shell scripts to hand to `sh -c`, one per process the mode needs.
    pub fn scripts(&self) -> Vec<String> {
        match self.mode {
            ShellMode::Isolated => self.commands.iter().map(CommandSpec::shell_line).collect(),
            ShellMode::Persistent => vec![self.persistent_script()],
        }
    }

    fn persistent_script(&self) -> String {
        let mut out = String::from("set -e\n");
        let mut cwd: Option<&str> = None;
        for c in &self.commands {
            if let Some(ref dir) = c.cwd {
                if cwd != Some(dir.as_str()) {
                    out.push_str(&format!("cd {}\n", quote(dir)));
                    cwd = Some(dir);
                }
            }
            out.push_str(&c.command_line());
            out.push('\n');
        }
        out
    }
}

// ── Post-install batches ──────────────────────────────────────────────────────

pub const YAY_REPO: &str = "https://aur.archlinux.org/yay.git";
pub const DOTFILES_REPO: &str = "https://github.com/caelestia/dotfiles";

/// Clones and builds the `yay` AUR helper as `user`, then removes the build tree.
pub fn aur_helper(user: &str, mode: ShellMode) -> CommandBatch {
    let home = format!("/home/{}", user);
    let build = format!("{}/build", home);
    let yay = format!("{}/yay", build);

    CommandBatch::new(
        "AUR helper (yay)",
        mode,
        vec![
            CommandSpec::new("mkdir", ["-p", build.as_str()]).as_user(user),
            CommandSpec::new("git", ["clone", YAY_REPO, yay.as_str()]).as_user(user),
            CommandSpec::new("makepkg", ["-si", "--noconfirm"])
                .in_dir(yay.as_str())
                .as_user(user),
            CommandSpec::new("rm", ["-rf", build.as_str()]).in_dir("/"),
        ],
    )
}

/// Clones the dotfiles into the user's home and makes fish the login shell.
pub fn dotfiles(user: &str, mode: ShellMode) -> CommandBatch {
    let target = format!("/home/{}/dotfiles", user);

    CommandBatch::new(
        "Dotfiles (caelestia) + fish",
        mode,
        vec![
            CommandSpec::new("git", ["clone", DOTFILES_REPO, target.as_str()]).as_user(user),
            CommandSpec::new("chsh", ["-s", "/usr/bin/fish", user]),
        ],
    )
}

// ── Quoting ───────────────────────────────────────────────────────────────────

/// POSIX shell quoting: bare when safe, otherwise single quotes with `'\''`.
pub fn quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting() {
        assert_eq!(quote("makepkg"), "makepkg");
        assert_eq!(quote("/home/arch/build"), "/home/arch/build");
        assert_eq!(quote("https://aur.archlinux.org/yay.git"), "https://aur.archlinux.org/yay.git");
        assert_eq!(quote(""), "''");
        assert_eq!(quote("two words"), "'two words'");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote("$HOME"), "'$HOME'");
    }

    #[test]
    fn user_commands_go_through_runuser() {
        let c = CommandSpec::new("git", ["clone", "x", "y"]).as_user("arch");
        assert_eq!(c.command_line(), "runuser -u arch -- git clone x y");
        assert_eq!(CommandSpec::new("true", Vec::<String>::new()).command_line(), "true");
    }

    #[test]
    fn aur_batch_order_and_owners() {
        let b = aur_helper("arch", ShellMode::Isolated);
        let programs: Vec<&str> = b.commands.iter().map(|c| c.program.as_str()).collect();
        assert_eq!(programs, ["mkdir", "git", "makepkg", "rm"]);
        assert!(b.commands[..3].iter().all(|c| c.user.as_deref() == Some("arch")));
        assert_eq!(b.commands[3].user, None);
        assert_eq!(b.commands[2].cwd.as_deref(), Some("/home/arch/build/yay"));
        assert_eq!(b.commands[3].args, ["-rf", "/home/arch/build"]);
    }

    #[test]
    fn isolated_mode_carries_cwd_per_command() {
        let scripts = aur_helper("arch", ShellMode::Isolated).scripts();
        assert_eq!(scripts.len(), 4);
        assert_eq!(scripts[0], "runuser -u arch -- mkdir -p /home/arch/build");
        assert_eq!(
            scripts[1],
            "runuser -u arch -- git clone https://aur.archlinux.org/yay.git /home/arch/build/yay"
        );
        assert_eq!(
            scripts[2],
            "cd /home/arch/build/yay && runuser -u arch -- makepkg -si --noconfirm"
        );
        assert_eq!(scripts[3], "cd / && rm -rf /home/arch/build");
    }

    #[test]
    fn persistent_mode_is_one_script() {
        let scripts = aur_helper("arch", ShellMode::Persistent).scripts();
        assert_eq!(scripts.len(), 1);
        assert_eq!(
            scripts[0],
            "set -e\n\
             runuser -u arch -- mkdir -p /home/arch/build\n\
             runuser -u arch -- git clone https://aur.archlinux.org/yay.git /home/arch/build/yay\n\
             cd /home/arch/build/yay\n\
             runuser -u arch -- makepkg -si --noconfirm\n\
             cd /\n\
             rm -rf /home/arch/build\n"
        );
    }

    #[test]
    fn persistent_mode_skips_redundant_cd() {
        let batch = CommandBatch::new(
            "t",
            ShellMode::Persistent,
            vec![
                CommandSpec::new("a", Vec::<String>::new()).in_dir("/x"),
                CommandSpec::new("b", Vec::<String>::new()).in_dir("/x"),
            ],
        );
        assert_eq!(batch.scripts()[0], "set -e\ncd /x\na\nb\n");
    }

    #[test]
    fn dotfiles_batch() {
        let b = dotfiles("arch", ShellMode::Isolated);
        assert_eq!(
            b.scripts(),
            [
                "runuser -u arch -- git clone https://github.com/caelestia/dotfiles /home/arch/dotfiles",
                "chsh -s /usr/bin/fish arch",
            ]
        );
    }
}
