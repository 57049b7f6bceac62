use std::ops::{Deref, DerefMut};

use crate::{batch::CommandBatch, config::InstallConfig, error::InstallerError, layout::PartitionLayout};

// ── Installer session ─────────────────────────────────────────────────────────

/// One installation run against a (target device, mountpoint) pair.
///
/// Steps are called in this order by [`crate::provision::install`]:
/// `enter_layout` → `setup_system_base` → `copy_config` → `leave_layout`
/// → `bootstrap` → `add_service`… → `execute`…
pub trait InstallerSession {
    fn target(&self) -> &str;
    fn mountpoint(&self) -> &str;

    /// Partitions and formats the device, then mounts the new tree.
    fn enter_layout(&mut self, layout: &PartitionLayout) -> Result<(), InstallerError>;

    /// Releases the layout context. `committed` is false when the scope is
    /// left early because a step inside it failed.
    fn leave_layout(&mut self, committed: bool);

    /// Installs the base system and the configured packages.
    fn setup_system_base(&mut self, config: &InstallConfig) -> Result<(), InstallerError>;

    /// Writes the (secret-free) configuration into the installed system.
    fn copy_config(&mut self, config: &InstallConfig) -> Result<(), InstallerError>;

    /// Commit point: locale, users, bootloader. An `Err` here means the
    /// installed system is not bootable.
    fn bootstrap(&mut self, config: &InstallConfig) -> Result<(), InstallerError>;

    fn add_service(&mut self, name: &str, enabled: bool) -> Result<(), InstallerError>;

    /// Runs a command batch inside the installed system.
    fn execute(&mut self, batch: &CommandBatch) -> Result<(), InstallerError>;
}

// ── Layout scope ──────────────────────────────────────────────────────────────

/// Guard around the layout/formatting context.
///
/// Creating it enters the layout; dropping it always leaves, whether the
/// scope ended through [`LayoutScope::commit`] or an early `?` return.
pub struct LayoutScope<'a, S: InstallerSession + ?Sized> {
    session: &'a mut S,
    committed: bool,
}

impl<'a, S: InstallerSession + ?Sized> LayoutScope<'a, S> {
    pub fn enter(session: &'a mut S, layout: &PartitionLayout) -> Result<Self, InstallerError> {
        if let Err(e) = session.enter_layout(layout) {
            // A half-applied layout still needs releasing.
            session.leave_layout(false);
            return Err(e);
        }
        Ok(Self {
            session,
            committed: false,
        })
    }

    /// Marks the work inside the scope as complete and leaves it.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl<S: InstallerSession + ?Sized> Deref for LayoutScope<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &*self.session
    }
}

impl<S: InstallerSession + ?Sized> DerefMut for LayoutScope<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut *self.session
    }
}

impl<S: InstallerSession + ?Sized> Drop for LayoutScope<'_, S> {
    fn drop(&mut self) {
        tracing::debug!(committed = self.committed, "leaving layout scope");
        self.session.leave_layout(self.committed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Tracker {
        fail_enter: bool,
        events: Vec<String>,
    }

    impl InstallerSession for Tracker {
        fn target(&self) -> &str {
            "/dev/null"
        }
        fn mountpoint(&self) -> &str {
            "/tmp"
        }
        fn enter_layout(&mut self, _: &PartitionLayout) -> Result<(), InstallerError> {
            self.events.push("enter".into());
            if self.fail_enter {
                return Err(InstallerError::CommandFailed("sgdisk".into(), 2));
            }
            Ok(())
        }
        fn leave_layout(&mut self, committed: bool) {
            self.events.push(format!("leave:{}", committed));
        }
        fn setup_system_base(&mut self, _: &InstallConfig) -> Result<(), InstallerError> {
            Ok(())
        }
        fn copy_config(&mut self, _: &InstallConfig) -> Result<(), InstallerError> {
            Ok(())
        }
        fn bootstrap(&mut self, _: &InstallConfig) -> Result<(), InstallerError> {
            Ok(())
        }
        fn add_service(&mut self, _: &str, _: bool) -> Result<(), InstallerError> {
            Ok(())
        }
        fn execute(&mut self, _: &CommandBatch) -> Result<(), InstallerError> {
            Ok(())
        }
    }

    fn layout() -> PartitionLayout {
        PartitionLayout::default_for("/dev/null")
    }

    #[test]
    fn commit_leaves_once_committed() {
        let mut tracker = Tracker::default();
        let scope = LayoutScope::enter(&mut tracker, &layout()).unwrap();
        scope.commit();
        assert_eq!(tracker.events, ["enter", "leave:true"]);
    }

    #[test]
    fn early_drop_leaves_uncommitted() {
        let mut tracker = Tracker::default();
        {
            let _scope = LayoutScope::enter(&mut tracker, &layout()).unwrap();
        }
        assert_eq!(tracker.events, ["enter", "leave:false"]);
    }

    #[test]
    fn failed_enter_still_leaves() {
        let mut tracker = Tracker {
            fail_enter: true,
            ..Tracker::default()
        };
        assert!(LayoutScope::enter(&mut tracker, &layout()).is_err());
        assert_eq!(tracker.events, ["enter", "leave:false"]);
    }
}
