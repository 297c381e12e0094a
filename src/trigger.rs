//! Trigger instances attached to channel-sets.

use crate::error::Result;
use crate::registry::Registry;
use crate::sysfs::ObjectDir;

/// Kind of a trigger, resolved from the channel-set's `current_trigger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Kernel timer trigger (`ms-period`, `ms-phase`)
    Timer,
    /// User-space trigger, fired by writing a control
    User,
    /// Any other trigger type
    Generic,
}

/// A channel-set's trigger directory.
#[derive(Debug, Clone)]
pub struct Trigger {
    kind: TriggerKind,
    dir: ObjectDir,
}

impl Trigger {
    /// Trigger of `kind` over a scanned directory.
    pub fn new(kind: TriggerKind, dir: ObjectDir) -> Self {
        Self { kind, dir }
    }

    /// Registry with the trigger types the framework ships.
    pub fn registry() -> Registry<Trigger> {
        let mut registry = Registry::new(|dir| Trigger::new(TriggerKind::Generic, dir));
        registry
            .register("timer", |dir| Trigger::new(TriggerKind::Timer, dir))
            .register("user", |dir| Trigger::new(TriggerKind::User, dir));
        registry
    }

    /// Trigger kind.
    pub fn kind(&self) -> TriggerKind {
        self.kind
    }

    /// Underlying sysfs object.
    pub fn dir(&self) -> &ObjectDir {
        &self.dir
    }

    /// Whether the trigger is armed.
    pub fn is_enabled(&self) -> Result<bool> {
        self.dir.is_enabled()
    }

    /// Arm or disarm the trigger.
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.dir.set_enabled(enabled)
    }

    /// `post-samples`: samples acquired after the trigger fires.
    pub fn post_samples(&self) -> Result<i64> {
        self.dir.attribute("post-samples")?.read_int()
    }

    /// Set `post-samples`.
    pub fn set_post_samples(&self, samples: u32) -> Result<()> {
        self.dir.attribute("post-samples")?.write(samples)
    }

    /// `pre-samples`: samples kept from before the trigger fired.
    pub fn pre_samples(&self) -> Result<i64> {
        self.dir.attribute("pre-samples")?.read_int()
    }

    /// Timer period in milliseconds.
    pub fn period_ms(&self) -> Result<i64> {
        self.dir.attribute("ms-period")?.read_int()
    }

    /// Set the timer period in milliseconds.
    pub fn set_period_ms(&self, period: u32) -> Result<()> {
        self.dir.attribute("ms-period")?.write(period)
    }

    /// Timer phase in milliseconds.
    pub fn phase_ms(&self) -> Result<i64> {
        self.dir.attribute("ms-phase")?.read_int()
    }
}
