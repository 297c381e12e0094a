//! Devices and channel-sets.
//!
//! A device directory contains one sub-directory per channel-set. A
//! channel-set groups channels sharing a direction, a trigger and a buffer
//! type; its `current_buffer` and `current_trigger` attributes name those
//! types and are resolved through the [`Discovery`] registries.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::buffer::Buffer;
use crate::channel::{Channel, SharedChannel};
use crate::error::Result;
use crate::interface::{Direction, Geometry};
use crate::registry::Registry;
use crate::sysfs::{ObjectDir, ObjectKind};
use crate::trigger::Trigger;

/// Everything object construction needs besides the directory itself.
#[derive(Debug)]
pub struct Discovery {
    /// Buffer types
    pub buffers: Registry<Buffer>,
    /// Trigger types
    pub triggers: Registry<Trigger>,
    /// Directory holding the `<devname>-ctrl`/`-data` device files
    pub dev_root: PathBuf,
    /// Geometry for data reads before any control record
    pub fallback: Geometry,
}

impl Discovery {
    /// Default registries with device files under `dev_root`.
    pub fn new(dev_root: impl Into<PathBuf>) -> Self {
        Self {
            buffers: Buffer::registry(),
            triggers: Trigger::registry(),
            dev_root: dev_root.into(),
            fallback: Geometry::FALLBACK,
        }
    }
}

/// One channel-set.
#[derive(Debug)]
pub struct Cset {
    dir: ObjectDir,
    direction: Direction,
    trigger: Option<Trigger>,
    channels: Vec<SharedChannel>,
}

impl Cset {
    /// Scan a channel-set directory and its channels.
    pub fn scan(path: impl Into<PathBuf>, discovery: &Discovery) -> Result<Self> {
        let dir = ObjectDir::scan(path)?;
        let direction = cset_direction(&dir);
        let current_buffer = read_or_empty(&dir, "current_buffer");
        let current_trigger = read_or_empty(&dir, "current_trigger");

        let trigger = match dir.children_of(ObjectKind::Trigger).next() {
            Some(path) => Some(
                discovery
                    .triggers
                    .build(&current_trigger, ObjectDir::scan(path)?),
            ),
            None => None,
        };

        let mut channels = Vec::new();
        for path in dir.children_of(ObjectKind::Channel) {
            let channel = Channel::scan(
                path.clone(),
                direction,
                &current_buffer,
                &discovery.buffers,
                &discovery.dev_root,
                discovery.fallback,
            )?;
            channels.push(channel);
        }
        channels.sort_by_key(|c| c.oid());

        debug!(
            cset = %dir.devname(),
            %direction,
            buffer = %current_buffer,
            trigger = %current_trigger,
            channels = channels.len(),
            "Scanned channel-set"
        );
        Ok(Self {
            dir,
            direction,
            trigger,
            channels: channels.into_iter().map(Channel::into_shared).collect(),
        })
    }

    /// Channel-set name.
    pub fn name(&self) -> String {
        self.dir.name()
    }

    /// Channel-set index within the device.
    pub fn oid(&self) -> Option<u32> {
        self.dir.oid()
    }

    /// Direction of every channel in the set.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Underlying sysfs object.
    pub fn dir(&self) -> &ObjectDir {
        &self.dir
    }

    /// Buffer type name.
    pub fn current_buffer(&self) -> Result<String> {
        self.dir.attribute("current_buffer")?.read()
    }

    /// Switch the buffer type. Takes effect on the next scan.
    pub fn set_current_buffer(&self, name: &str) -> Result<()> {
        self.dir.attribute("current_buffer")?.write(name)
    }

    /// Trigger type name.
    pub fn current_trigger(&self) -> Result<String> {
        self.dir.attribute("current_trigger")?.read()
    }

    /// Switch the trigger type. Takes effect on the next scan.
    pub fn set_current_trigger(&self, name: &str) -> Result<()> {
        self.dir.attribute("current_trigger")?.write(name)
    }

    /// The set's trigger.
    pub fn trigger(&self) -> Option<&Trigger> {
        self.trigger.as_ref()
    }

    /// Channels, ordered by index.
    pub fn channels(&self) -> &[SharedChannel] {
        &self.channels
    }

    /// Whether the set is enabled.
    pub fn is_enabled(&self) -> Result<bool> {
        self.dir.is_enabled()
    }

    /// Enable the set.
    pub fn enable(&self) -> Result<()> {
        self.dir.set_enabled(true)
    }

    /// Disable the set.
    pub fn disable(&self) -> Result<()> {
        self.dir.set_enabled(false)
    }
}

/// `direction` attribute of a channel-set; missing or unparsable means input.
fn cset_direction(dir: &ObjectDir) -> Direction {
    let value = read_or_empty(dir, "direction");
    if value.is_empty() {
        return Direction::Input;
    }
    match value.parse() {
        Ok(direction) => direction,
        Err(e) => {
            warn!(
                object = %dir.path().display(),
                value = %value,
                error = %e,
                "Unknown cset direction, assuming input"
            );
            Direction::Input
        }
    }
}

fn read_or_empty(dir: &ObjectDir, name: &str) -> String {
    match dir.get(name).map(|a| a.read()) {
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            warn!(object = %dir.path().display(), attribute = name, error = %e, "Unreadable attribute");
            String::new()
        }
        None => String::new(),
    }
}

/// One ZIO device.
#[derive(Debug)]
pub struct Device {
    dir: ObjectDir,
    csets: Vec<Cset>,
}

impl Device {
    /// Scan a device directory and everything under it.
    pub fn scan(path: impl Into<PathBuf>, discovery: &Discovery) -> Result<Self> {
        let dir = ObjectDir::scan(path)?;
        let mut csets = Vec::new();
        for path in dir.children_of(ObjectKind::Cset) {
            csets.push(Cset::scan(path.clone(), discovery)?);
        }
        csets.sort_by_key(Cset::oid);
        Ok(Self { dir, csets })
    }

    /// Device name (`name` attribute), e.g. `zzero`.
    pub fn name(&self) -> String {
        self.dir.name()
    }

    /// Device name with instance id, e.g. `zzero-0000`.
    pub fn devname(&self) -> String {
        self.dir.devname()
    }

    /// Instance id.
    pub fn oid(&self) -> Option<u32> {
        self.dir.oid()
    }

    /// Sysfs path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Underlying sysfs object.
    pub fn dir(&self) -> &ObjectDir {
        &self.dir
    }

    /// Channel-sets, ordered by index.
    pub fn csets(&self) -> &[Cset] {
        &self.csets
    }

    /// Channel-set by index.
    pub fn cset(&self, index: u32) -> Option<&Cset> {
        self.csets.iter().find(|c| c.oid() == Some(index))
    }

    /// All channels of all channel-sets.
    pub fn channels(&self) -> impl Iterator<Item = &SharedChannel> {
        self.csets.iter().flat_map(|c| c.channels().iter())
    }

    /// Whether the device is enabled.
    pub fn is_enabled(&self) -> Result<bool> {
        self.dir.is_enabled()
    }

    /// Enable the device.
    pub fn enable(&self) -> Result<()> {
        self.dir.set_enabled(true)
    }

    /// Disable the device.
    pub fn disable(&self) -> Result<()> {
        self.dir.set_enabled(false)
    }
}
