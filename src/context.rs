//! Discovery context: the devices currently on the ZIO bus.
//!
//! [`ZioContext`] scans `<sysfs_bus>/devices` once on creation and again
//! on every [`refresh`](ZioContext::refresh). Devices are grouped by name
//! and instance id, the way their devnames (`<name>-<id>`) encode them.
//!
//! # Example
//! ```no_run
//! use zio::{ZioConfig, ZioContext};
//!
//! # fn main() -> zio::Result<()> {
//! let ctx = ZioContext::new(ZioConfig::default())?;
//! for dev in ctx.devices() {
//!     println!("{} ({} csets)", dev.devname(), dev.csets().len());
//! }
//! println!("buffers: {:?}", ctx.available_buffers());
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::channel::SharedChannel;
use crate::config::ZioConfig;
use crate::device::{Device, Discovery};
use crate::error::{Result, ZioError};
use crate::interface::Direction;
use crate::mux::BlockSource;
use crate::sysfs::{permits, Attribute};

/// Device directories with this marker are hardware parents, not ZIO devices.
const HW_MARKER: &str = "hw-";

/// Live view of the ZIO bus.
#[derive(Debug)]
pub struct ZioContext {
    config: ZioConfig,
    discovery: Discovery,
    devices: Vec<Device>,
    buffers: Vec<String>,
    triggers: Vec<String>,
}

impl ZioContext {
    /// Scan the bus described by `config`.
    ///
    /// # Errors
    ///
    /// [`ZioError::NotLoaded`] if the framework is not loaded, or any error
    /// from scanning a device.
    pub fn new(config: ZioConfig) -> Result<Self> {
        let mut discovery = Discovery::new(&config.paths.dev_root);
        discovery.fallback = config.acquisition.fallback_geometry();
        let mut ctx = Self {
            config,
            discovery,
            devices: Vec::new(),
            buffers: Vec::new(),
            triggers: Vec::new(),
        };
        ctx.refresh()?;
        Ok(ctx)
    }

    /// Configuration in use.
    pub fn config(&self) -> &ZioConfig {
        &self.config
    }

    /// Registries and paths used for object construction.
    ///
    /// Register custom buffer or trigger types here, then [`refresh`](Self::refresh).
    pub fn discovery_mut(&mut self) -> &mut Discovery {
        &mut self.discovery
    }

    /// Whether the bus directory exists and exports its type lists.
    pub fn is_loaded(&self) -> bool {
        is_loaded(&self.config.paths.sysfs_bus)
    }

    /// Re-read the type lists and rebuild every device.
    ///
    /// Channels handed out before the refresh stay valid but are no longer
    /// part of the context.
    pub fn refresh(&mut self) -> Result<()> {
        let bus = &self.config.paths.sysfs_bus;
        if !is_loaded(bus) {
            return Err(ZioError::NotLoaded { path: bus.clone() });
        }
        self.buffers = read_list(bus, "available_buffers");
        self.triggers = read_list(bus, "available_triggers");

        let devices_dir = self.config.paths.devices_dir();
        let mut entries: Vec<_> = fs::read_dir(&devices_dir)
            .map_err(|source| ZioError::Attribute {
                path: devices_dir.clone(),
                source,
            })?
            .collect::<std::io::Result<_>>()?;
        entries.sort_by_key(|e| e.file_name());

        let mut devices = Vec::new();
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.contains(HW_MARKER) {
                debug!(device = %name, "Skipping hardware parent");
                continue;
            }
            devices.push(Device::scan(entry.path(), &self.discovery)?);
        }
        devices.sort_by(|a, b| (a.name(), a.oid()).cmp(&(b.name(), b.oid())));

        info!(
            devices = devices.len(),
            buffers = self.buffers.len(),
            triggers = self.triggers.len(),
            "Discovered ZIO bus"
        );
        self.devices = devices;
        Ok(())
    }

    /// All devices, ordered by name then instance id.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Device by name and instance id.
    pub fn device(&self, name: &str, id: u32) -> Option<&Device> {
        self.devices
            .iter()
            .find(|d| d.name() == name && d.oid() == Some(id))
    }

    /// Every channel of every device.
    pub fn channels(&self) -> impl Iterator<Item = &SharedChannel> {
        self.devices.iter().flat_map(Device::channels)
    }

    /// Channel by devname, e.g. `zzero-0000-0-0`.
    pub fn channel(&self, devname: &str) -> Option<SharedChannel> {
        self.channels()
            .find(|c| c.lock().devname() == devname)
            .cloned()
    }

    /// Buffer types from `available_buffers`.
    pub fn available_buffers(&self) -> &[String] {
        &self.buffers
    }

    /// Trigger types from `available_triggers`.
    pub fn available_triggers(&self) -> &[String] {
        &self.triggers
    }

    /// Open the control stream of every channel with an interface.
    ///
    /// Only channels matching `direction`, when given, are opened and
    /// returned. Streams open in the channel direction's mode.
    pub fn open_channels(&self, direction: Option<Direction>) -> Result<Vec<SharedChannel>> {
        let mut opened = Vec::new();
        for channel in self.channels() {
            let mut guard = channel.lock();
            if direction.is_some_and(|d| d != guard.direction()) {
                continue;
            }
            let mode = guard.direction().open_mode();
            let Some(iface) = guard.interface_mut() else {
                continue;
            };
            iface.open_control(mode)?;
            drop(guard);
            opened.push(channel.clone());
        }
        debug!(count = opened.len(), ?direction, "Opened channels");
        Ok(opened)
    }
}

/// Whether ZIO is loaded at `bus`: the directory exists and at least one of
/// `available_buffers` or `available_triggers` is readable.
pub fn is_loaded(bus: &Path) -> bool {
    if !bus.is_dir() {
        return false;
    }
    ["available_buffers", "available_triggers"]
        .iter()
        .any(|name| permits(&bus.join(name), 0o444))
}

fn read_list(bus: &Path, name: &str) -> Vec<String> {
    match Attribute::new(bus, name).read() {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect(),
        Err(e) => {
            warn!(error = %e, "Could not read {name}");
            Vec::new()
        }
    }
}
