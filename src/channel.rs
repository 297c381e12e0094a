//! Channels: the leaves of the ZIO object tree.
//!
//! A channel directory holds the channel attributes, a `buffer/`
//! sub-directory, the binary `current-control` attribute and, when the
//! device exports character devices, a `zio-cdev` entry. Only channels with
//! that entry get a [`ChannelInterface`].

use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::buffer::Buffer;
use crate::control::{ControlRecord, CONTROL_SIZE};
use crate::error::{Result, ZioError};
use crate::interface::{Block, ChannelInterface, Direction, Geometry, Readiness};
use crate::mux::BlockSource;
use crate::registry::Registry;
use crate::sysfs::{ObjectDir, ObjectKind};

/// A channel shared between its owner and a [`Multiplexer`](crate::mux::Multiplexer).
pub type SharedChannel = Arc<Mutex<Channel>>;

/// Name of the interleaved pseudo-channel.
const INTERLEAVED_NAME: &str = "chani";

/// One ZIO channel.
#[derive(Debug)]
pub struct Channel {
    dir: ObjectDir,
    devname: String,
    direction: Direction,
    buffer: Option<Buffer>,
    current_control: Option<PathBuf>,
    interface: Option<ChannelInterface>,
}

impl Channel {
    /// Scan a channel directory.
    ///
    /// `current_buffer` is the buffer type of the parent channel-set and
    /// selects the constructor from `buffers`. The interface, if any, uses
    /// `<dev_root>/<devname>-ctrl` and `-data`.
    pub fn scan(
        path: impl Into<PathBuf>,
        direction: Direction,
        current_buffer: &str,
        buffers: &Registry<Buffer>,
        dev_root: &Path,
        fallback: Geometry,
    ) -> Result<Self> {
        let dir = ObjectDir::scan(path)?;
        let devname = dir.devname();

        let buffer = match dir.children_of(ObjectKind::Buffer).next() {
            Some(path) => Some(buffers.build(current_buffer, ObjectDir::scan(path)?)),
            None => None,
        };
        let current_control = dir.get("current-control").map(|a| a.path().to_path_buf());
        let interface = dir.children_of(ObjectKind::Cdev).next().map(|_| {
            ChannelInterface::new(devname.clone(), direction, dev_root).with_fallback_geometry(fallback)
        });
        if interface.is_none() {
            debug!(channel = %devname, "No char-device interface");
        }

        Ok(Self {
            dir,
            devname,
            direction,
            buffer,
            current_control,
            interface,
        })
    }

    /// Wrap into a [`SharedChannel`].
    pub fn into_shared(self) -> SharedChannel {
        Arc::new(Mutex::new(self))
    }

    /// Channel name (`name` attribute).
    pub fn name(&self) -> String {
        self.dir.name()
    }

    /// Device name used for the character devices.
    pub fn devname(&self) -> &str {
        &self.devname
    }

    /// Channel index within its channel-set.
    pub fn oid(&self) -> Option<u32> {
        self.dir.oid()
    }

    /// Direction inherited from the channel-set.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Underlying sysfs object.
    pub fn dir(&self) -> &ObjectDir {
        &self.dir
    }

    /// The channel's buffer.
    pub fn buffer(&self) -> Option<&Buffer> {
        self.buffer.as_ref()
    }

    /// The char-device interface, if the channel has one.
    pub fn interface(&self) -> Option<&ChannelInterface> {
        self.interface.as_ref()
    }

    /// Whether this is the interleaved channel of its set.
    pub fn is_interleaved(&self) -> bool {
        self.name() == INTERLEAVED_NAME
    }

    /// Whether the channel is enabled.
    pub fn is_enabled(&self) -> Result<bool> {
        self.dir.is_enabled()
    }

    /// Enable the channel.
    pub fn enable(&self) -> Result<()> {
        self.dir.set_enabled(true)
    }

    /// Disable the channel.
    pub fn disable(&self) -> Result<()> {
        self.dir.set_enabled(false)
    }

    fn current_control_path(&self) -> Result<&Path> {
        self.current_control.as_deref().ok_or_else(|| ZioError::MissingAttribute {
            name: "current-control".to_string(),
            object: self.dir.path().to_path_buf(),
        })
    }

    /// Read the channel's current control record.
    pub fn current_control(&self) -> Result<ControlRecord> {
        let path = self.current_control_path()?;
        let mut bytes = Vec::with_capacity(CONTROL_SIZE);
        File::open(path)
            .and_then(|f| f.take(CONTROL_SIZE as u64 + 1).read_to_end(&mut bytes))
            .map_err(|source| ZioError::Attribute {
                path: path.to_path_buf(),
                source,
            })?;
        ControlRecord::decode(&bytes)
    }

    /// Replace the channel's current control record.
    ///
    /// # Errors
    ///
    /// [`ZioError::InvalidOutputRecord`] if `ctrl` fails the output rule;
    /// nothing is written in that case.
    pub fn set_current_control(&self, ctrl: &ControlRecord) -> Result<()> {
        let path = self.current_control_path()?;
        ctrl.check_output()?;
        File::options()
            .write(true)
            .open(path)
            .and_then(|mut f| f.write_all(&ctrl.encode()))
            .map_err(|source| ZioError::Attribute {
                path: path.to_path_buf(),
                source,
            })
    }

    fn require_interface(&mut self) -> Result<&mut ChannelInterface> {
        let devname = &self.devname;
        self.interface.as_mut().ok_or_else(|| ZioError::NotFound {
            what: format!("char-device interface for {devname}"),
        })
    }

    /// Open both streams in the mode implied by the direction.
    pub fn open_interface(&mut self) -> Result<(RawFd, RawFd)> {
        self.require_interface()?.open()
    }

    /// Close both streams, if there is an interface.
    pub fn close_interface(&mut self) {
        if let Some(iface) = self.interface.as_mut() {
            iface.close_both();
        }
    }

    /// Read one block through the interface.
    pub fn read_block(&mut self, want_control: bool, want_data: bool, decode: bool) -> Result<Block> {
        self.require_interface()?
            .read_block(want_control, want_data, decode)
    }

    /// Readiness of the interface streams.
    pub fn is_ready(&self, timeout: Option<Duration>) -> Result<Readiness> {
        match &self.interface {
            Some(iface) => iface.is_ready(timeout),
            None => Ok(Readiness::default()),
        }
    }
}

impl BlockSource for Channel {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn interface_mut(&mut self) -> Option<&mut ChannelInterface> {
        self.interface.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn scan(root: &Path) -> Channel {
        Channel::scan(
            root.join("chan0"),
            Direction::Input,
            "kmalloc",
            &Buffer::registry(),
            &root.join("dev"),
            Geometry::FALLBACK,
        )
        .unwrap()
    }

    fn layout(with_cdev: bool) -> TempDir {
        let tmp = TempDir::new().unwrap();
        let chan = tmp.path().join("chan0");
        fs::create_dir_all(chan.join("buffer")).unwrap();
        fs::write(chan.join("name"), "chani\n").unwrap();
        fs::write(chan.join("devname"), "zzero-0000-0-0\n").unwrap();
        fs::write(chan.join("enable"), "1\n").unwrap();
        fs::write(chan.join("current-control"), ControlRecord::default().encode()).unwrap();
        if with_cdev {
            fs::create_dir(chan.join("zio-cdev")).unwrap();
        }
        tmp
    }

    #[test]
    fn test_scan() {
        let tmp = layout(true);
        let chan = scan(tmp.path());
        assert_eq!(chan.devname(), "zzero-0000-0-0");
        assert_eq!(chan.oid(), Some(0));
        assert!(chan.is_interleaved());
        assert!(chan.buffer().is_some());
        let iface = chan.interface().unwrap();
        assert_eq!(
            iface.control_path(),
            tmp.path().join("dev/zzero-0000-0-0-ctrl")
        );
    }

    #[test]
    fn test_without_cdev() {
        let tmp = layout(false);
        let mut chan = scan(tmp.path());
        assert!(chan.interface().is_none());
        assert!(matches!(
            chan.read_block(true, true, true),
            Err(ZioError::NotFound { .. })
        ));
        assert_eq!(chan.is_ready(Some(Duration::ZERO)).unwrap(), Readiness::default());
    }

    #[test]
    fn test_current_control() {
        let tmp = layout(false);
        let chan = scan(tmp.path());
        assert_eq!(chan.current_control().unwrap(), ControlRecord::default());

        let mut ctrl = ControlRecord::default();
        ctrl.sample_count = 16;
        ctrl.trigger_attributes.set_standard(2, 16);
        chan.set_current_control(&ctrl).unwrap();
        assert_eq!(chan.current_control().unwrap(), ctrl);

        ctrl.sample_count = 10;
        assert!(matches!(
            chan.set_current_control(&ctrl),
            Err(ZioError::InvalidOutputRecord { .. })
        ));
        assert_eq!(chan.current_control().unwrap().sample_count, 16);
    }

    #[test]
    fn test_enable_disable() {
        let tmp = layout(false);
        let chan = scan(tmp.path());
        chan.disable().unwrap();
        assert!(!chan.is_enabled().unwrap());
        chan.enable().unwrap();
        assert!(chan.is_enabled().unwrap());
    }
}
