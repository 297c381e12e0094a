//! Char-device interface of a ZIO channel.
//!
//! Every channel exposes two special files under the device root:
//! `<devname>-ctrl` streams [`ControlRecord`]s and `<devname>-data` streams
//! the samples they describe. [`ChannelInterface`] owns both handles and
//! keeps the last control record it read, because the geometry of that
//! record (`sample_size * sample_count`) decides how many bytes the next
//! data read must consume.
//!
//! # Example
//!
//! ```no_run
//! use zio::interface::{ChannelInterface, Direction};
//!
//! # fn example() -> zio::Result<()> {
//! let mut iface = ChannelInterface::new("zzero-0000-0-0", Direction::Input, "/dev/zio");
//! let block = iface.read_block(true, true, true)?;
//! if let Some(ctrl) = &block.control {
//!     println!("{ctrl}");
//! }
//! iface.close_both();
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::control::{ControlRecord, CONTROL_SIZE};
use crate::error::{Resource, Result, ZioError};
use crate::poll;
use crate::samples::{Payload, Samples};

/// Direction of a channel-set, as exported by its `direction` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Device produces blocks
    #[default]
    Input,
    /// Device consumes blocks
    Output,
}

impl Direction {
    /// Open mode used for this direction's streams.
    pub fn open_mode(self) -> OpenMode {
        match self {
            Self::Input => OpenMode::ReadOnly,
            Self::Output => OpenMode::WriteOnly,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

impl FromStr for Direction {
    type Err = ZioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "input" | "in" => Ok(Self::Input),
            "output" | "out" => Ok(Self::Output),
            other => Err(ZioError::Config {
                message: format!("unknown direction '{other}'"),
            }),
        }
    }
}

/// How a stream is opened. Duplex access is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// `O_RDONLY`
    ReadOnly,
    /// `O_WRONLY`
    WriteOnly,
}

/// Which of the two streams are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceState {
    /// Nothing open
    Closed,
    /// Only the control stream is open
    ControlOpen,
    /// Only the data stream is open
    DataOpen,
    /// Both streams are open
    Ready,
}

/// Sample geometry: how many bytes a data read consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Bytes per sample
    pub sample_size: u16,
    /// Samples per block
    pub sample_count: u32,
}

impl Geometry {
    /// Geometry used when no control record has been read yet.
    pub const FALLBACK: Self = Self {
        sample_size: 1,
        sample_count: 16,
    };

    /// Bytes in one block of this geometry.
    ///
    /// Always fits: the product of a `u16` and a `u32` is below 2^48.
    pub fn byte_len(&self) -> u64 {
        u64::from(self.sample_size) * u64::from(self.sample_count)
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::FALLBACK
    }
}

impl From<&ControlRecord> for Geometry {
    fn from(ctrl: &ControlRecord) -> Self {
        Self {
            sample_size: ctrl.sample_size,
            sample_count: ctrl.sample_count,
        }
    }
}

/// Readiness of the open streams, as reported by [`ChannelInterface::is_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    /// A read-only stream can be read without blocking
    pub input: bool,
    /// A write-only stream can be written without blocking
    pub output: bool,
}

/// One acquisition block: a control record and/or its payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    /// Control record, if requested
    pub control: Option<ControlRecord>,
    /// Data payload, if requested
    pub data: Option<Payload>,
}

impl Block {
    /// Decoded samples, if the block carries them.
    pub fn samples(&self) -> Option<&Samples> {
        self.data.as_ref().and_then(Payload::samples)
    }
}

#[derive(Debug)]
struct Stream {
    file: File,
    mode: OpenMode,
}

impl Stream {
    fn open(path: &Path, mode: OpenMode) -> std::io::Result<Self> {
        let file = match mode {
            OpenMode::ReadOnly => OpenOptions::new().read(true).open(path)?,
            OpenMode::WriteOnly => OpenOptions::new().write(true).open(path)?,
        };
        Ok(Self { file, mode })
    }

    fn events(&self) -> libc::c_short {
        match self.mode {
            OpenMode::ReadOnly => poll::READ_EVENTS,
            OpenMode::WriteOnly => poll::WRITE_EVENTS,
        }
    }
}

/// Initial buffer capacity for a read; larger blocks grow as bytes arrive.
const READ_CHUNK: u64 = 64 * 1024;

/// Read up to `len` bytes, stopping early only at end of stream.
///
/// Memory grows with the bytes actually delivered, not with `len`, so a
/// corrupt geometry ends in a short read instead of a huge allocation.
fn read_up_to(file: &mut File, len: u64) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(len.min(READ_CHUNK) as usize);
    file.by_ref().take(len).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Control and data streams of one channel.
///
/// Opening and closing are idempotent. Input channels open their streams
/// read-only and output channels write-only.
///
/// # Thread Safety
///
/// The interface is not internally synchronized. Share it between threads
/// only behind a lock, as [`SharedChannel`](crate::channel::SharedChannel) does.
#[derive(Debug)]
pub struct ChannelInterface {
    devname: String,
    direction: Direction,
    control_path: PathBuf,
    data_path: PathBuf,
    control: Option<Stream>,
    data: Option<Stream>,
    last_control: Option<ControlRecord>,
    fallback: Geometry,
}

impl ChannelInterface {
    /// Interface for `devname` with its device files under `dev_root`.
    pub fn new(devname: impl Into<String>, direction: Direction, dev_root: impl AsRef<Path>) -> Self {
        let devname = devname.into();
        let root = dev_root.as_ref();
        let control_path = root.join(format!("{devname}-ctrl"));
        let data_path = root.join(format!("{devname}-data"));
        Self::with_paths(devname, direction, control_path, data_path)
    }

    /// Interface over explicit control and data file paths.
    pub fn with_paths(
        devname: impl Into<String>,
        direction: Direction,
        control_path: impl Into<PathBuf>,
        data_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            devname: devname.into(),
            direction,
            control_path: control_path.into(),
            data_path: data_path.into(),
            control: None,
            data: None,
            last_control: None,
            fallback: Geometry::FALLBACK,
        }
    }

    /// Replace the geometry used before any control record has been read.
    pub fn with_fallback_geometry(mut self, geometry: Geometry) -> Self {
        self.fallback = geometry;
        self
    }

    /// Channel device name.
    pub fn devname(&self) -> &str {
        &self.devname
    }

    /// Configured direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Path of the control stream.
    pub fn control_path(&self) -> &Path {
        &self.control_path
    }

    /// Path of the data stream.
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Last control record read, if any.
    pub fn last_control(&self) -> Option<&ControlRecord> {
        self.last_control.as_ref()
    }

    /// Which streams are open.
    pub fn state(&self) -> InterfaceState {
        match (self.control.is_some(), self.data.is_some()) {
            (false, false) => InterfaceState::Closed,
            (true, false) => InterfaceState::ControlOpen,
            (false, true) => InterfaceState::DataOpen,
            (true, true) => InterfaceState::Ready,
        }
    }

    /// Descriptor of the control stream, if open.
    pub fn control_fd(&self) -> Option<RawFd> {
        self.control.as_ref().map(|s| s.file.as_raw_fd())
    }

    /// Descriptor of the data stream, if open.
    pub fn data_fd(&self) -> Option<RawFd> {
        self.data.as_ref().map(|s| s.file.as_raw_fd())
    }

    /// Whether the control file permits reading for this process.
    pub fn is_control_readable(&self) -> bool {
        crate::sysfs::permits(&self.control_path, 0o444)
    }

    /// Whether the control file permits writing for this process.
    pub fn is_control_writable(&self) -> bool {
        crate::sysfs::permits(&self.control_path, 0o222)
    }

    /// Whether the data file permits reading for this process.
    pub fn is_data_readable(&self) -> bool {
        crate::sysfs::permits(&self.data_path, 0o444)
    }

    /// Whether the data file permits writing for this process.
    pub fn is_data_writable(&self) -> bool {
        crate::sysfs::permits(&self.data_path, 0o222)
    }

    /// Open the control stream. A no-op if it is already open.
    pub fn open_control(&mut self, mode: OpenMode) -> Result<RawFd> {
        if let Some(stream) = &self.control {
            return Ok(stream.file.as_raw_fd());
        }
        let stream = Stream::open(&self.control_path, mode)?;
        let fd = stream.file.as_raw_fd();
        debug!(channel = %self.devname, path = %self.control_path.display(), ?mode, fd, "Opened control stream");
        self.control = Some(stream);
        Ok(fd)
    }

    /// Open the data stream. A no-op if it is already open.
    pub fn open_data(&mut self, mode: OpenMode) -> Result<RawFd> {
        if let Some(stream) = &self.data {
            return Ok(stream.file.as_raw_fd());
        }
        let stream = Stream::open(&self.data_path, mode)?;
        let fd = stream.file.as_raw_fd();
        debug!(channel = %self.devname, path = %self.data_path.display(), ?mode, fd, "Opened data stream");
        self.data = Some(stream);
        Ok(fd)
    }

    /// Open both streams in `mode`.
    pub fn open_both(&mut self, mode: OpenMode) -> Result<(RawFd, RawFd)> {
        let control = self.open_control(mode)?;
        let data = self.open_data(mode)?;
        Ok((control, data))
    }

    /// Open both streams in the mode implied by the channel direction.
    pub fn open(&mut self) -> Result<(RawFd, RawFd)> {
        self.open_both(self.direction.open_mode())
    }

    /// Close the control stream. Safe to call when already closed.
    pub fn close_control(&mut self) {
        if self.control.take().is_some() {
            debug!(channel = %self.devname, "Closed control stream");
        }
    }

    /// Close the data stream. Safe to call when already closed.
    pub fn close_data(&mut self) {
        if self.data.take().is_some() {
            debug!(channel = %self.devname, "Closed data stream");
        }
    }

    /// Close both streams. Safe to call repeatedly.
    pub fn close_both(&mut self) {
        self.close_control();
        self.close_data();
    }

    fn readable(&mut self, resource: Resource) -> Result<&mut File> {
        let stream = match resource {
            Resource::Control => self.control.as_mut(),
            Resource::Data => self.data.as_mut(),
        };
        match stream {
            Some(s) if s.mode == OpenMode::ReadOnly => Ok(&mut s.file),
            _ => Err(ZioError::NotReadable { resource }),
        }
    }

    fn require_writable(&self, resource: Resource) -> Result<()> {
        let stream = match resource {
            Resource::Control => self.control.as_ref(),
            Resource::Data => self.data.as_ref(),
        };
        match stream {
            Some(s) if s.mode == OpenMode::WriteOnly => Ok(()),
            _ => Err(ZioError::NotWritable { resource }),
        }
    }

    /// Read and decode the next control record.
    ///
    /// # Errors
    ///
    /// - [`ZioError::NotReadable`] if the control stream is not open for reading
    /// - [`ZioError::MalformedRecord`] if the stream delivered a short record
    pub fn read_control(&mut self) -> Result<ControlRecord> {
        let file = self.readable(Resource::Control)?;
        let bytes = read_up_to(file, CONTROL_SIZE as u64)?;
        let ctrl = ControlRecord::decode(&bytes)?;
        trace!(
            channel = %self.devname,
            seq = ctrl.sequence_number,
            nsamples = ctrl.sample_count,
            ssize = ctrl.sample_size,
            "Read control"
        );
        self.last_control = Some(ctrl.clone());
        Ok(ctrl)
    }

    fn geometry_for(&self, control: Option<&ControlRecord>) -> Geometry {
        if let Some(ctrl) = control.or(self.last_control.as_ref()) {
            return Geometry::from(ctrl);
        }
        warn!(
            channel = %self.devname,
            sample_size = self.fallback.sample_size,
            sample_count = self.fallback.sample_count,
            "No control record read yet, falling back to default geometry"
        );
        self.fallback
    }

    /// Read one block of data.
    ///
    /// The geometry comes from `control`, else the last control read, else
    /// the fallback geometry (with a warning). Exactly
    /// `sample_size * sample_count` bytes are consumed.
    ///
    /// # Errors
    ///
    /// - [`ZioError::NotReadable`] if the data stream is not open for reading
    /// - [`ZioError::ShortRead`] if the stream ended early
    pub fn read_data(&mut self, control: Option<&ControlRecord>, decode: bool) -> Result<Payload> {
        self.readable(Resource::Data)?;
        let geometry = self.geometry_for(control);
        let expected = geometry.byte_len();

        let file = self.readable(Resource::Data)?;
        let bytes = read_up_to(file, expected)?;
        if bytes.len() as u64 != expected {
            return Err(ZioError::ShortRead {
                resource: Resource::Data,
                expected,
                actual: bytes.len() as u64,
            });
        }
        trace!(channel = %self.devname, bytes = expected, "Read data");

        if decode {
            Ok(Payload::Samples(Samples::decode(&bytes, geometry.sample_size)))
        } else {
            Ok(Payload::Raw(bytes))
        }
    }

    /// Read a block: control first, then the data it describes.
    ///
    /// Both streams are opened read-only on demand. The data read uses the
    /// control record read in this same call when `want_control` is set.
    pub fn read_block(&mut self, want_control: bool, want_data: bool, decode: bool) -> Result<Block> {
        self.open_both(OpenMode::ReadOnly)?;

        let control = if want_control {
            Some(self.read_control()?)
        } else {
            None
        };
        let data = if want_data {
            Some(self.read_data(control.as_ref(), decode)?)
        } else {
            None
        };
        Ok(Block { control, data })
    }

    /// Write a control record to an output channel.
    ///
    /// # Errors
    ///
    /// [`ZioError::NotWritable`] or [`ZioError::InvalidOutputRecord`] when the
    /// preconditions fail; otherwise [`ZioError::Unsupported`], as output
    /// framing is not defined at this layer.
    pub fn write_control(&mut self, control: &ControlRecord) -> Result<()> {
        self.require_writable(Resource::Control)?;
        control.check_output()?;
        Err(ZioError::Unsupported {
            operation: "write_control",
        })
    }

    /// Write samples to an output channel. Always [`ZioError::Unsupported`] once writable.
    pub fn write_data(&mut self, _samples: &Samples) -> Result<()> {
        self.require_writable(Resource::Data)?;
        Err(ZioError::Unsupported {
            operation: "write_data",
        })
    }

    /// Write a control record and its samples. Same contract as [`write_control`](Self::write_control).
    pub fn write_block(&mut self, control: &ControlRecord, _samples: &Samples) -> Result<()> {
        self.require_writable(Resource::Control)?;
        self.require_writable(Resource::Data)?;
        control.check_output()?;
        Err(ZioError::Unsupported {
            operation: "write_block",
        })
    }

    /// Poll the open streams.
    ///
    /// `Some(Duration::ZERO)` returns immediately, `None` blocks until an
    /// event arrives, any other value waits up to that long. Read-only
    /// streams are probed for input, write-only streams for output. With
    /// nothing open, nothing is ready.
    pub fn is_ready(&self, timeout: Option<Duration>) -> Result<Readiness> {
        let streams: Vec<&Stream> = [self.control.as_ref(), self.data.as_ref()]
            .into_iter()
            .flatten()
            .collect();
        if streams.is_empty() {
            return Ok(Readiness::default());
        }

        let mut fds: Vec<libc::pollfd> = streams
            .iter()
            .map(|s| poll::entry(s.file.as_raw_fd(), s.events()))
            .collect();
        if poll::wait(&mut fds, timeout)? == 0 {
            return Ok(Readiness::default());
        }

        // a hangup or error counts as ready: the next read or write fails fast
        let mut ready = Readiness::default();
        for (stream, fd) in streams.iter().zip(&fds) {
            if fd.revents & (stream.events() | poll::HANGUP_EVENTS) == 0 {
                continue;
            }
            match stream.mode {
                OpenMode::ReadOnly => ready.input = true,
                OpenMode::WriteOnly => ready.output = true,
            }
        }
        Ok(ready)
    }
}
