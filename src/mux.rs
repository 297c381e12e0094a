//! Readiness multiplexing across many channels.
//!
//! The [`Multiplexer`] keeps a wait set keyed by each channel's control
//! descriptor and turns one `poll(2)` over that set into `(channel, block)`
//! pairs. It holds only [`Weak`] references: dropping a channel, or closing
//! and reopening its control stream, silently removes it from the wait set
//! at the start of the next cycle. A control stream that hangs up is read
//! one last time, so the caller sees the end-of-stream error, and then
//! dropped.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use zio::{Direction, Multiplexer, ZioConfig, ZioContext};
//!
//! # fn example() -> zio::Result<()> {
//! let ctx = ZioContext::new(ZioConfig::default())?;
//! let channels = ctx.open_channels(Some(Direction::Input))?;
//!
//! let mut mux = Multiplexer::new();
//! mux.register(&channels, Some(Direction::Input))?;
//! for item in mux.next_ready(Some(Duration::from_secs(1))).take(10) {
//!     let (channel, block) = item?;
//!     println!("{}: {:?}", channel.lock().name(), block.control);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{Result, ZioError};
use crate::interface::{Block, ChannelInterface, Direction};
use crate::poll;

/// Anything that can hand the multiplexer a channel interface.
///
/// Implemented by [`ChannelInterface`] itself and by the sysfs
/// [`Channel`](crate::channel::Channel), which owns one when its device
/// exposes character devices.
pub trait BlockSource {
    /// Direction of the channel.
    fn direction(&self) -> Direction;

    /// The channel's interface, if it has one.
    fn interface_mut(&mut self) -> Option<&mut ChannelInterface>;
}

impl BlockSource for ChannelInterface {
    fn direction(&self) -> Direction {
        ChannelInterface::direction(self)
    }

    fn interface_mut(&mut self) -> Option<&mut ChannelInterface> {
        Some(self)
    }
}

/// A ready channel and the outcome of reading its block.
pub struct ReadyBlock<C> {
    /// The channel whose control stream became readable
    pub channel: Arc<Mutex<C>>,
    /// Block read from it
    pub block: Result<Block>,
}

struct Registration<C> {
    fd: RawFd,
    channel: Weak<Mutex<C>>,
}

impl<C: BlockSource> Registration<C> {
    /// Still worth waiting on: channel alive and control stream unchanged.
    fn is_live(&self) -> bool {
        match self.channel.upgrade() {
            Some(channel) => {
                let mut guard = channel.lock();
                let fd = guard.interface_mut().and_then(|iface| iface.control_fd());
                fd == Some(self.fd)
            }
            None => false,
        }
    }
}

/// Wait set over many channels.
pub struct Multiplexer<C> {
    registrations: Vec<Registration<C>>,
    decode: bool,
}

impl<C: BlockSource> Default for Multiplexer<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: BlockSource> Multiplexer<C> {
    /// Empty multiplexer that decodes sample payloads.
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            decode: true,
        }
    }

    /// Yield raw data bytes instead of decoded samples.
    pub fn raw(mut self) -> Self {
        self.decode = false;
        self
    }

    /// Number of registered descriptors, live or not.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Add channels to the wait set.
    ///
    /// Channels without an interface, or whose direction does not match
    /// `direction` when given, are skipped. Output channels are skipped too:
    /// they never deliver blocks, and a write-only stream is always ready.
    /// Each remaining channel gets its control stream opened read-only.
    /// Re-registering a descriptor already in the set is a no-op.
    ///
    /// Returns the number of descriptors added.
    pub fn register(
        &mut self,
        channels: &[Arc<Mutex<C>>],
        direction: Option<Direction>,
    ) -> Result<usize> {
        let mut added = 0;
        for channel in channels {
            let mut guard = channel.lock();
            let dir = guard.direction();
            if direction.is_some_and(|d| d != dir) {
                continue;
            }
            let Some(iface) = guard.interface_mut() else {
                continue;
            };
            if dir == Direction::Output {
                debug!(channel = %iface.devname(), "Skipped output channel");
                continue;
            }
            let fd = iface.open_control(dir.open_mode())?;
            let devname = iface.devname().to_string();
            drop(guard);

            if self.registrations.iter().any(|r| r.fd == fd) {
                continue;
            }
            debug!(channel = %devname, fd, "Registered channel");
            self.registrations.push(Registration {
                fd,
                channel: Arc::downgrade(channel),
            });
            added += 1;
        }
        Ok(added)
    }

    /// Drop registrations whose channel is gone or whose control stream changed.
    pub fn prune(&mut self) -> usize {
        let before = self.registrations.len();
        self.registrations.retain(|r| {
            let live = r.is_live();
            if !live {
                debug!(fd = r.fd, "Pruned stale registration");
            }
            live
        });
        before - self.registrations.len()
    }

    /// Run one wait cycle.
    ///
    /// Returns, in registration order, one [`ReadyBlock`] per channel whose
    /// control stream reported input readiness or a hangup. An empty vector
    /// means the timeout expired. Registrations that hung up with nothing
    /// left to read, or whose descriptor is invalid, leave the wait set.
    ///
    /// # Errors
    ///
    /// [`ZioError::NoChannelsRegistered`] if no live registration remains,
    /// or an I/O error from the wait itself.
    pub fn wait_cycle(&mut self, timeout: Option<Duration>) -> Result<Vec<ReadyBlock<C>>> {
        self.prune();
        if self.registrations.is_empty() {
            return Err(ZioError::NoChannelsRegistered);
        }

        let mut fds: Vec<libc::pollfd> = self
            .registrations
            .iter()
            .map(|r| poll::entry(r.fd, poll::READ_EVENTS))
            .collect();
        let count = poll::wait(&mut fds, timeout)?;
        trace!(registered = fds.len(), ready = count, "Wait cycle");

        let mut ready = Vec::new();
        let mut finished = Vec::new();
        for (reg, pfd) in self.registrations.iter().zip(&fds) {
            let revents = pfd.revents;
            if revents & libc::POLLNVAL != 0 {
                debug!(fd = reg.fd, "Dropped invalid descriptor");
                finished.push(reg.fd);
                continue;
            }
            if revents & (poll::READ_EVENTS | poll::HANGUP_EVENTS) == 0 {
                continue;
            }
            if revents & poll::READ_EVENTS == 0 {
                debug!(fd = reg.fd, revents, "Control stream hung up");
                finished.push(reg.fd);
            }
            // closed between prune and wakeup
            let Some(channel) = reg.channel.upgrade() else {
                continue;
            };
            let mut guard = channel.lock();
            let block = match guard.interface_mut() {
                Some(iface) if iface.control_fd() == Some(reg.fd) => {
                    iface.read_block(true, true, self.decode)
                }
                _ => continue,
            };
            drop(guard);
            ready.push(ReadyBlock { channel, block });
        }
        if !finished.is_empty() {
            self.registrations.retain(|r| !finished.contains(&r.fd));
        }
        Ok(ready)
    }

    /// Endless iterator of ready `(channel, block)` pairs.
    ///
    /// Each underlying wait uses `timeout`; cycles that time out are
    /// retried. A failed read on one channel is yielded as an error and
    /// iteration continues. A failed wait is yielded once and ends the
    /// iteration.
    pub fn next_ready(&mut self, timeout: Option<Duration>) -> NextReady<'_, C> {
        NextReady {
            mux: self,
            timeout,
            pending: VecDeque::new(),
            finished: false,
        }
    }
}

/// Iterator returned by [`Multiplexer::next_ready`].
pub struct NextReady<'a, C> {
    mux: &'a mut Multiplexer<C>,
    timeout: Option<Duration>,
    pending: VecDeque<ReadyBlock<C>>,
    finished: bool,
}

impl<C: BlockSource> Iterator for NextReady<'_, C> {
    type Item = Result<(Arc<Mutex<C>>, Block)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(ready) = self.pending.pop_front() {
                return Some(ready.block.map(|block| (ready.channel, block)));
            }
            if self.finished {
                return None;
            }
            match self.mux.wait_cycle(self.timeout) {
                Ok(batch) => self.pending.extend(batch),
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
