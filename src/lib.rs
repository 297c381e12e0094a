//! # ZIO user-space library
//!
//! Access to devices of the ZIO acquisition framework from user space:
//! discovery of the sysfs object tree, decoding of the binary control
//! records that describe every block, and block I/O over each channel's
//! `-ctrl`/`-data` character devices.
//!
//! ## Crate Structure
//!
//! - **`control`**: the [`ControlRecord`] codec and its sub-structures.
//! - **`samples`**: decoding of data payloads by sample size.
//! - **`interface`**: [`ChannelInterface`], the per-channel stream state machine.
//! - **`mux`**: [`Multiplexer`], one readiness wait across many channels.
//! - **`sysfs`**: attribute files and object directory scanning.
//! - **`device`**, **`channel`**, **`buffer`**, **`trigger`**: the typed object tree.
//! - **`registry`**: buffer and trigger type registries.
//! - **`context`**: [`ZioContext`], the discovered bus.
//! - **`config`** and **`logging`**: figment configuration and tracing setup.
//! - **`error`**: the [`ZioError`] enum.
//!
//! ## Example
//!
//! ```no_run
//! use zio::{Direction, Multiplexer, ZioConfig, ZioContext};
//!
//! # fn main() -> zio::Result<()> {
//! let config = ZioConfig::load()?;
//! let ctx = ZioContext::new(config)?;
//!
//! let channel = ctx.channel("zzero-0000-0-0").ok_or(zio::ZioError::NotFound {
//!     what: "zzero-0000-0-0".into(),
//! })?;
//! let block = channel.lock().read_block(true, true, true)?;
//! println!("{:?}", block.samples());
//!
//! let mut mux = Multiplexer::new();
//! mux.register(&ctx.open_channels(Some(Direction::Input))?, None)?;
//! let ready = mux.wait_cycle(ctx.config().acquisition.poll_timeout())?;
//! println!("{} channels ready", ready.len());
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod channel;
pub mod config;
pub mod context;
pub mod control;
pub mod device;
pub mod error;
pub mod interface;
pub mod logging;
pub mod mux;
mod poll;
pub mod registry;
pub mod samples;
pub mod sysfs;
pub mod trigger;

pub use channel::{Channel, SharedChannel};
pub use config::ZioConfig;
pub use context::ZioContext;
pub use control::{AttributeBitmap, ControlRecord, CONTROL_SIZE};
pub use device::{Cset, Device};
pub use error::{Result, ZioError};
pub use interface::{Block, ChannelInterface, Direction, Geometry, InterfaceState, OpenMode, Readiness};
pub use mux::{BlockSource, Multiplexer};
pub use samples::{Payload, Samples};
