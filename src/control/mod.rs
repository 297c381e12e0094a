//! Control records: the fixed binary metadata accompanying every block.
//!
//! A control record tells the reader how to interpret the data that follows
//! it on the data stream: `sample_size` bytes per sample, `sample_count`
//! samples. It also carries the block's origin ([`Address`]), a
//! [`Timestamp`], the channel and trigger attribute snapshots
//! ([`AttributeBitmap`]) and an opaque [`Tlv`] extension.
//!
//! # Example
//!
//! ```
//! use zio::control::{ControlRecord, CONTROL_SIZE};
//!
//! let mut ctrl = ControlRecord::default();
//! ctrl.sample_size = 2;
//! ctrl.sample_count = 4;
//! ctrl.address.device_name = "zzero".into();
//!
//! let wire = ctrl.encode();
//! assert_eq!(wire.len(), CONTROL_SIZE);
//! assert_eq!(ControlRecord::decode(&wire)?, ctrl);
//! # Ok::<(), zio::ZioError>(())
//! ```

pub mod attr;
mod codec;
pub mod fields;

use std::fmt;

pub use attr::AttributeBitmap;
pub use codec::CONTROL_SIZE;
pub use fields::{Address, Timestamp, Tlv, NAME_LEN};

use crate::error::{Result, ZioError};

/// Control-record major version this library understands.
pub const SUPPORTED_MAJOR_VERSION: u8 = 1;

/// Control-record minor version written by [`ControlRecord::default`].
pub const SUPPORTED_MINOR_VERSION: u8 = 0;

/// Typed view of one control record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRecord {
    /// Protocol major version
    pub major_version: u8,
    /// Protocol minor version
    pub minor_version: u8,
    /// Alarms raised by the framework
    pub alarms_framework: u8,
    /// Alarms raised by the device
    pub alarms_device: u8,
    /// Block sequence number
    pub sequence_number: u32,
    /// Number of samples in the block (nsamples)
    pub sample_count: u32,
    /// Bytes per sample (ssize)
    pub sample_size: u16,
    /// Significant bits per sample (nbits)
    pub bit_width: u16,
    /// Block origin
    pub address: Address,
    /// Acquisition time
    pub timestamp: Timestamp,
    /// Offset of the block in device memory
    pub memory_offset: u32,
    /// Reserved word
    pub reserved: u32,
    /// Record flags
    pub flags: u32,
    /// Name of the trigger that produced the block
    pub trigger_name: String,
    /// Channel attribute snapshot
    pub channel_attributes: AttributeBitmap,
    /// Trigger attribute snapshot
    pub trigger_attributes: AttributeBitmap,
    /// Extension area
    pub tlv: Tlv,
}

impl Default for ControlRecord {
    fn default() -> Self {
        Self {
            major_version: SUPPORTED_MAJOR_VERSION,
            minor_version: SUPPORTED_MINOR_VERSION,
            alarms_framework: 0,
            alarms_device: 0,
            sequence_number: 0,
            sample_count: 0,
            sample_size: 0,
            bit_width: 0,
            address: Address::default(),
            timestamp: Timestamp::default(),
            memory_offset: 0,
            reserved: 0,
            flags: 0,
            trigger_name: String::new(),
            channel_attributes: AttributeBitmap::default(),
            trigger_attributes: AttributeBitmap::default(),
            tlv: Tlv::default(),
        }
    }
}

impl ControlRecord {
    /// Decode a record from exactly [`CONTROL_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// [`ZioError::MalformedRecord`] if `bytes` has any other length. No
    /// partially decoded record is ever returned.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        codec::decode(bytes)
    }

    /// Encode the record, sanitising names that do not fit their slots.
    pub fn encode(&self) -> [u8; CONTROL_SIZE] {
        codec::encode(self)
    }

    /// Encode the record, rejecting names that do not fit their slots.
    ///
    /// # Errors
    ///
    /// [`ZioError::MalformedName`] if the device or trigger name is longer
    /// than [`NAME_LEN`] bytes or is not plain ASCII.
    pub fn encode_strict(&self) -> Result<[u8; CONTROL_SIZE]> {
        codec::check_names(self)?;
        Ok(codec::encode(self))
    }

    /// Whether the major version is the one this library understands.
    pub fn is_supported_version(&self) -> bool {
        self.major_version == SUPPORTED_MAJOR_VERSION
    }

    /// Number of data bytes the block carries (`sample_size * sample_count`).
    pub fn data_len(&self) -> u64 {
        u64::from(self.sample_size) * u64::from(self.sample_count)
    }

    /// Pre-samples and post-samples as recorded in the trigger attributes.
    ///
    /// Read verbatim from standard slots 1 and 2, whatever the mask says.
    pub fn pre_post_samples(&self) -> (u32, u32) {
        let values = &self.trigger_attributes.standard_values;
        (
            values[attr::trigger::PRE_SAMPLES],
            values[attr::trigger::POST_SAMPLES],
        )
    }

    /// Output rule: `sample_count` must equal pre-samples plus post-samples.
    ///
    /// Only meaningful for records about to be written to an output
    /// channel. Input records are not held to it.
    pub fn is_output_valid(&self) -> bool {
        let (pre, post) = self.pre_post_samples();
        u64::from(self.sample_count) == u64::from(pre) + u64::from(post)
    }

    /// [`is_output_valid`](Self::is_output_valid) as a typed error.
    pub fn check_output(&self) -> Result<()> {
        if self.is_output_valid() {
            return Ok(());
        }
        let (pre_samples, post_samples) = self.pre_post_samples();
        Err(ZioError::InvalidOutputRecord {
            sample_count: self.sample_count,
            pre_samples,
            post_samples,
        })
    }
}

impl fmt::Display for ControlRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Ctrl: version {}.{}, trigger {}, {}",
            self.major_version, self.minor_version, self.trigger_name, self.address
        )?;
        writeln!(
            f,
            "Ctrl: alarms {:#x} {:#x}",
            self.alarms_framework, self.alarms_device
        )?;
        writeln!(
            f,
            "Ctrl: seq {}, n {}, size {}, bits {}, flags {:#x}",
            self.sequence_number, self.sample_count, self.sample_size, self.bit_width, self.flags
        )?;
        writeln!(f, "Ctrl: stamp {}", self.timestamp)?;
        write!(f, "Ctrl: device attributes\n{}", self.channel_attributes)?;
        write!(f, "Ctrl: trigger attributes\n{}", self.trigger_attributes)
    }
}
