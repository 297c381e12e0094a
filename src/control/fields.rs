//! Fixed-width value types composed into a control record.

use std::fmt;

/// Size of the device-name and trigger-name slots.
pub const NAME_LEN: usize = 12;

/// Where a block comes from: device, channel-set and channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    /// Address family
    pub family: u8,
    /// Host type
    pub host_type: u8,
    /// Host identifier
    pub host_id: [u8; 8],
    /// Device identifier
    pub device_id: u32,
    /// Channel-set index within the device
    pub channel_set_index: u16,
    /// Channel index within the channel-set
    pub channel_index: u16,
    /// Device name, at most [`NAME_LEN`] ASCII bytes
    pub device_name: String,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dev {}-{}, cset {}, chan {}",
            self.device_name, self.device_id, self.channel_set_index, self.channel_index
        )
    }
}

/// Block timestamp in the kernel clock domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    /// Seconds
    pub seconds: u64,
    /// Sub-second ticks
    pub ticks: u64,
    /// Device-specific bins
    pub bins: u64,
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} ({})", self.seconds, self.ticks, self.bins)
    }
}

/// Type-length-value extension area. Opaque to this library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tlv {
    /// Extension type
    pub kind: u16,
    /// Extension length
    pub len: u16,
    /// Raw value slots
    pub values: [u32; 8],
}
