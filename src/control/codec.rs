//! Binary layout of the control record.
//!
//! The record is packed (no padding beyond the explicit filler bytes) and
//! every multi-byte integer is in host byte order, as written by the kernel.

use tracing::warn;

use super::attr::{AttributeBitmap, EXTENDED_SLOTS, STANDARD_SLOTS};
use super::fields::{Address, Timestamp, Tlv, NAME_LEN};
use super::{ControlRecord, SUPPORTED_MAJOR_VERSION};
use crate::error::{Result, ZioError};

/// Versions, alarms, sequence number, nsamples, ssize, nbits.
const HEADER_SIZE: usize = 4 + 4 + 4 + 2 + 2;
/// Family, host type, filler, host id, device id, cset, chan, device name.
const ADDRESS_SIZE: usize = 1 + 1 + 1 + 8 + 4 + 2 + 2 + NAME_LEN;
const TIMESTAMP_SIZE: usize = 3 * 8;
/// Memory offset, reserved, flags.
const MISC_SIZE: usize = 3 * 4;
/// Standard mask, filler, extended mask, value arrays.
const ATTR_SIZE: usize = 2 + 2 + 4 + 4 * STANDARD_SLOTS + 4 * EXTENDED_SLOTS;
const TLV_SIZE: usize = 2 + 2 + 4 * 8;

/// Exact size in bytes of an encoded control record.
pub const CONTROL_SIZE: usize = HEADER_SIZE
    + ADDRESS_SIZE
    + TIMESTAMP_SIZE
    + MISC_SIZE
    + NAME_LEN
    + 2 * ATTR_SIZE
    + TLV_SIZE;

const ADDRESS_OFFSET: usize = HEADER_SIZE;
const TIMESTAMP_OFFSET: usize = ADDRESS_OFFSET + ADDRESS_SIZE;
const TRIGGER_NAME_OFFSET: usize = TIMESTAMP_OFFSET + TIMESTAMP_SIZE + MISC_SIZE;
const CHANNEL_ATTR_OFFSET: usize = TRIGGER_NAME_OFFSET + NAME_LEN;
const TRIGGER_ATTR_OFFSET: usize = CHANNEL_ATTR_OFFSET + ATTR_SIZE;
const TLV_OFFSET: usize = TRIGGER_ATTR_OFFSET + ATTR_SIZE;

const _: () = assert!(CONTROL_SIZE == 531, "control record layout drifted");
const _: () = assert!(TLV_OFFSET + TLV_SIZE == CONTROL_SIZE);
const _: () = assert!(
    ADDRESS_OFFSET == 16
        && TIMESTAMP_OFFSET == 47
        && TRIGGER_NAME_OFFSET == 83
        && CHANNEL_ATTR_OFFSET == 95
        && TRIGGER_ATTR_OFFSET == 295
);

struct Writer {
    buf: [u8; CONTROL_SIZE],
    pos: usize,
}

impl Writer {
    fn new() -> Self {
        Self {
            buf: [0; CONTROL_SIZE],
            pos: 0,
        }
    }

    fn bytes(&mut self, data: &[u8]) {
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
    }

    fn u8(&mut self, v: u8) {
        self.bytes(&[v]);
    }

    fn u16(&mut self, v: u16) {
        self.bytes(&v.to_ne_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_ne_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.bytes(&v.to_ne_bytes());
    }

    fn attributes(&mut self, attrs: &AttributeBitmap) {
        self.u16(attrs.standard_mask);
        self.u16(0); // filler
        self.u32(attrs.extended_mask);
        for v in attrs.standard_values {
            self.u32(v);
        }
        for v in attrs.extended_values {
            self.u32(v);
        }
    }

    fn finish(self) -> [u8; CONTROL_SIZE] {
        debug_assert_eq!(self.pos, CONTROL_SIZE);
        self.buf
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_ne_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_ne_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_ne_bytes(self.take())
    }

    fn name(&mut self) -> String {
        let raw = self.take::<NAME_LEN>();
        let end = raw.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        // same substitution as `fit_name`, so decode then encode is byte-stable
        raw[..end]
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { '?' })
            .collect()
    }

    fn attributes(&mut self) -> AttributeBitmap {
        let standard_mask = self.u16();
        self.u16(); // filler
        let extended_mask = self.u32();
        let mut standard_values = [0u32; STANDARD_SLOTS];
        for v in standard_values.iter_mut() {
            *v = self.u32();
        }
        let mut extended_values = [0u32; EXTENDED_SLOTS];
        for v in extended_values.iter_mut() {
            *v = self.u32();
        }
        AttributeBitmap {
            standard_mask,
            extended_mask,
            standard_values,
            extended_values,
        }
    }
}

/// Reject names that would need sanitising to fit their slot.
pub(super) fn check_names(record: &ControlRecord) -> Result<()> {
    for (field, value) in [
        ("device name", &record.address.device_name),
        ("trigger name", &record.trigger_name),
    ] {
        if !value.is_ascii() || value.len() > NAME_LEN || value.contains('\0') {
            return Err(ZioError::MalformedName {
                field,
                value: value.to_string(),
                max: NAME_LEN,
            });
        }
    }
    Ok(())
}

/// Fit a name into its fixed slot: non-ASCII becomes `?`, then truncate.
fn fit_name(value: &str) -> [u8; NAME_LEN] {
    let mut out = [0u8; NAME_LEN];
    let sanitized = value
        .chars()
        .map(|c| if c.is_ascii() && c != '\0' { c as u8 } else { b'?' })
        .take(NAME_LEN);
    for (slot, b) in out.iter_mut().zip(sanitized) {
        *slot = b;
    }
    out
}

pub(super) fn encode(record: &ControlRecord) -> [u8; CONTROL_SIZE] {
    let mut w = Writer::new();
    w.u8(record.major_version);
    w.u8(record.minor_version);
    w.u8(record.alarms_framework);
    w.u8(record.alarms_device);
    w.u32(record.sequence_number);
    w.u32(record.sample_count);
    w.u16(record.sample_size);
    w.u16(record.bit_width);

    let addr = &record.address;
    w.u8(addr.family);
    w.u8(addr.host_type);
    w.u8(0); // filler
    w.bytes(&addr.host_id);
    w.u32(addr.device_id);
    w.u16(addr.channel_set_index);
    w.u16(addr.channel_index);
    w.bytes(&fit_name(&addr.device_name));

    w.u64(record.timestamp.seconds);
    w.u64(record.timestamp.ticks);
    w.u64(record.timestamp.bins);

    w.u32(record.memory_offset);
    w.u32(record.reserved);
    w.u32(record.flags);
    w.bytes(&fit_name(&record.trigger_name));

    w.attributes(&record.channel_attributes);
    w.attributes(&record.trigger_attributes);

    w.u16(record.tlv.kind);
    w.u16(record.tlv.len);
    for v in record.tlv.values {
        w.u32(v);
    }

    w.finish()
}

pub(super) fn decode(bytes: &[u8]) -> Result<ControlRecord> {
    if bytes.len() != CONTROL_SIZE {
        return Err(ZioError::MalformedRecord {
            expected: CONTROL_SIZE,
            actual: bytes.len(),
        });
    }

    let mut r = Reader { buf: bytes, pos: 0 };
    let major_version = r.u8();
    let minor_version = r.u8();
    let alarms_framework = r.u8();
    let alarms_device = r.u8();
    let sequence_number = r.u32();
    let sample_count = r.u32();
    let sample_size = r.u16();
    let bit_width = r.u16();

    let family = r.u8();
    let host_type = r.u8();
    r.u8(); // filler
    let host_id = r.take::<8>();
    let address = Address {
        family,
        host_type,
        host_id,
        device_id: r.u32(),
        channel_set_index: r.u16(),
        channel_index: r.u16(),
        device_name: r.name(),
    };

    let timestamp = Timestamp {
        seconds: r.u64(),
        ticks: r.u64(),
        bins: r.u64(),
    };

    let memory_offset = r.u32();
    let reserved = r.u32();
    let flags = r.u32();
    let trigger_name = r.name();

    let channel_attributes = r.attributes();
    let trigger_attributes = r.attributes();

    let kind = r.u16();
    let len = r.u16();
    let mut values = [0u32; 8];
    for v in values.iter_mut() {
        *v = r.u32();
    }
    debug_assert_eq!(r.pos, CONTROL_SIZE);

    if major_version != SUPPORTED_MAJOR_VERSION {
        warn!(
            found = major_version,
            supported = SUPPORTED_MAJOR_VERSION,
            "Control record major version mismatch"
        );
    }

    Ok(ControlRecord {
        major_version,
        minor_version,
        alarms_framework,
        alarms_device,
        sequence_number,
        sample_count,
        sample_size,
        bit_width,
        address,
        timestamp,
        memory_offset,
        reserved,
        flags,
        trigger_name,
        channel_attributes,
        trigger_attributes,
        tlv: Tlv { kind, len, values },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_offsets() {
        assert_eq!(ADDRESS_OFFSET, 16);
        assert_eq!(TIMESTAMP_OFFSET, 47);
        assert_eq!(TRIGGER_NAME_OFFSET, 83);
        assert_eq!(CHANNEL_ATTR_OFFSET, 95);
        assert_eq!(TRIGGER_ATTR_OFFSET, 295);
        assert_eq!(TLV_OFFSET, 495);
    }

    #[test]
    fn test_lenient_name_is_sanitized() {
        assert_eq!(&fit_name("zzero-really-long"), b"zzero-really");
        assert_eq!(&fit_name("adc\u{e9}")[..5], b"adc?\0");
    }

    #[test]
    fn test_lenient_name_replaces_nul() {
        let ctrl = ControlRecord {
            trigger_name: "ab\0cd".into(),
            ..Default::default()
        };
        let decoded = decode(&encode(&ctrl)).unwrap();
        assert_eq!(decoded.trigger_name, "ab?cd");
    }

    #[test]
    fn test_high_bytes_in_names_are_stable() {
        let mut wire = encode(&ControlRecord::default());
        wire[TRIGGER_NAME_OFFSET..TRIGGER_NAME_OFFSET + 4].copy_from_slice(&[b't', 0x80, 0xff, b'x']);
        let decoded = decode(&wire).unwrap();
        assert_eq!(decoded.trigger_name, "t??x");
        let again = encode(&decoded);
        assert_eq!(decode(&again).unwrap(), decoded);
        assert_eq!(&again[TRIGGER_NAME_OFFSET..TRIGGER_NAME_OFFSET + 5], b"t??x\0");
    }

    #[test]
    fn test_strict_name_rejected() {
        let mut ctrl = ControlRecord {
            trigger_name: "a-trigger-name".into(),
            ..Default::default()
        };
        let err = check_names(&ctrl).unwrap_err();
        assert!(matches!(err, ZioError::MalformedName { max: 12, .. }));

        ctrl.trigger_name = "caf\u{e9}".into();
        assert!(check_names(&ctrl).is_err());

        ctrl.trigger_name = "timer".into();
        assert!(check_names(&ctrl).is_ok());
    }
}
