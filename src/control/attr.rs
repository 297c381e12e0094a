//! Attribute bitmaps carried inside a control record.
//!
//! A control record carries two of these: one for the channel (device-side
//! attributes such as gain or resolution) and one for the trigger
//! (re-enable, pre-samples, post-samples, ...). Each value slot is only
//! meaningful when the matching mask bit is set.

use std::fmt;

/// Number of standard attribute slots.
pub const STANDARD_SLOTS: usize = 16;

/// Number of extended attribute slots.
pub const EXTENDED_SLOTS: usize = 32;

/// Standard channel attribute indices, as exported in sysfs.
pub mod channel {
    /// `gain_factor`
    pub const GAIN: usize = 0;
    /// `offset`
    pub const OFFSET: usize = 1;
    /// `resolution-bits`
    pub const NBITS: usize = 2;
    /// `max-sample-rate`
    pub const MAX_SAMPLE_RATE: usize = 3;
    /// `vref-src`
    pub const VREF_SRC: usize = 4;

    /// Sysfs names of the standard channel attributes, by index.
    pub const NAMES: [&str; 5] = [
        "gain_factor",
        "offset",
        "resolution-bits",
        "max-sample-rate",
        "vref-src",
    ];
}

/// Standard trigger attribute indices, as exported in sysfs.
pub mod trigger {
    /// `re-enable`
    pub const RE_ENABLE: usize = 0;
    /// `pre-samples`
    pub const PRE_SAMPLES: usize = 1;
    /// `post-samples`
    pub const POST_SAMPLES: usize = 2;

    /// Sysfs names of the standard trigger attributes, by index.
    pub const NAMES: [&str; 3] = ["re-enable", "pre-samples", "post-samples"];
}

/// Standard and extended attribute values with their validity masks.
///
/// Equality compares masks and the full value arrays, including slots whose
/// mask bit is clear: it mirrors the wire format, not semantic equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeBitmap {
    /// Bit *i* set means `standard_values[i]` is valid
    pub standard_mask: u16,
    /// Bit *i* set means `extended_values[i]` is valid
    pub extended_mask: u32,
    /// Standard attribute values
    pub standard_values: [u32; STANDARD_SLOTS],
    /// Extended attribute values
    pub extended_values: [u32; EXTENDED_SLOTS],
}

impl AttributeBitmap {
    /// Standard attribute `index`, if its mask bit is set.
    pub fn standard(&self, index: usize) -> Option<u32> {
        (index < STANDARD_SLOTS && self.standard_mask & (1 << index) != 0)
            .then(|| self.standard_values[index])
    }

    /// Extended attribute `index`, if its mask bit is set.
    pub fn extended(&self, index: usize) -> Option<u32> {
        (index < EXTENDED_SLOTS && self.extended_mask & (1 << index) != 0)
            .then(|| self.extended_values[index])
    }

    /// Store a standard attribute and mark it valid. Out-of-range indices are ignored.
    pub fn set_standard(&mut self, index: usize, value: u32) {
        if index < STANDARD_SLOTS {
            self.standard_values[index] = value;
            self.standard_mask |= 1 << index;
        }
    }

    /// Store an extended attribute and mark it valid. Out-of-range indices are ignored.
    pub fn set_extended(&mut self, index: usize, value: u32) {
        if index < EXTENDED_SLOTS {
            self.extended_values[index] = value;
            self.extended_mask |= 1 << index;
        }
    }

    /// Mark a standard attribute invalid. The stored value is left untouched.
    pub fn clear_standard(&mut self, index: usize) {
        if index < STANDARD_SLOTS {
            self.standard_mask &= !(1 << index);
        }
    }

    /// Mark an extended attribute invalid. The stored value is left untouched.
    pub fn clear_extended(&mut self, index: usize) {
        if index < EXTENDED_SLOTS {
            self.extended_mask &= !(1 << index);
        }
    }

    /// Valid standard attributes as `(index, value)` pairs.
    pub fn iter_standard(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        (0..STANDARD_SLOTS).filter_map(move |i| self.standard(i).map(|v| (i, v)))
    }

    /// Valid extended attributes as `(index, value)` pairs.
    pub fn iter_extended(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        (0..EXTENDED_SLOTS).filter_map(move |i| self.extended(i).map(|v| (i, v)))
    }
}

impl fmt::Display for AttributeBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ctrl: standard mask {:#x}", self.standard_mask)?;
        for (i, v) in self.iter_standard() {
            writeln!(f, "Ctrl: std attr {i} \t{v:#x} \t{v}")?;
        }
        writeln!(f, "Ctrl: extended mask {:#x}", self.extended_mask)?;
        for (i, v) in self.iter_extended() {
            writeln!(f, "Ctrl: ext attr {i} \t{v:#x} \t{v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_slot_is_hidden() {
        let mut attrs = AttributeBitmap::default();
        attrs.standard_values[3] = 42;
        assert_eq!(attrs.standard(3), None);

        attrs.set_standard(3, 7);
        assert_eq!(attrs.standard(3), Some(7));
        assert_eq!(attrs.standard_mask, 0b1000);

        attrs.clear_standard(3);
        assert_eq!(attrs.standard(3), None);
        // value survives, only the mask changes
        assert_eq!(attrs.standard_values[3], 7);
    }

    #[test]
    fn test_out_of_range_index() {
        let mut attrs = AttributeBitmap::default();
        attrs.set_standard(STANDARD_SLOTS, 1);
        attrs.set_extended(EXTENDED_SLOTS, 1);
        assert_eq!(attrs, AttributeBitmap::default());
        assert_eq!(attrs.standard(99), None);
        assert_eq!(attrs.extended(99), None);
    }

    #[test]
    fn test_extended_high_bit() {
        let mut attrs = AttributeBitmap::default();
        attrs.set_extended(31, 0xdead_beef);
        assert_eq!(attrs.extended_mask, 0x8000_0000);
        assert_eq!(attrs.extended(31), Some(0xdead_beef));
        assert_eq!(attrs.iter_extended().collect::<Vec<_>>(), vec![(31, 0xdead_beef)]);
    }

    #[test]
    fn test_equality_is_verbatim() {
        let a = AttributeBitmap::default();
        let mut b = AttributeBitmap::default();
        b.standard_values[5] = 1;
        // mask is clear for slot 5, but the wire image differs
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_only_lists_valid_slots() {
        let mut attrs = AttributeBitmap::default();
        attrs.standard_values[0] = 999;
        attrs.set_standard(trigger::POST_SAMPLES, 16);
        let text = attrs.to_string();
        assert!(text.contains("std attr 2"));
        assert!(!text.contains("999"));
    }
}
