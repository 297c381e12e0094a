//! Sample payloads read from a channel's data stream.
//!
//! The data stream carries `sample_count` samples of `sample_size` bytes
//! each, in host byte order. Sizes 1, 2, 4 and 8 decode to unsigned
//! integers of that width; any other size falls back to one signed byte
//! per sample, taken from the first byte of its slot.

/// Decoded samples of one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Samples {
    /// 1-byte samples
    U8(Vec<u8>),
    /// 2-byte samples
    U16(Vec<u16>),
    /// 4-byte samples
    U32(Vec<u32>),
    /// 8-byte samples
    U64(Vec<u64>),
    /// Fallback for sample sizes outside {1, 2, 4, 8}
    I8(Vec<i8>),
}

impl Samples {
    /// Decode `bytes` as samples of `sample_size` bytes.
    ///
    /// Trailing bytes that do not fill a whole sample are ignored; callers
    /// size the read from the control record so this does not happen on a
    /// well-formed block.
    pub fn decode(bytes: &[u8], sample_size: u16) -> Self {
        match sample_size {
            1 => Self::U8(bytes.to_vec()),
            2 => Self::U16(
                bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_ne_bytes([c[0], c[1]]))
                    .collect(),
            ),
            4 => Self::U32(
                bytes
                    .chunks_exact(4)
                    .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            8 => Self::U64(
                bytes
                    .chunks_exact(8)
                    .map(|c| u64::from_ne_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect(),
            ),
            0 => Self::I8(Vec::new()),
            n => Self::I8(
                bytes
                    .chunks_exact(usize::from(n))
                    .map(|c| c[0] as i8)
                    .collect(),
            ),
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::U64(v) => v.len(),
            Self::I8(v) => v.len(),
        }
    }

    /// Whether there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Width of one sample in bytes.
    pub fn sample_size(&self) -> usize {
        match self {
            Self::U8(_) | Self::I8(_) => 1,
            Self::U16(_) => 2,
            Self::U32(_) => 4,
            Self::U64(_) => 8,
        }
    }

    /// Samples widened to `i128`, for display and generic processing.
    pub fn to_wide(&self) -> Vec<i128> {
        match self {
            Self::U8(v) => v.iter().map(|&x| x.into()).collect(),
            Self::U16(v) => v.iter().map(|&x| x.into()).collect(),
            Self::U32(v) => v.iter().map(|&x| x.into()).collect(),
            Self::U64(v) => v.iter().map(|&x| x.into()).collect(),
            Self::I8(v) => v.iter().map(|&x| x.into()).collect(),
        }
    }
}

/// Result of a data read: decoded samples or the raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Samples decoded according to the block geometry
    Samples(Samples),
    /// Bytes exactly as read from the data stream
    Raw(Vec<u8>),
}

impl Payload {
    /// Decoded samples, if this payload was decoded.
    pub fn samples(&self) -> Option<&Samples> {
        match self {
            Self::Samples(s) => Some(s),
            Self::Raw(_) => None,
        }
    }

    /// Raw bytes, if this payload was not decoded.
    pub fn raw(&self) -> Option<&[u8]> {
        match self {
            Self::Raw(b) => Some(b),
            Self::Samples(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_u16() {
        let bytes: Vec<u8> = [1u16, 2, 0xffff]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        assert_eq!(Samples::decode(&bytes, 2), Samples::U16(vec![1, 2, 0xffff]));
    }

    #[test]
    fn test_decode_u64() {
        let bytes = u64::MAX.to_ne_bytes();
        let samples = Samples::decode(&bytes, 8);
        assert_eq!(samples, Samples::U64(vec![u64::MAX]));
        assert_eq!(samples.sample_size(), 8);
    }

    #[test]
    fn test_odd_size_falls_back_to_one_signed_byte_per_sample() {
        let bytes = [0x7f, 0, 0, 0x80, 0, 0, 0xff, 0, 0, 0x01, 0, 0];
        let samples = Samples::decode(&bytes, 3);
        assert_eq!(samples.len(), 4);
        assert_eq!(samples, Samples::I8(vec![127, -128, -1, 1]));
        assert_eq!(samples.to_wide(), vec![127, -128, -1, 1]);
    }

    #[test]
    fn test_empty() {
        assert!(Samples::decode(&[], 4).is_empty());
        assert!(Samples::decode(&[], 0).is_empty());
    }

    #[test]
    fn test_payload_accessors() {
        let raw = Payload::Raw(vec![1, 2]);
        assert_eq!(raw.raw(), Some(&[1u8, 2][..]));
        assert!(raw.samples().is_none());
    }
}
