//! Error types for ZIO operations.
//!
//! Every failure mode of the library is a variant of [`ZioError`]. Codec and
//! channel-interface errors are always surfaced to the caller; the only
//! condition absorbed locally is the missing-control fallback in
//! [`ChannelInterface::read_data`](crate::interface::ChannelInterface::read_data),
//! which is reported through a `warn` event instead.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for ZIO operations.
pub type Result<T> = std::result::Result<T, ZioError>;

/// Which of the two per-channel streams an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// The control stream (`<devname>-ctrl`)
    Control,
    /// The data stream (`<devname>-data`)
    Data,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Control => write!(f, "control"),
            Self::Data => write!(f, "data"),
        }
    }
}

/// Errors that can occur when working with ZIO devices.
#[derive(Error, Debug)]
pub enum ZioError {
    /// Control record input is not exactly the wire size
    #[error("Malformed control record: expected {expected} bytes, got {actual}")]
    MalformedRecord {
        /// Wire size of a control record
        expected: usize,
        /// Length actually supplied
        actual: usize,
    },

    /// A name field does not fit its slot (strict encoding only)
    #[error("Malformed control record: {field} '{value}' does not fit in {max} ASCII bytes")]
    MalformedName {
        /// Field name
        field: &'static str,
        /// Offending value
        value: String,
        /// Slot width in bytes
        max: usize,
    },

    /// Resource is not open, or not open for reading
    #[error("{resource} stream is not readable")]
    NotReadable {
        /// Stream that was accessed
        resource: Resource,
    },

    /// Resource is not open, or not open for writing
    #[error("{resource} stream is not writable")]
    NotWritable {
        /// Stream that was accessed
        resource: Resource,
    },

    /// The operation has no protocol definition at this layer
    #[error("Operation not supported: {operation}")]
    Unsupported {
        /// Operation name
        operation: &'static str,
    },

    /// A multiplexer wait was started with nothing to wait on
    #[error("No channels registered for readiness wait")]
    NoChannelsRegistered,

    /// A control record fails the output rule `nsamples == pre + post`
    #[error(
        "Invalid output control: {sample_count} samples but pre-samples {pre_samples} + post-samples {post_samples}"
    )]
    InvalidOutputRecord {
        /// `sample_count` of the rejected record
        sample_count: u32,
        /// Trigger standard attribute 1
        pre_samples: u32,
        /// Trigger standard attribute 2
        post_samples: u32,
    },

    /// The stream ended before the requested number of bytes was read
    #[error("Short read on {resource} stream: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Stream that was read
        resource: Resource,
        /// Requested byte count
        expected: u64,
        /// Bytes actually received
        actual: u64,
    },

    /// A sysfs attribute could not be read or written
    #[error("Attribute '{}': {source}", path.display())]
    Attribute {
        /// Attribute file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A sysfs attribute holds text that does not parse as the expected type
    #[error("Attribute '{}' has unexpected value '{value}'", path.display())]
    AttributeValue {
        /// Attribute file
        path: PathBuf,
        /// Raw text read
        value: String,
    },

    /// A named attribute does not exist on an object
    #[error("Missing attribute '{name}' on {}", object.display())]
    MissingAttribute {
        /// Attribute name
        name: String,
        /// Object directory
        object: PathBuf,
    },

    /// The framework is not loaded (bus directory missing)
    #[error("ZIO is not loaded: {}", path.display())]
    NotLoaded {
        /// Bus path that was checked
        path: PathBuf,
    },

    /// Lookup of a device, channel or file failed
    #[error("Not found: {what}")]
    NotFound {
        /// Description of the missing item
        what: String,
    },

    /// Invalid configuration or parameter
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// I/O error from the operating system
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ZioError {
    /// Check if this is a "not readable" error.
    pub fn is_not_readable(&self) -> bool {
        matches!(self, Self::NotReadable { .. })
    }

    /// Check if this is a "not writable" error.
    pub fn is_not_writable(&self) -> bool {
        matches!(self, Self::NotWritable { .. })
    }

    /// Check if the operation is unsupported at this layer.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Check if this is a codec error.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::MalformedRecord { .. } | Self::MalformedName { .. }
        )
    }
}

impl From<figment::Error> for ZioError {
    fn from(err: figment::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ZioError::MalformedRecord {
            expected: 531,
            actual: 512,
        };
        assert!(err.to_string().contains("531"));
        assert!(err.to_string().contains("512"));
        assert!(err.is_malformed());
    }

    #[test]
    fn test_resource_display() {
        let err = ZioError::NotReadable {
            resource: Resource::Data,
        };
        assert_eq!(err.to_string(), "data stream is not readable");
        assert!(err.is_not_readable());
        assert!(!err.is_not_writable());
    }

    #[test]
    fn test_invalid_output_display() {
        let err = ZioError::InvalidOutputRecord {
            sample_count: 10,
            pre_samples: 3,
            post_samples: 4,
        };
        let text = err.to_string();
        assert!(text.contains("10"));
        assert!(text.contains('3'));
        assert!(text.contains('4'));
    }
}
