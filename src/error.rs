//! Error types for scanr

use thiserror::Error;

/// Result type alias using scanr's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric codes attached to [`Error::BackendInit`].
///
/// The values follow the OpenCL status codes for the same conditions so that
/// diagnostics read the same regardless of which backend produced them.
pub mod codes {
    /// No device matching the selection policy was found
    pub const DEVICE_NOT_FOUND: i32 = -1;
    /// A device was found but could not be opened
    pub const DEVICE_REQUEST_FAILED: i32 = -2;
    /// Kernel source failed to compile
    pub const BUILD_PROGRAM_FAILURE: i32 = -11;
}

/// Errors that can occur while scanning
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration value
    #[error("Invalid configuration '{arg}': {reason}")]
    Configuration {
        /// The offending parameter
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Backend could not be brought up (device selection or kernel compilation)
    #[error("Backend initialization failed: {message} : {code}")]
    BackendInit {
        /// Numeric status code, see [`codes`]
        code: i32,
        /// Diagnostic text reported by the backend
        message: String,
    },

    /// A kernel launch, buffer transfer or completion wait failed
    #[error("Dispatch of '{operation}' failed: {reason}")]
    Dispatch {
        /// The operation being attempted
        operation: &'static str,
        /// Backend diagnostic
        reason: String,
    },

    /// Out of memory
    #[error("Out of memory: failed to allocate {size} bytes")]
    OutOfMemory {
        /// Requested size in bytes
        size: usize,
    },

    /// Malformed sequence input
    #[error("Parse error at {position}: {reason}")]
    Parse {
        /// Zero-based token position (0 is the count)
        position: usize,
        /// What went wrong
        reason: String,
    },

    /// Scan result disagrees with the sequential reference
    #[error("Verification failed at index {index}: expected {expected}, got {got}")]
    Mismatch {
        /// First differing index
        index: usize,
        /// Sequential prefix sum at that index
        expected: f32,
        /// Value produced by the backend
        got: f32,
    },

    /// Scan result has a different length than its input
    #[error("Length mismatch: expected {expected} values, got {got}")]
    LengthMismatch {
        /// Input length
        expected: usize,
        /// Output length
        got: usize,
    },

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            arg,
            reason: reason.into(),
        }
    }

    /// Create a backend initialization error
    pub fn backend_init(code: i32, message: impl Into<String>) -> Self {
        Self::BackendInit {
            code,
            message: message.into(),
        }
    }

    /// Create a dispatch error
    pub fn dispatch(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Dispatch {
            operation,
            reason: reason.into(),
        }
    }

    /// Whether the failure originated in the compute backend
    pub fn is_backend_error(&self) -> bool {
        matches!(
            self,
            Self::BackendInit { .. } | Self::Dispatch { .. } | Self::OutOfMemory { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_init_display_carries_code() {
        let err = Error::backend_init(codes::BUILD_PROGRAM_FAILURE, "unknown identifier");
        assert_eq!(
            err.to_string(),
            "Backend initialization failed: unknown identifier : -11"
        );
        assert!(err.is_backend_error());
    }

    #[test]
    fn test_configuration_is_not_backend_error() {
        let err = Error::configuration("block_size", "must be at least 2");
        assert_eq!(
            err.to_string(),
            "Invalid configuration 'block_size': must be at least 2"
        );
        assert!(!err.is_backend_error());
    }

    #[test]
    fn test_length_mismatch_display() {
        let err = Error::LengthMismatch {
            expected: 3,
            got: 2,
        };
        assert_eq!(err.to_string(), "Length mismatch: expected 3 values, got 2");
        assert!(!err.is_backend_error());
    }
}
