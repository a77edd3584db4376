//! Error taxonomy for capture operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error type for capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The configured device path is missing, not a character device, or
    /// could not be opened for read/write.
    #[error("video device {} unavailable: {reason}", path.display())]
    DeviceUnavailable {
        /// Path that failed to open.
        path: PathBuf,
        /// Human-readable open failure.
        reason: String,
    },

    /// The device is missing a required capability bit.
    #[error("device {} is not usable for capture: {missing}", path.display())]
    UnsupportedDevice {
        /// Path of the rejected device.
        path: PathBuf,
        /// Which capability was absent.
        missing: String,
    },

    /// A kernel call failed for a reason other than interruption.
    #[error("{op} failed: {source}")]
    Ioctl {
        /// Name of the failing operation.
        op: &'static str,
        /// Underlying kernel error.
        #[source]
        source: io::Error,
    },

    /// Requesting or memory-mapping the buffer ring failed.
    #[error("buffer ring allocation failed: {source}")]
    BufferAllocation {
        /// Underlying kernel error.
        #[source]
        source: io::Error,
    },

    /// Engine misuse: missing dependencies or an operation issued in the
    /// wrong lifecycle state.
    #[error("capture engine misuse: {0}")]
    Initialization(String),
}

impl CaptureError {
    /// Shorthand for an [`CaptureError::Initialization`] error.
    pub fn initialization<S: Into<String>>(msg: S) -> Self {
        Self::Initialization(msg.into())
    }
}

/// Result type for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;
