//! Error types for device and buffer operations.
//!
//! Only environment failures surface here: a backend that cannot be
//! brought up or a device buffer that cannot be allocated. API misuse
//! (locking twice, writing an uploaded static buffer) is a programming
//! error and panics instead.

use thiserror::Error;

/// Errors from backend initialization and device buffer management.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Backend initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Buffer creation failed: {0}")]
    BufferCreationFailed(String),

    #[error("Out of device memory")]
    OutOfMemory,

    #[error("Device lost")]
    DeviceLost,
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeviceError::InitializationFailed("no adapter".to_string());
        assert_eq!(err.to_string(), "Backend initialization failed: no adapter");

        let err = DeviceError::BufferCreationFailed("allocation refused".to_string());
        assert_eq!(err.to_string(), "Buffer creation failed: allocation refused");
    }
}
