use thiserror::Error;

/// Errors raised by microphone, speaker and camera collaborators.
///
/// Device failures never tear down the session. The owning pipeline reports
/// the error and stays off until it is enabled again.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// The user or the OS refused access to the device
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// No usable device was found
    #[error("Device unavailable: {0}")]
    Unavailable(String),

    /// The device disappeared while streaming
    #[error("Device disconnected: {0}")]
    Disconnected(String),

    /// The device produced data in a format we cannot handle
    #[error("Unsupported format: {0}")]
    Format(String),

    /// File or stream I/O failure
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => DeviceError::Unavailable(err.to_string()),
            std::io::ErrorKind::PermissionDenied => DeviceError::PermissionDenied(err.to_string()),
            _ => DeviceError::Io(err.to_string()),
        }
    }
}

impl From<hound::Error> for DeviceError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => e.into(),
            other => DeviceError::Format(other.to_string()),
        }
    }
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let err: DeviceError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, DeviceError::Unavailable(_)));

        let err: DeviceError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope").into();
        assert!(matches!(err, DeviceError::PermissionDenied(_)));

        let err: DeviceError = std::io::Error::other("boom").into();
        assert!(matches!(err, DeviceError::Io(_)));
    }

    #[test]
    fn test_error_display() {
        let err = DeviceError::Disconnected("usb mic".to_string());
        assert_eq!(err.to_string(), "Device disconnected: usb mic");
    }
}
