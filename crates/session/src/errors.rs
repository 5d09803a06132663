use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Device error: {0}")]
    Device(String),

    #[error("Failed to persist frame: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Camera does not provide control '{0}'")]
    UnknownControl(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Snapshot timed out after {0:?}")]
    SnapshotTimeout(Duration),
}

impl SessionError {
    /// Faults that came from the output side rather than the camera.
    pub fn is_persistence(&self) -> bool {
        matches!(self, SessionError::Persistence(_) | SessionError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        assert_eq!(
            SessionError::Device("VIDIOC_STREAMON failed".into()).to_string(),
            "Device error: VIDIOC_STREAMON failed"
        );
        assert_eq!(
            SessionError::UnknownControl("Focus, Absolute".into()).to_string(),
            "Camera does not provide control 'Focus, Absolute'"
        );
        assert_eq!(
            SessionError::SnapshotTimeout(Duration::from_millis(1500)).to_string(),
            "Snapshot timed out after 1.5s"
        );
    }

    #[test]
    fn test_error_conversion_from_io_error() {
        fn write_file() -> Result<(), io::Error> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        }

        fn persist() -> Result<(), SessionError> {
            write_file()?;
            Ok(())
        }

        let err = persist().unwrap_err();
        assert!(err.is_persistence());
        match err {
            SessionError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("Expected Io variant, got {:?}", other),
        }
        assert!(!SessionError::Device("x".into()).is_persistence());
    }
}
