//! Capture error taxonomy
//!
//! Every failure the pipeline can surface maps to exactly one [`ErrorKind`] and
//! one user-facing message. Underlying causes are kept for logging only.

use thiserror::Error;

/// Discriminant of a [`CaptureError`], cheap to store in UI state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DeviceUnavailable,
    PermissionDenied,
    DeviceBusy,
    NotStreaming,
    UnreadableFile,
    RecognitionFailed,
}

impl ErrorKind {
    /// Message shown inline in the capture modal
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::DeviceUnavailable => "No camera was found on this device.",
            ErrorKind::PermissionDenied => {
                "Camera access was denied. Allow it in your system settings, then try again."
            }
            ErrorKind::DeviceBusy => {
                "The camera is being used by another application. Close it and try again."
            }
            ErrorKind::NotStreaming => {
                "The camera is not ready yet. Wait for the preview to start."
            }
            ErrorKind::UnreadableFile => "The selected file could not be read as an image.",
            ErrorKind::RecognitionFailed => "Text recognition failed. Please try again.",
        }
    }

    /// Whether repeating the same action can succeed without user intervention
    /// outside the app
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::PermissionDenied)
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera device unavailable: {detail}")]
    DeviceUnavailable { detail: String },
    #[error("camera permission denied: {detail}")]
    PermissionDenied { detail: String },
    #[error("camera device busy: {detail}")]
    DeviceBusy { detail: String },
    #[error("camera is not streaming")]
    NotStreaming,
    #[error("unreadable image file")]
    UnreadableFile(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("recognition failed: {0}")]
    RecognitionFailed(String),
}

pub type Result<T, E = CaptureError> = std::result::Result<T, E>;

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::DeviceUnavailable { .. } => ErrorKind::DeviceUnavailable,
            CaptureError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            CaptureError::DeviceBusy { .. } => ErrorKind::DeviceBusy,
            CaptureError::NotStreaming => ErrorKind::NotStreaming,
            CaptureError::UnreadableFile(_) => ErrorKind::UnreadableFile,
            CaptureError::RecognitionFailed(_) => ErrorKind::RecognitionFailed,
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }

    pub fn unreadable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        CaptureError::UnreadableFile(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_kind_has_distinct_message() {
        let kinds = [
            ErrorKind::DeviceUnavailable,
            ErrorKind::PermissionDenied,
            ErrorKind::DeviceBusy,
            ErrorKind::NotStreaming,
            ErrorKind::UnreadableFile,
            ErrorKind::RecognitionFailed,
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a.user_message(), b.user_message());
            }
        }
    }

    #[test]
    fn test_only_permission_denied_is_not_retryable() {
        assert!(!ErrorKind::PermissionDenied.is_retryable());
        assert!(ErrorKind::DeviceBusy.is_retryable());
        assert!(ErrorKind::DeviceUnavailable.is_retryable());
        assert!(ErrorKind::RecognitionFailed.is_retryable());
    }

    #[test]
    fn test_user_message_hides_underlying_detail() {
        let err = CaptureError::DeviceBusy {
            detail: "/dev/video0: EBUSY".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::DeviceBusy);
        assert!(!err.user_message().contains("EBUSY"));
        assert!(err.to_string().contains("EBUSY"));
    }
}
