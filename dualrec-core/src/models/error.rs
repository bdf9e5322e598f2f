use thiserror::Error;

use super::audio_models::SourceKind;

/// Errors that can occur while capturing, mixing or finalizing a recording.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("{0} permission denied")]
    PermissionDenied(SourceKind),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("unsupported audio format: {0}")]
    FormatUnsupported(String),

    #[error("failed to open encoder: {0}")]
    EncoderOpenFailed(String),

    #[error("encoder write failed: {0}")]
    EncoderWriteFailed(String),

    #[error("failed to move recording into place: {0}")]
    FileRenameFailed(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),
}
