use std::path::{Path, PathBuf};

use super::error::CaptureError;

/// Aggregate recording state owned by the orchestrator.
///
/// State transitions:
/// ```text
/// idle → starting → recording → stopping → idle
///           ↓
///          idle (start failed)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Starting,
    Recording { destination: PathBuf },
    Stopping,
}

impl RecordingState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording { .. })
    }

    /// Destination of the active recording, if any.
    pub fn destination(&self) -> Option<&Path> {
        match self {
            Self::Recording { destination } => Some(destination),
            _ => None,
        }
    }
}

/// Lifecycle of a single capture source.
///
/// `Failed` is entered when the provider reports a terminal error. It is
/// treated like `Idle` when the source is started again.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceState {
    #[default]
    Idle,
    Capturing,
    Failed(CaptureError),
}

impl SourceState {
    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Result of an OS permission check for a capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// The user has not been asked yet.
    Undetermined,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}
