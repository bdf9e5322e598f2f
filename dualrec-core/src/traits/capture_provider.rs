use std::sync::Arc;

use crate::models::audio_models::AudioSource;
use crate::models::error::CaptureError;
use crate::models::state::PermissionStatus;
use crate::processing::format::InputBlock;

/// Callback invoked for every block a provider captures.
///
/// Runs on the provider's capture thread. Blocks are in the provider's native
/// format; normalization happens downstream.
pub type BlockCallback = Arc<dyn Fn(&InputBlock<'_>) + Send + Sync + 'static>;

/// Callback invoked once when a provider hits a terminal error and stops.
pub type ErrorCallback = Arc<dyn Fn(CaptureError) + Send + Sync + 'static>;

/// Interface for platform-specific audio capture sources.
///
/// Implemented by:
/// - `WasapiMicCapture` (Windows)
/// - `WasapiLoopbackCapture` (Windows)
pub trait CaptureProvider: Send + Sync {
    /// Whether this capture source can currently be opened.
    fn is_available(&self) -> bool;

    /// Current OS permission for this source, without prompting.
    fn permission_status(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    /// Ask the OS for permission. May block until the user answers.
    fn request_permission(&self) -> PermissionStatus {
        self.permission_status()
    }

    /// Choose the device to capture from; `None` selects the system default.
    fn select_device(&mut self, device_id: Option<&str>) -> Result<(), CaptureError> {
        match device_id {
            None => Ok(()),
            Some(id) => Err(CaptureError::DeviceUnavailable(format!(
                "{} does not support device selection ({})",
                self.device_info().name,
                id
            ))),
        }
    }

    /// Devices this provider can capture from.
    fn available_devices(&self) -> Result<Vec<AudioSource>, CaptureError> {
        Ok(vec![self.device_info()])
    }

    /// Start capturing audio, delivering blocks via `on_block`.
    ///
    /// The callbacks fire on a dedicated audio thread. After a terminal error
    /// the provider calls `on_error` once and stops delivering blocks.
    fn start(&mut self, on_block: BlockCallback, on_error: ErrorCallback) -> Result<(), CaptureError>;

    /// Stop capturing and release resources. Safe to call when not started.
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Information about the audio device backing this provider.
    fn device_info(&self) -> AudioSource;
}
