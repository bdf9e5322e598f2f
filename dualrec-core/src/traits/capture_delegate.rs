use std::path::Path;

use crate::models::audio_models::AudioLevels;
use crate::models::error::CaptureError;
use crate::models::state::RecordingState;

/// Event delegate for recording notifications.
///
/// Methods are called from capture, tick or caller threads, never from a UI
/// thread. Implementations should marshal to the UI thread if needed.
pub trait CaptureDelegate: Send + Sync {
    /// Called whenever the aggregate recording state changes.
    fn on_state_changed(&self, _state: &RecordingState) {}

    /// Called once the whole start sequence has succeeded.
    fn on_recording_started(&self, path: &Path);

    /// Called after a stop with the finalized file, or `None` if there is none.
    fn on_recording_stopped(&self, path: Option<&Path>);

    /// Called with a fresh snapshot after every received block and after
    /// every tick that wrote audio, whether or not a level changed.
    fn on_levels_updated(&self, levels: &AudioLevels);

    /// Called for every failure that reaches the caller.
    fn on_error(&self, error: &CaptureError);
}
