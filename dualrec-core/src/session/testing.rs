//! Mock providers, encoders and delegates shared by the session tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioLevels, AudioSource, SourceKind};
use crate::models::config::EncoderSettings;
use crate::models::error::CaptureError;
use crate::models::state::{PermissionStatus, RecordingState};
use crate::processing::format::{AudioBlock, InputBlock};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_provider::{BlockCallback, CaptureProvider, ErrorCallback};
use crate::traits::encoder::{AudioEncoder, EncoderFactory};

type Callbacks = Arc<Mutex<Option<(BlockCallback, ErrorCallback)>>>;

/// Drives a [`MockProvider`] from the test thread.
#[derive(Clone, Default)]
pub struct MockHandle {
    callbacks: Callbacks,
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    pub selected_device: Arc<Mutex<Option<String>>>,
}

impl MockHandle {
    /// Deliver a block as the provider's capture thread would.
    pub fn emit(&self, block: &InputBlock<'_>) {
        let on_block = self.callbacks.lock().as_ref().map(|(on_block, _)| Arc::clone(on_block));
        if let Some(on_block) = on_block {
            on_block(block);
        }
    }

    /// Deliver `frames` frames of interleaved 48 kHz stereo at `value`.
    pub fn emit_constant(&self, value: f32, frames: usize) {
        let samples = vec![value; frames * 2];
        self.emit(&InputBlock::interleaved_f32(&samples, 48_000.0, 2));
    }

    /// Report a terminal device error.
    pub fn fail(&self, error: CaptureError) {
        let on_error = self.callbacks.lock().as_ref().map(|(_, on_error)| Arc::clone(on_error));
        if let Some(on_error) = on_error {
            on_error(error);
        }
    }

    pub fn is_started(&self) -> bool {
        self.callbacks.lock().is_some()
    }
}

pub struct MockProvider {
    pub kind: SourceKind,
    pub available: bool,
    pub permission: PermissionStatus,
    pub permission_after_request: PermissionStatus,
    pub start_error: Option<CaptureError>,
    pub handle: MockHandle,
}

impl MockProvider {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            available: true,
            permission: PermissionStatus::Granted,
            permission_after_request: PermissionStatus::Granted,
            start_error: None,
            handle: MockHandle::default(),
        }
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

impl CaptureProvider for MockProvider {
    fn is_available(&self) -> bool {
        self.available
    }

    fn permission_status(&self) -> PermissionStatus {
        self.permission
    }

    fn request_permission(&self) -> PermissionStatus {
        self.permission_after_request
    }

    fn select_device(&mut self, device_id: Option<&str>) -> Result<(), CaptureError> {
        match device_id {
            Some("missing") => Err(CaptureError::DeviceUnavailable("missing".into())),
            id => {
                *self.handle.selected_device.lock() = id.map(str::to_string);
                Ok(())
            }
        }
    }

    fn available_devices(&self) -> Result<Vec<AudioSource>, CaptureError> {
        Ok(vec![
            self.device_info(),
            AudioSource {
                id: "usb-mic".into(),
                name: "USB Microphone".into(),
                kind: self.kind,
                is_default: false,
                transport_type: None,
            },
        ])
    }

    fn start(&mut self, on_block: BlockCallback, on_error: ErrorCallback) -> Result<(), CaptureError> {
        self.handle.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.start_error.clone() {
            return Err(error);
        }
        *self.handle.callbacks.lock() = Some((on_block, on_error));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.handle.stops.fetch_add(1, Ordering::SeqCst);
        *self.handle.callbacks.lock() = None;
        Ok(())
    }

    fn device_info(&self) -> AudioSource {
        AudioSource {
            id: format!("mock-{:?}", self.kind).to_lowercase(),
            name: format!("Mock {}", self.kind),
            kind: self.kind,
            is_default: true,
            transport_type: None,
        }
    }
}

/// Encoder factory that keeps every written block in memory.
///
/// The output file holds raw interleaved f32 so it can be renamed and hashed.
#[derive(Default)]
pub struct MemoryEncoderFactory {
    pub blocks: Arc<Mutex<Vec<AudioBlock>>>,
    pub opened: Arc<Mutex<Vec<PathBuf>>>,
    pub fail_open: bool,
    pub fail_writes: bool,
}

impl MemoryEncoderFactory {
    pub fn written_frames(&self) -> usize {
        self.blocks.lock().iter().map(AudioBlock::frames).sum()
    }

    pub fn samples(&self, channel: usize) -> Vec<f32> {
        self.blocks
            .lock()
            .iter()
            .flat_map(|b| b.channel(channel).to_vec())
            .collect()
    }
}

impl EncoderFactory for MemoryEncoderFactory {
    fn open(&self, path: &Path, _settings: &EncoderSettings) -> Result<Box<dyn AudioEncoder>, CaptureError> {
        if self.fail_open {
            return Err(CaptureError::EncoderOpenFailed("mock open failure".into()));
        }
        fs::write(path, b"").map_err(|e| CaptureError::EncoderOpenFailed(e.to_string()))?;
        self.opened.lock().push(path.to_path_buf());
        Ok(Box::new(MemoryEncoder {
            path: path.to_path_buf(),
            blocks: Arc::clone(&self.blocks),
            fail_writes: self.fail_writes,
        }))
    }
}

struct MemoryEncoder {
    path: PathBuf,
    blocks: Arc<Mutex<Vec<AudioBlock>>>,
    fail_writes: bool,
}

impl AudioEncoder for MemoryEncoder {
    fn write(&mut self, block: &AudioBlock) -> Result<(), CaptureError> {
        if self.fail_writes {
            return Err(CaptureError::EncoderWriteFailed("mock write failure".into()));
        }
        self.blocks.lock().push(block.clone());
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), CaptureError> {
        let bytes: Vec<u8> = self
            .blocks
            .lock()
            .iter()
            .flat_map(|b| bytemuck::cast_slice::<f32, u8>(&b.interleaved()).to_vec())
            .collect();
        fs::write(&self.path, bytes).map_err(|e| CaptureError::EncoderWriteFailed(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DelegateEvent {
    State(RecordingState),
    Started(PathBuf),
    Stopped(Option<PathBuf>),
    Error(CaptureError),
}

/// Records every delegate callback except level updates, which are counted.
#[derive(Default)]
pub struct RecordingDelegate {
    pub events: Mutex<Vec<DelegateEvent>>,
    pub last_levels: Mutex<Option<AudioLevels>>,
    pub level_updates: AtomicUsize,
}

impl RecordingDelegate {
    pub fn errors(&self) -> Vec<CaptureError> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                DelegateEvent::Error(error) => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn states(&self) -> Vec<RecordingState> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                DelegateEvent::State(state) => Some(state.clone()),
                _ => None,
            })
            .collect()
    }
}

impl CaptureDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: &RecordingState) {
        self.events.lock().push(DelegateEvent::State(state.clone()));
    }

    fn on_recording_started(&self, path: &Path) {
        self.events.lock().push(DelegateEvent::Started(path.to_path_buf()));
    }

    fn on_recording_stopped(&self, path: Option<&Path>) {
        self.events.lock().push(DelegateEvent::Stopped(path.map(Path::to_path_buf)));
    }

    fn on_levels_updated(&self, levels: &AudioLevels) {
        *self.last_levels.lock() = Some(*levels);
        self.level_updates.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, error: &CaptureError) {
        self.events.lock().push(DelegateEvent::Error(error.clone()));
    }
}
