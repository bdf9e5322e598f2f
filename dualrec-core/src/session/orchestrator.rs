use std::path::PathBuf;
use std::sync::Arc;

use crate::models::audio_models::{AudioLevels, AudioSource, SourceKind};
use crate::models::config::{MixerConfiguration, RecordingRequest};
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::RecordingState;
use crate::processing::format::InputBlock;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_provider::{BlockCallback, CaptureProvider, ErrorCallback};

use super::mixer::Mixer;
use super::source_capture::SourceCapture;

/// Top-level recording controller.
///
/// Generic over the microphone and system audio backends. Owns both
/// captures and the [`Mixer`], and keeps the single authoritative
/// [`RecordingState`].
///
/// ```text
/// [Mic Provider]    → SourceCapture ─┐
///                                    ├→ Mixer → <destination>.m4a
/// [System Provider] → SourceCapture ─┘
/// ```
pub struct CaptureOrchestrator<M: CaptureProvider, S: CaptureProvider> {
    mic: SourceCapture<M>,
    system: SourceCapture<S>,
    mixer: Arc<Mixer>,
    state: RecordingState,
    delegate: Option<Arc<dyn CaptureDelegate>>,
}

impl<M: CaptureProvider, S: CaptureProvider> CaptureOrchestrator<M, S> {
    pub fn new(mic: M, system: S, mixer: Mixer) -> Self {
        Self {
            mic: SourceCapture::new(SourceKind::Microphone, mic),
            system: SourceCapture::new(SourceKind::System, system),
            mixer: Arc::new(mixer),
            state: RecordingState::Idle,
            delegate: None,
        }
    }

    /// Orchestrator with the default mixer configuration and the AAC encoder.
    pub fn with_aac_encoder(mic: M, system: S) -> Result<Self, CaptureError> {
        Ok(Self::new(mic, system, Mixer::with_aac_encoder(MixerConfiguration::default())?))
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.mixer.set_delegate(Some(Arc::clone(&delegate)));
        self.delegate = Some(delegate);
    }

    pub fn state(&self) -> RecordingState {
        self.state.clone()
    }

    pub fn current_levels(&self) -> AudioLevels {
        self.mixer.current_levels()
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn system_permission_granted(&mut self) -> bool {
        self.system.refresh_permission().is_granted()
    }

    pub fn microphone_permission_granted(&mut self) -> bool {
        self.mic.refresh_permission().is_granted()
    }

    pub fn available_microphones(&self) -> Result<Vec<AudioSource>, CaptureError> {
        self.mic.available_devices()
    }

    /// Start capturing and mixing into `request.destination`.
    ///
    /// Returns the final path of the recording. A denied system audio
    /// permission fails the start with [`CaptureError::PermissionDenied`]. If
    /// the microphone permission is denied the recording starts with system
    /// audio only and no error is reported.
    pub fn start_recording(&mut self, request: RecordingRequest) -> Result<PathBuf, CaptureError> {
        if !self.state.is_idle() {
            let error = CaptureError::ConfigurationFailed("a recording is already in progress".into());
            self.report_error(&error);
            return Err(error);
        }
        if let Err(reason) = request.validate() {
            let error = CaptureError::ConfigurationFailed(reason);
            self.report_error(&error);
            return Err(error);
        }

        self.set_state(RecordingState::Starting);
        match self.start_pipeline(&request) {
            Ok(destination) => {
                self.set_state(RecordingState::Recording {
                    destination: destination.clone(),
                });
                if let Some(delegate) = &self.delegate {
                    delegate.on_recording_started(&destination);
                }
                Ok(destination)
            }
            Err(error) => {
                log::error!("Failed to start recording: {}", error);
                self.tear_down();
                self.set_state(RecordingState::Idle);
                self.report_error(&error);
                Err(error)
            }
        }
    }

    fn start_pipeline(&mut self, request: &RecordingRequest) -> Result<PathBuf, CaptureError> {
        if request.sources.system
            && !self.system.refresh_permission().is_granted()
            && !self.system.request_permission().is_granted()
        {
            return Err(CaptureError::PermissionDenied(SourceKind::System));
        }
        let mut capture_mic = request.sources.microphone;
        if capture_mic && !self.mic.refresh_permission().is_granted() && !self.mic.request_permission().is_granted() {
            log::warn!("Microphone permission denied, recording without microphone");
            capture_mic = false;
        }
        if capture_mic {
            self.mic.select_device(request.mic_device_id.as_deref())?;
        }

        self.system.set_enabled(request.sources.system);
        self.mic.set_enabled(capture_mic);
        self.mixer.update_enabled_sources(request.sources.system, capture_mic);
        self.mixer.update_volumes(request.volumes.system, request.volumes.microphone)?;

        let destination = self.mixer.start_recording(&request.destination)?;

        if self.system.is_enabled() {
            let mixer = Arc::clone(&self.mixer);
            let on_block: BlockCallback = Arc::new(move |block: &InputBlock<'_>| mixer.receive_system_audio(block));
            let on_error = self.capture_error_callback();
            self.system.start(on_block, on_error)?;
        }
        if self.mic.is_enabled() {
            let mixer = Arc::clone(&self.mixer);
            let on_block: BlockCallback =
                Arc::new(move |block: &InputBlock<'_>| mixer.receive_microphone_audio(block));
            let on_error = self.capture_error_callback();
            self.mic.start(on_block, on_error)?;
        }

        Ok(destination)
    }

    /// Stop both captures and finalize the recording.
    ///
    /// Returns `Ok(None)` when no recording was in progress. The state is
    /// `Idle` afterwards whatever the outcome.
    pub fn stop_recording(&mut self) -> Result<Option<RecordingResult>, CaptureError> {
        if !self.state.is_recording() {
            if let Some(delegate) = &self.delegate {
                delegate.on_recording_stopped(None);
            }
            return Ok(None);
        }

        self.set_state(RecordingState::Stopping);
        self.stop_captures();
        let outcome = self.mixer.stop_recording();
        self.set_state(RecordingState::Idle);

        match outcome {
            Ok(result) => {
                if let Some(delegate) = &self.delegate {
                    delegate.on_recording_stopped(Some(&result.file_path));
                }
                Ok(Some(result))
            }
            Err(error) => {
                log::error!("Failed to finalize recording: {}", error);
                self.report_error(&error);
                if let Some(delegate) = &self.delegate {
                    delegate.on_recording_stopped(None);
                }
                Err(error)
            }
        }
    }

    /// Pass-through to [`Mixer::update_volumes`].
    pub fn update_volumes(&self, system: f32, microphone: f32) -> Result<(), CaptureError> {
        self.mixer.update_volumes(system, microphone)
    }

    /// Pass-through to [`Mixer::update_enabled_sources`].
    pub fn update_enabled_sources(&self, system: bool, microphone: bool) {
        self.mixer.update_enabled_sources(system, microphone);
    }

    fn capture_error_callback(&self) -> ErrorCallback {
        let delegate = self.delegate.clone();
        Arc::new(move |error: CaptureError| {
            if let Some(delegate) = &delegate {
                delegate.on_error(&error);
            }
        })
    }

    fn stop_captures(&mut self) {
        if let Err(e) = self.system.stop() {
            log::warn!("Failed to stop system audio capture: {}", e);
        }
        if let Err(e) = self.mic.stop() {
            log::warn!("Failed to stop microphone capture: {}", e);
        }
    }

    fn tear_down(&mut self) {
        self.stop_captures();
        self.mixer.abort_recording();
    }

    fn set_state(&mut self, state: RecordingState) {
        self.state = state;
        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(&self.state);
        }
    }

    fn report_error(&self, error: &CaptureError) {
        if let Some(delegate) = &self.delegate {
            delegate.on_error(error);
        }
    }
}

impl<M: CaptureProvider, S: CaptureProvider> Drop for CaptureOrchestrator<M, S> {
    fn drop(&mut self) {
        if !self.state.is_idle() {
            log::warn!("Orchestrator dropped while recording, discarding the recording");
            self.tear_down();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use approx::assert_relative_eq;

    use super::*;
    use crate::models::config::EncoderSettings;
    use crate::models::state::PermissionStatus;
    use crate::session::testing::{DelegateEvent, MemoryEncoderFactory, MockHandle, MockProvider, RecordingDelegate};

    struct Harness {
        orchestrator: CaptureOrchestrator<MockProvider, MockProvider>,
        mic: MockHandle,
        system: MockHandle,
        factory: Arc<MemoryEncoderFactory>,
        delegate: Arc<RecordingDelegate>,
        dir: tempfile::TempDir,
    }

    fn harness_with(mic: MockProvider, system: MockProvider, factory: MemoryEncoderFactory) -> Harness {
        let factory = Arc::new(factory);
        let config = MixerConfiguration {
            tick_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let mixer = Mixer::new(config, factory.clone(), EncoderSettings::default()).unwrap();
        let (mic_handle, system_handle) = (mic.handle(), system.handle());
        let mut orchestrator = CaptureOrchestrator::new(mic, system, mixer);
        let delegate = Arc::new(RecordingDelegate::default());
        orchestrator.set_delegate(delegate.clone());
        Harness {
            orchestrator,
            mic: mic_handle,
            system: system_handle,
            factory,
            delegate,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn harness() -> Harness {
        harness_with(
            MockProvider::new(SourceKind::Microphone),
            MockProvider::new(SourceKind::System),
            MemoryEncoderFactory::default(),
        )
    }

    fn request(dir: &tempfile::TempDir, name: &str) -> RecordingRequest {
        RecordingRequest::new(dir.path().join(name))
    }

    #[test]
    fn records_both_sources_end_to_end() {
        let mut h = harness();
        let request = request(&h.dir, "meeting.m4a");

        let dest = h.orchestrator.start_recording(request).unwrap();
        assert!(h.orchestrator.state().is_recording());
        assert!(h.system.is_started() && h.mic.is_started());

        for _ in 0..100 {
            h.system.emit_constant(1.0, 480);
            h.mic.emit_constant(0.0, 480);
        }
        let result = h.orchestrator.stop_recording().unwrap().unwrap();

        assert_eq!(result.file_path, dest);
        assert_eq!(result.frames_written, 48_000);
        assert_relative_eq!(result.duration_secs, 1.0);
        assert_relative_eq!(h.orchestrator.current_levels().mixed, 1.0, epsilon = 1e-4);
        assert!(h.orchestrator.state().is_idle());
        assert!(!h.system.is_started() && !h.mic.is_started());

        let events = h.delegate.events.lock().clone();
        assert!(events.contains(&DelegateEvent::Started(dest.clone())));
        assert_eq!(events.last(), Some(&DelegateEvent::Stopped(Some(dest))));
        assert_eq!(
            h.delegate.states(),
            vec![
                RecordingState::Starting,
                RecordingState::Recording {
                    destination: result.file_path.clone()
                },
                RecordingState::Stopping,
                RecordingState::Idle,
            ]
        );
    }

    #[test]
    fn microphone_disabled_records_scaled_system_only() {
        let mut h = harness();
        let mut request = request(&h.dir, "meeting.m4a");
        request.sources.microphone = false;
        request.volumes.system = 0.5;

        h.orchestrator.start_recording(request).unwrap();
        assert!(!h.mic.is_started());
        h.system.emit_constant(1.0, 4_800);
        h.orchestrator.stop_recording().unwrap();

        assert_eq!(h.factory.written_frames(), 4_800);
        assert!(h.factory.samples(0).iter().all(|s| (s - 0.5).abs() < 1e-6));
        assert_eq!(h.orchestrator.mixer().diagnostics().microphone.frames_buffered, 0);
    }

    #[test]
    fn denied_microphone_permission_records_without_error() {
        let mut mic = MockProvider::new(SourceKind::Microphone);
        mic.permission = PermissionStatus::Undetermined;
        mic.permission_after_request = PermissionStatus::Denied;
        let mut h = harness_with(mic, MockProvider::new(SourceKind::System), MemoryEncoderFactory::default());

        h.orchestrator.start_recording(request(&h.dir, "meeting.m4a")).unwrap();

        assert!(h.orchestrator.state().is_recording());
        assert!(h.system.is_started());
        assert_eq!(h.mic.starts.load(Ordering::SeqCst), 0);
        assert!(!h.orchestrator.mixer().is_source_enabled(SourceKind::Microphone));
        assert!(h.delegate.errors().is_empty());

        h.orchestrator.stop_recording().unwrap();
    }

    #[test]
    fn denied_system_permission_fails_the_start() {
        let mut system = MockProvider::new(SourceKind::System);
        system.permission = PermissionStatus::Denied;
        system.permission_after_request = PermissionStatus::Denied;
        let mut h = harness_with(MockProvider::new(SourceKind::Microphone), system, MemoryEncoderFactory::default());

        let err = h.orchestrator.start_recording(request(&h.dir, "meeting.m4a")).unwrap_err();

        assert_eq!(err, CaptureError::PermissionDenied(SourceKind::System));
        assert!(h.orchestrator.state().is_idle());
        assert!(!h.system.is_started());
        assert!(!h.mic.is_started());
        assert!(h.factory.opened.lock().is_empty());
        assert_eq!(h.delegate.errors(), vec![err]);
    }

    #[test]
    fn system_permission_granted_on_request_records() {
        let mut system = MockProvider::new(SourceKind::System);
        system.permission = PermissionStatus::Undetermined;
        let mut h = harness_with(MockProvider::new(SourceKind::Microphone), system, MemoryEncoderFactory::default());

        h.orchestrator.start_recording(request(&h.dir, "meeting.m4a")).unwrap();
        assert!(h.system.is_started());
        h.orchestrator.stop_recording().unwrap();
    }

    #[test]
    fn source_start_failure_rolls_back() {
        let mut system = MockProvider::new(SourceKind::System);
        system.start_error = Some(CaptureError::DeviceUnavailable("no render endpoint".into()));
        let mut h = harness_with(MockProvider::new(SourceKind::Microphone), system, MemoryEncoderFactory::default());

        let err = h.orchestrator.start_recording(request(&h.dir, "meeting.m4a")).unwrap_err();

        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
        assert!(h.orchestrator.state().is_idle());
        assert!(!h.orchestrator.mixer().is_recording());
        assert!(!h.mic.is_started());
        assert!(!h.dir.path().join("meeting.m4a.recording").exists());
        assert!(!h.dir.path().join("meeting.m4a").exists());
        assert_eq!(h.delegate.errors(), vec![err]);
    }

    #[test]
    fn microphone_start_failure_stops_system_capture() {
        let mut mic = MockProvider::new(SourceKind::Microphone);
        mic.start_error = Some(CaptureError::DeviceUnavailable("mic busy".into()));
        let mut h = harness_with(mic, MockProvider::new(SourceKind::System), MemoryEncoderFactory::default());

        assert!(h.orchestrator.start_recording(request(&h.dir, "meeting.m4a")).is_err());
        assert_eq!(h.system.starts.load(Ordering::SeqCst), 1);
        assert!(!h.system.is_started());
        assert!(h.orchestrator.state().is_idle());
    }

    #[test]
    fn encoder_open_failure_is_reported() {
        let factory = MemoryEncoderFactory {
            fail_open: true,
            ..Default::default()
        };
        let mut h = harness_with(
            MockProvider::new(SourceKind::Microphone),
            MockProvider::new(SourceKind::System),
            factory,
        );

        let err = h.orchestrator.start_recording(request(&h.dir, "meeting.m4a")).unwrap_err();
        assert!(matches!(err, CaptureError::EncoderOpenFailed(_)));
        assert_eq!(h.system.starts.load(Ordering::SeqCst), 0);
        assert!(h.orchestrator.state().is_idle());
        assert!(!h.dir.path().join("meeting.m4a").exists());
    }

    #[test]
    fn can_record_again_after_failure() {
        let mut system = MockProvider::new(SourceKind::System);
        system.start_error = Some(CaptureError::DeviceUnavailable("no render endpoint".into()));
        let mut h = harness_with(MockProvider::new(SourceKind::Microphone), system, MemoryEncoderFactory::default());

        assert!(h.orchestrator.start_recording(request(&h.dir, "a.m4a")).is_err());

        let mut request = request(&h.dir, "b.m4a");
        request.sources.system = false;
        h.orchestrator.start_recording(request).unwrap();
        h.mic.emit_constant(0.5, 480);
        let result = h.orchestrator.stop_recording().unwrap().unwrap();
        assert_eq!(result.frames_written, 480);
    }

    #[test]
    fn second_start_is_rejected_without_disturbing_recording() {
        let mut h = harness();
        h.orchestrator.start_recording(request(&h.dir, "a.m4a")).unwrap();

        let err = h.orchestrator.start_recording(request(&h.dir, "b.m4a")).unwrap_err();
        assert!(matches!(err, CaptureError::ConfigurationFailed(_)));
        assert!(h.orchestrator.state().is_recording());
        assert!(h.system.is_started());

        h.orchestrator.stop_recording().unwrap();
    }

    #[test]
    fn invalid_request_is_rejected() {
        let mut h = harness();
        let mut request = request(&h.dir, "a.m4a");
        request.volumes.system = 4.0;

        let err = h.orchestrator.start_recording(request).unwrap_err();
        assert!(matches!(err, CaptureError::ConfigurationFailed(_)));
        assert!(h.orchestrator.state().is_idle());
        assert!(h.delegate.states().is_empty());
    }

    #[test]
    fn stop_when_idle_reports_no_file() {
        let mut h = harness();
        assert_eq!(h.orchestrator.stop_recording().unwrap(), None);
        assert_eq!(h.delegate.events.lock().last(), Some(&DelegateEvent::Stopped(None)));
    }

    #[test]
    fn finalization_failure_returns_to_idle() {
        let mut h = harness();
        let dest = h.dir.path().join("meeting.m4a");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("occupied"), b"x").unwrap();

        h.orchestrator.start_recording(RecordingRequest::new(&dest)).unwrap();
        h.system.emit_constant(0.5, 480);
        let err = h.orchestrator.stop_recording().unwrap_err();

        assert!(matches!(err, CaptureError::FileRenameFailed(_)));
        assert!(h.orchestrator.state().is_idle());
        assert_eq!(h.delegate.errors(), vec![err]);
        assert_eq!(h.delegate.events.lock().last(), Some(&DelegateEvent::Stopped(None)));
        assert!(h.dir.path().join("meeting.m4a.recording").exists());
    }

    #[test]
    fn capture_failure_is_forwarded_once_and_recording_continues() {
        let mut h = harness();
        h.orchestrator.start_recording(request(&h.dir, "meeting.m4a")).unwrap();

        h.mic.fail(CaptureError::DeviceUnavailable("unplugged".into()));
        h.mic.fail(CaptureError::DeviceUnavailable("unplugged".into()));
        h.system.emit_constant(0.5, 480);

        assert_eq!(h.delegate.errors().len(), 1);
        assert!(h.orchestrator.state().is_recording());
        let result = h.orchestrator.stop_recording().unwrap().unwrap();
        assert_eq!(result.frames_written, 480);
    }

    #[test]
    fn microphone_device_is_selected() {
        let mut h = harness();
        let mut request = request(&h.dir, "meeting.m4a");
        request.mic_device_id = Some("usb-mic".into());

        h.orchestrator.start_recording(request).unwrap();
        assert_eq!(h.mic.selected_device.lock().as_deref(), Some("usb-mic"));
        h.orchestrator.stop_recording().unwrap();
    }

    #[test]
    fn unknown_microphone_fails_start() {
        let mut h = harness();
        let mut request = request(&h.dir, "meeting.m4a");
        request.mic_device_id = Some("missing".into());

        let err = h.orchestrator.start_recording(request).unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
        assert!(h.orchestrator.state().is_idle());
    }

    #[test]
    fn updates_pass_through_to_mixer() {
        let mut h = harness();
        h.orchestrator.start_recording(request(&h.dir, "meeting.m4a")).unwrap();

        h.orchestrator.update_volumes(0.3, 1.7).unwrap();
        h.orchestrator.update_enabled_sources(false, true);

        let mixer = h.orchestrator.mixer();
        assert_relative_eq!(mixer.volume(SourceKind::System), 0.3);
        assert_relative_eq!(mixer.volume(SourceKind::Microphone), 1.7);
        assert!(!mixer.is_source_enabled(SourceKind::System));
        h.orchestrator.stop_recording().unwrap();
    }

    #[test]
    fn lists_microphones_and_permissions() {
        let mut system = MockProvider::new(SourceKind::System);
        system.permission = PermissionStatus::Denied;
        let mut h = harness_with(MockProvider::new(SourceKind::Microphone), system, MemoryEncoderFactory::default());

        let mics = h.orchestrator.available_microphones().unwrap();
        assert_eq!(mics.len(), 2);
        assert!(mics.iter().all(|m| m.kind == SourceKind::Microphone));
        assert!(h.orchestrator.microphone_permission_granted());
        assert!(!h.orchestrator.system_permission_granted());
    }
}
