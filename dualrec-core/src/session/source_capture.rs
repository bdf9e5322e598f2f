use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioSource, SourceKind};
use crate::models::error::CaptureError;
use crate::models::state::{PermissionStatus, SourceState};
use crate::traits::capture_provider::{BlockCallback, CaptureProvider, ErrorCallback};

/// Lifecycle wrapper around one capture provider.
///
/// Tracks `Idle → Capturing → (Idle | Failed)`. A terminal provider error
/// moves the source to `Failed` and is passed to the owner's error callback
/// once; the source is not restarted automatically.
pub struct SourceCapture<P: CaptureProvider> {
    kind: SourceKind,
    provider: P,
    enabled: bool,
    permission: PermissionStatus,
    state: Arc<Mutex<SourceState>>,
}

impl<P: CaptureProvider> SourceCapture<P> {
    pub fn new(kind: SourceKind, provider: P) -> Self {
        let permission = provider.permission_status();
        Self {
            kind,
            provider,
            enabled: true,
            permission,
            state: Arc::new(Mutex::new(SourceState::Idle)),
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn state(&self) -> SourceState {
        self.state.lock().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Last known permission, see [`Self::refresh_permission`].
    pub fn permission_granted(&self) -> bool {
        self.permission.is_granted()
    }

    pub fn refresh_permission(&mut self) -> PermissionStatus {
        self.permission = self.provider.permission_status();
        self.permission
    }

    /// Ask the user for access. May block until they answer.
    pub fn request_permission(&mut self) -> PermissionStatus {
        self.permission = self.provider.request_permission();
        log::debug!("{} permission: {:?}", self.kind, self.permission);
        self.permission
    }

    pub fn select_device(&mut self, device_id: Option<&str>) -> Result<(), CaptureError> {
        self.provider.select_device(device_id)
    }

    pub fn available_devices(&self) -> Result<Vec<AudioSource>, CaptureError> {
        self.provider.available_devices()
    }

    pub fn device_info(&self) -> AudioSource {
        self.provider.device_info()
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Start delivering blocks to `on_block`.
    ///
    /// `on_error` is called at most once, for the first terminal error of
    /// this run.
    pub fn start(&mut self, on_block: BlockCallback, on_error: ErrorCallback) -> Result<(), CaptureError> {
        {
            let mut state = self.state.lock();
            match &*state {
                SourceState::Capturing => {
                    return Err(CaptureError::ConfigurationFailed(format!("{} is already capturing", self.kind)));
                }
                SourceState::Failed(_) => {
                    if let Err(e) = self.provider.stop() {
                        log::debug!("Reaping failed {} capture: {}", self.kind, e);
                    }
                }
                SourceState::Idle => {}
            }
            if !self.provider.is_available() {
                let error = CaptureError::DeviceUnavailable(format!("{} is not available", self.kind));
                *state = SourceState::Failed(error.clone());
                return Err(error);
            }
            *state = SourceState::Capturing;
        }

        let kind = self.kind;
        let state = Arc::clone(&self.state);
        let report: ErrorCallback = Arc::new(move |error: CaptureError| {
            {
                let mut state = state.lock();
                if !state.is_capturing() {
                    return;
                }
                *state = SourceState::Failed(error.clone());
            }
            log::error!("{} capture failed: {}", kind, error);
            on_error(error);
        });

        if let Err(e) = self.provider.start(on_block, report) {
            log::error!("Failed to start {} capture: {}", self.kind, e);
            *self.state.lock() = SourceState::Failed(e.clone());
            return Err(e);
        }
        log::info!("{} capture started ({})", self.kind, self.provider.device_info().name);
        Ok(())
    }

    /// Release the provider. Does nothing while idle.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        let previous = std::mem::take(&mut *self.state.lock());
        match previous {
            SourceState::Idle => Ok(()),
            SourceState::Capturing => {
                self.provider.stop()?;
                log::info!("{} capture stopped", self.kind);
                Ok(())
            }
            SourceState::Failed(_) => {
                if let Err(e) = self.provider.stop() {
                    log::debug!("Reaping failed {} capture: {}", self.kind, e);
                }
                Ok(())
            }
        }
    }
}
