//! WASAPI loopback capture provider for system audio.
//!
//! Captures the audio mix going to the default render endpoint using
//! `AUDCLNT_STREAMFLAGS_LOOPBACK`. No special permissions needed on Windows.
//!
//! - Captures audio for one render device (not all devices)
//! - DRM-protected audio is silenced in loopback
//! - Nothing is delivered while nothing plays; the mixer then writes only
//!   the other source

use dualrec_core::models::audio_models::{AudioSource, SourceKind};
use dualrec_core::models::error::CaptureError;
use dualrec_core::models::state::PermissionStatus;
use dualrec_core::traits::capture_provider::{BlockCallback, CaptureProvider, ErrorCallback};

use crate::device_enumerator::{self, DeviceEnumerator};
use crate::permissions;
use crate::wasapi_stream::{CaptureStream, Endpoint};

/// WASAPI loopback capture for system audio.
pub struct WasapiLoopbackCapture {
    device_name: String,
    stream: Option<CaptureStream>,
}

impl WasapiLoopbackCapture {
    /// Create a loopback capture on the default render device.
    pub fn default_device() -> Self {
        let device_name = DeviceEnumerator::new()
            .ok()
            .and_then(|enumerator| {
                let device = enumerator.render_device().ok()?;
                device_enumerator::friendly_name(&device)
            })
            .map(|name| format!("{} (Loopback)", name))
            .unwrap_or_else(|| "System Audio (Loopback)".into());
        Self {
            device_name,
            stream: None,
        }
    }
}

impl Default for WasapiLoopbackCapture {
    fn default() -> Self {
        Self::default_device()
    }
}

impl CaptureProvider for WasapiLoopbackCapture {
    fn is_available(&self) -> bool {
        DeviceEnumerator::new()
            .map(|enumerator| enumerator.render_device().is_ok())
            .unwrap_or(false)
    }

    fn permission_status(&self) -> PermissionStatus {
        permissions::system_audio_permission()
    }

    fn start(&mut self, on_block: BlockCallback, on_error: ErrorCallback) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Err(CaptureError::ConfigurationFailed("loopback capture already running".into()));
        }
        let stream = CaptureStream::start("wasapi-loopback-capture", Endpoint::Loopback, on_block, on_error)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        Ok(())
    }

    fn device_info(&self) -> AudioSource {
        AudioSource {
            id: "system-loopback".into(),
            name: self.device_name.clone(),
            kind: SourceKind::System,
            is_default: true,
            transport_type: None,
        }
    }
}
