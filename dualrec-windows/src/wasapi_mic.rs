//! WASAPI microphone capture provider.
//!
//! Captures audio from a WASAPI capture endpoint (microphone) in shared mode
//! and delivers the endpoint's mix format to the core.

use dualrec_core::models::audio_models::{AudioSource, AudioTransportType, SourceKind};
use dualrec_core::models::error::CaptureError;
use dualrec_core::models::state::PermissionStatus;
use dualrec_core::traits::capture_provider::{BlockCallback, CaptureProvider, ErrorCallback};

use crate::device_enumerator::{self, DeviceEnumerator};
use crate::permissions;
use crate::wasapi_stream::{CaptureStream, Endpoint};

/// WASAPI microphone capture.
///
/// Opens a capture endpoint in shared mode and delivers audio buffers
/// on a dedicated thread registered with MMCSS.
pub struct WasapiMicCapture {
    device_id: Option<String>,
    device_name: String,
    is_default: bool,
    transport_type: Option<AudioTransportType>,
    stream: Option<CaptureStream>,
}

impl WasapiMicCapture {
    /// Create a capture for the system default microphone.
    pub fn default_device() -> Self {
        Self {
            device_id: None,
            device_name: "Default Microphone".into(),
            is_default: true,
            transport_type: None,
            stream: None,
        }
    }

    /// Create a capture for a specific microphone.
    pub fn with_device(device: &AudioSource) -> Self {
        Self {
            device_id: Some(device.id.clone()),
            device_name: device.name.clone(),
            is_default: device.is_default,
            transport_type: device.transport_type,
            stream: None,
        }
    }
}

impl Default for WasapiMicCapture {
    fn default() -> Self {
        Self::default_device()
    }
}

impl CaptureProvider for WasapiMicCapture {
    fn is_available(&self) -> bool {
        let Ok(enumerator) = DeviceEnumerator::new() else {
            return false;
        };
        match &self.device_id {
            Some(id) => enumerator.capture_device(Some(id)).is_ok(),
            None => enumerator
                .list_capture_devices()
                .map(|devices| !devices.is_empty())
                .unwrap_or(false),
        }
    }

    fn permission_status(&self) -> PermissionStatus {
        permissions::microphone_permission()
    }

    fn request_permission(&self) -> PermissionStatus {
        let status = permissions::microphone_permission();
        if !status.is_granted() {
            log::info!("Microphone access is off; enable it under Settings > Privacy > Microphone");
        }
        status
    }

    fn select_device(&mut self, device_id: Option<&str>) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Err(CaptureError::ConfigurationFailed(
                "cannot change microphone while capturing".into(),
            ));
        }
        let Some(id) = device_id else {
            *self = Self::default_device();
            return Ok(());
        };

        let enumerator = DeviceEnumerator::new()?;
        let device = enumerator
            .list_capture_devices()?
            .into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| CaptureError::DeviceUnavailable(format!("no active microphone with id {}", id)))?;
        log::debug!("Selected microphone {}", device.name);
        *self = Self::with_device(&device);
        Ok(())
    }

    fn available_devices(&self) -> Result<Vec<AudioSource>, CaptureError> {
        DeviceEnumerator::new()?.list_capture_devices()
    }

    fn start(&mut self, on_block: BlockCallback, on_error: ErrorCallback) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Err(CaptureError::ConfigurationFailed("mic capture already running".into()));
        }
        let stream = CaptureStream::start(
            "wasapi-mic-capture",
            Endpoint::Capture(self.device_id.clone()),
            on_block,
            on_error,
        )?;
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
            id: self.device_id.clone().unwrap_or_else(|| "default-mic".into()),
            name: self.device_name.clone(),
            kind: SourceKind::Microphone,
            is_default: self.is_default,
            transport_type: self.transport_type,
        }
    }
}

/// Name of the current default microphone, for display.
pub fn default_microphone_name() -> Option<String> {
    let enumerator = DeviceEnumerator::new().ok()?;
    let device = enumerator.capture_device(None).ok()?;
    device_enumerator::friendly_name(&device)
}
