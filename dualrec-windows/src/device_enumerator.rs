//! Windows audio device enumeration via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` to list capture (microphone) and render
//! (speaker/headphone) endpoints with friendly names and transport types.

use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Devices::FunctionDiscovery::{PKEY_Device_EnumeratorName, PKEY_Device_FriendlyName};
use windows::Win32::Foundation::PROPERTYKEY;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::StructuredStorage::PropVariantToStringAlloc;
use windows::Win32::System::Com::*;

use dualrec_core::models::audio_models::{AudioSource, AudioTransportType, SourceKind};
use dualrec_core::models::error::CaptureError;

use crate::com::{to_wide, ComInit};

/// Audio device enumerator using the Windows MMDevice API.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
    _com: ComInit,
}

impl DeviceEnumerator {
    /// Create a new device enumerator, initializing COM on this thread.
    pub fn new() -> Result<Self, CaptureError> {
        let com = ComInit::new()?;
        let enumerator: IMMDeviceEnumerator = unsafe {
            CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| CaptureError::DeviceUnavailable(format!("failed to create enumerator: {}", e)))?
        };
        Ok(Self { enumerator, _com: com })
    }

    /// List active capture (microphone) devices.
    pub fn list_capture_devices(&self) -> Result<Vec<AudioSource>, CaptureError> {
        self.list_devices(eCapture, SourceKind::Microphone)
    }

    /// List active render (output) devices, the endpoints loopback can record.
    pub fn list_render_devices(&self) -> Result<Vec<AudioSource>, CaptureError> {
        self.list_devices(eRender, SourceKind::System)
    }

    /// The default capture endpoint, or the one with `device_id`.
    pub fn capture_device(&self, device_id: Option<&str>) -> Result<IMMDevice, CaptureError> {
        match device_id {
            Some(id) => self.device_by_id(id),
            None => self.default_device(eCapture),
        }
    }

    /// The default render endpoint.
    pub fn render_device(&self) -> Result<IMMDevice, CaptureError> {
        self.default_device(eRender)
    }

    fn default_device(&self, data_flow: EDataFlow) -> Result<IMMDevice, CaptureError> {
        unsafe {
            self.enumerator
                .GetDefaultAudioEndpoint(data_flow, eConsole)
                .map_err(|e| CaptureError::DeviceUnavailable(format!("no default endpoint: {}", e)))
        }
    }

    fn device_by_id(&self, id: &str) -> Result<IMMDevice, CaptureError> {
        let wide_id = to_wide(id);
        unsafe {
            self.enumerator
                .GetDevice(PCWSTR(wide_id.as_ptr()))
                .map_err(|e| CaptureError::DeviceUnavailable(format!("device {}: {}", id, e)))
        }
    }

    fn list_devices(&self, data_flow: EDataFlow, kind: SourceKind) -> Result<Vec<AudioSource>, CaptureError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(data_flow, DEVICE_STATE_ACTIVE)
                .map_err(|e| CaptureError::DeviceUnavailable(format!("EnumAudioEndpoints failed: {}", e)))?;

            let count = collection
                .GetCount()
                .map_err(|e| CaptureError::DeviceUnavailable(format!("GetCount failed: {}", e)))?;

            let default_id = self.default_device(data_flow).ok().and_then(|d| device_id(&d));

            let mut devices = Vec::new();
            for i in 0..count {
                let Ok(device) = collection.Item(i) else {
                    continue;
                };
                let Some(id) = device_id(&device) else {
                    continue;
                };
                let name = string_property(&device, &PKEY_Device_FriendlyName).unwrap_or_else(|| format!("Device {}", i));
                let is_default = default_id.as_deref() == Some(id.as_str());

                devices.push(AudioSource {
                    id,
                    name,
                    kind,
                    is_default,
                    transport_type: Some(detect_transport_type(&device)),
                });
            }

            Ok(devices)
        }
    }
}

/// Endpoint ID string of a device.
pub(crate) fn device_id(device: &IMMDevice) -> Option<String> {
    unsafe {
        let id = device.GetId().ok()?;
        take_co_string(id)
    }
}

/// Friendly name of a device, if it has one.
pub(crate) fn friendly_name(device: &IMMDevice) -> Option<String> {
    string_property(device, &PKEY_Device_FriendlyName)
}

fn string_property(device: &IMMDevice, key: &PROPERTYKEY) -> Option<String> {
    unsafe {
        let store = device.OpenPropertyStore(STGM_READ).ok()?;
        let value = store.GetValue(key).ok()?;
        let text = PropVariantToStringAlloc(&value).ok()?;
        take_co_string(text)
    }
}

/// Copy and free a COM-allocated wide string.
unsafe fn take_co_string(text: PWSTR) -> Option<String> {
    if text.is_null() {
        return None;
    }
    let value = text.to_string().ok();
    CoTaskMemFree(Some(text.0 as *const _));
    value.filter(|v| !v.is_empty())
}

/// Transport type from the device's enumerator name.
fn detect_transport_type(device: &IMMDevice) -> AudioTransportType {
    let Some(name) = string_property(device, &PKEY_Device_EnumeratorName) else {
        return AudioTransportType::Unknown;
    };
    let name = name.to_uppercase();
    if name.contains("BTHLEENUM") {
        AudioTransportType::BluetoothLE
    } else if name.contains("BTHENUM") {
        AudioTransportType::Bluetooth
    } else if name.contains("USB") {
        AudioTransportType::Usb
    } else if name.contains("SWD") || name.contains("ROOT") {
        AudioTransportType::Virtual
    } else {
        AudioTransportType::BuiltIn
    }
}
