//! Windows microphone privacy permission check.
//!
//! On Windows 10 1803+, microphone access is controlled by the privacy
//! settings at Settings > Privacy > Microphone. Desktop apps are generally
//! allowed unless the user has disabled the global toggle.
//!
//! There is no per-app consent dialog for unpackaged desktop apps, so a
//! permission request can only re-check the current setting.

use windows::Win32::Foundation::E_ACCESSDENIED;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use dualrec_core::models::state::PermissionStatus;

use crate::device_enumerator::DeviceEnumerator;

/// Check whether the default microphone can be opened.
///
/// Activating `IAudioClient` fails with `E_ACCESSDENIED` when microphone
/// access is disabled in the privacy settings. Without any capture device
/// the answer is `Undetermined`.
pub fn microphone_permission() -> PermissionStatus {
    let enumerator = match DeviceEnumerator::new() {
        Ok(enumerator) => enumerator,
        Err(e) => {
            log::warn!("Cannot check microphone permission: {}", e);
            return PermissionStatus::Undetermined;
        }
    };
    let Ok(device) = enumerator.capture_device(None) else {
        return PermissionStatus::Undetermined;
    };

    let result: windows::core::Result<IAudioClient> = unsafe { device.Activate(CLSCTX_ALL, None) };
    match result {
        Ok(_) => PermissionStatus::Granted,
        Err(e) if e.code() == E_ACCESSDENIED => PermissionStatus::Denied,
        Err(e) => {
            log::warn!("Unexpected error checking microphone permission: {}", e);
            PermissionStatus::Granted
        }
    }
}

/// System audio (loopback) capture does not require any permission on Windows.
pub fn system_audio_permission() -> PermissionStatus {
    PermissionStatus::Granted
}
