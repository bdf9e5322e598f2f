//! COM apartment setup for WASAPI calls.

use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};

use dualrec_core::models::error::CaptureError;

/// Initializes COM (MTA) on the current thread for as long as it lives.
///
/// A thread already in another apartment is used as is.
pub(crate) struct ComInit {
    should_uninit: bool,
}

impl ComInit {
    pub(crate) fn new() -> Result<Self, CaptureError> {
        let result = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if let Err(err) = result.ok() {
            if err.code() == RPC_E_CHANGED_MODE {
                return Ok(Self { should_uninit: false });
            }
            return Err(CaptureError::DeviceUnavailable(format!("CoInitializeEx failed: {}", err)));
        }
        Ok(Self { should_uninit: true })
    }
}

impl Drop for ComInit {
    fn drop(&mut self) {
        if self.should_uninit {
            unsafe { CoUninitialize() };
        }
    }
}

/// NUL-terminated UTF-16 copy of `s`.
pub(crate) fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}
