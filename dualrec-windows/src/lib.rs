//! # dualrec-windows
//!
//! Windows WASAPI backend for dualrec.
//!
//! Provides:
//! - `WasapiMicCapture`: microphone capture via a WASAPI capture endpoint
//! - `WasapiLoopbackCapture`: system audio capture via WASAPI loopback on the render endpoint
//! - `DeviceEnumerator`: audio device enumeration via the MMDevice API
//! - `permissions`: Windows microphone privacy check
//!
//! ## Platform Requirements
//! - Windows 10 1803+
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use dualrec_core::{CaptureOrchestrator, RecordingRequest};
//! use dualrec_windows::{WasapiLoopbackCapture, WasapiMicCapture};
//!
//! let mut recorder = CaptureOrchestrator::with_aac_encoder(
//!     WasapiMicCapture::default_device(),
//!     WasapiLoopbackCapture::default_device(),
//! )?;
//! recorder.start_recording(RecordingRequest::new("meeting.m4a"))?;
//! ```

#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod permissions;
#[cfg(target_os = "windows")]
pub mod wasapi_loopback;
#[cfg(target_os = "windows")]
pub mod wasapi_mic;
#[cfg(target_os = "windows")]
mod wasapi_stream;

#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use wasapi_loopback::WasapiLoopbackCapture;
#[cfg(target_os = "windows")]
pub use wasapi_mic::WasapiMicCapture;
