//! # dualrec-core
//!
//! Platform-agnostic core of the dual-source recorder.
//!
//! Captures system audio and a microphone at the same time, normalizes both
//! to 48 kHz stereo f32, mixes them on a fixed cadence and writes one AAC
//! `.m4a` file. Platform backends (Windows WASAPI) implement the
//! `CaptureProvider` trait and plug into the generic `CaptureOrchestrator`.
//!
//! ## Architecture
//!
//! ```text
//! dualrec-core (this crate)
//! ├── traits/       ← CaptureProvider, CaptureDelegate, AudioEncoder, EncoderFactory
//! ├── models/       ← CaptureError, RecordingState, RecordingRequest, AudioLevels, etc.
//! ├── processing/   ← AudioBlock, FormatNormalizer, RingBuffer, StereoMixer
//! ├── session/      ← SourceCapture, Mixer, CaptureOrchestrator
//! └── storage/      ← AAC encoder, recording file finalization, metadata
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{
    AudioLevels, AudioSource, AudioTransportType, MixerDiagnostics, SourceDiagnostics, SourceKind,
};
pub use models::config::{EncoderSettings, MixerConfiguration, RecordingRequest, SourceSelection, SourceVolumes};
pub use models::error::CaptureError;
pub use models::recording_result::{RecordingMetadata, RecordingResult, SourceTrack};
pub use models::state::{PermissionStatus, RecordingState, SourceState};
pub use processing::format::{AudioBlock, InputBlock, SampleData, SampleEncoding, StreamFormat};
pub use processing::normalizer::FormatNormalizer;
pub use processing::ring_buffer::RingBuffer;
pub use processing::stereo_mixer::StereoMixer;
pub use session::mixer::Mixer;
pub use session::orchestrator::CaptureOrchestrator;
pub use session::source_capture::SourceCapture;
pub use storage::aac_encoder::{AacEncoderFactory, AacFileEncoder};
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::capture_provider::{BlockCallback, CaptureProvider, ErrorCallback};
pub use traits::encoder::{AudioEncoder, EncoderFactory};
