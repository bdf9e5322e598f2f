use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::processing::format::{CANONICAL_SAMPLE_RATE, MIX_BLOCK_FRAMES};

/// Highest per-source volume scalar (200%).
pub const MAX_VOLUME: f32 = 2.0;

/// Environment variable overriding the `ffmpeg` binary used for AAC encoding.
pub const FFMPEG_ENV: &str = "DUALREC_FFMPEG";

/// Tuning for the mixer's buffering and tick cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct MixerConfiguration {
    /// Frames drained from each ring buffer per tick (default: 4096).
    pub block_frames: usize,

    /// Ring buffer capacity in frames per channel (default: 48000, one second).
    pub buffer_capacity_frames: usize,

    /// Interval between mixing ticks (default: one block at 48 kHz, ~85 ms).
    pub tick_interval: Duration,

    /// Write `<destination>.metadata.json` next to finished recordings.
    pub write_metadata_sidecar: bool,
}

impl MixerConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.block_frames == 0 {
            return Err("block size must be positive".into());
        }
        if self.buffer_capacity_frames < self.block_frames {
            return Err(format!(
                "buffer capacity ({}) must hold at least one block ({})",
                self.buffer_capacity_frames, self.block_frames
            ));
        }
        if self.tick_interval.is_zero() {
            return Err("tick interval must be positive".into());
        }
        Ok(())
    }
}

impl Default for MixerConfiguration {
    fn default() -> Self {
        Self {
            block_frames: MIX_BLOCK_FRAMES,
            buffer_capacity_frames: CANONICAL_SAMPLE_RATE as usize,
            tick_interval: Duration::from_secs_f64(MIX_BLOCK_FRAMES as f64 / CANONICAL_SAMPLE_RATE as f64),
            write_metadata_sidecar: false,
        }
    }
}

/// Output encoder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    /// AAC bitrate in bits per second (default: 256000).
    pub bitrate: u32,

    /// `ffmpeg` executable used for encoding (default: `ffmpeg` on `PATH`).
    pub ffmpeg_path: PathBuf,
}

impl EncoderSettings {
    /// Default settings, with the encoder binary taken from `DUALREC_FFMPEG` when set.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(path) = std::env::var_os(FFMPEG_ENV).filter(|p| !p.is_empty()) {
            settings.ffmpeg_path = PathBuf::from(path);
        }
        settings
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            bitrate: 256_000,
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

/// Which sources take part in a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSelection {
    pub system: bool,
    pub microphone: bool,
}

impl Default for SourceSelection {
    fn default() -> Self {
        Self {
            system: true,
            microphone: true,
        }
    }
}

/// Per-source volume scalars, 0.0–2.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceVolumes {
    pub system: f32,
    pub microphone: f32,
}

impl SourceVolumes {
    pub fn validate(&self) -> Result<(), String> {
        for (name, volume) in [("system", self.system), ("microphone", self.microphone)] {
            if !volume.is_finite() || !(0.0..=MAX_VOLUME).contains(&volume) {
                return Err(format!("{} volume {} outside 0.0–{}", name, volume, MAX_VOLUME));
            }
        }
        Ok(())
    }
}

impl Default for SourceVolumes {
    fn default() -> Self {
        Self {
            system: 1.0,
            microphone: 1.0,
        }
    }
}

/// Everything a caller supplies to start a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingRequest {
    /// Final path of the recording (`.m4a` is appended when there is no extension).
    pub destination: PathBuf,

    /// Specific microphone device ID, or None for the system default.
    #[serde(default)]
    pub mic_device_id: Option<String>,

    #[serde(default)]
    pub sources: SourceSelection,

    #[serde(default)]
    pub volumes: SourceVolumes,
}

impl RecordingRequest {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            mic_device_id: None,
            sources: SourceSelection::default(),
            volumes: SourceVolumes::default(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.destination.file_name().is_none() {
            return Err(format!("destination {} has no file name", self.destination.display()));
        }
        self.volumes.validate()
    }
}
