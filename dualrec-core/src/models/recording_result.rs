use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::audio_models::SourceKind;
use crate::processing::format::{CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE};

/// Result returned when a recording has been finalized at its destination.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    /// Seconds of mixed audio written. Tracks signal arrival, not wall-clock time.
    pub duration_secs: f64,
    pub frames_written: u64,
    pub checksum: String,
    pub metadata: RecordingMetadata,
}

/// How one source was configured when the recording stopped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceTrack {
    pub source: SourceKind,
    pub enabled: bool,
    pub volume: f32,
}

/// Metadata stored alongside a recording.
///
/// Serializable for the optional JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub file_path: String,
    pub duration_secs: f64,
    pub checksum: String,
    pub codec: String,
    pub bitrate: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub sources: Vec<SourceTrack>,
}

impl RecordingMetadata {
    /// Creates metadata for a mixed AAC stereo recording.
    pub fn new_mixed(
        duration_secs: f64,
        file_path: &str,
        checksum: &str,
        bitrate: u32,
        sources: Vec<SourceTrack>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            file_path: file_path.to_string(),
            duration_secs,
            checksum: checksum.to_string(),
            codec: "aac".to_string(),
            bitrate,
            sample_rate: CANONICAL_SAMPLE_RATE,
            channels: CANONICAL_CHANNELS as u16,
            sources,
        }
    }
}
