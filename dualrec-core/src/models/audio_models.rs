use std::fmt;

use serde::{Deserialize, Serialize};

/// Which of the two capture sources a block, setting or error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    System,
    Microphone,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system audio"),
            Self::Microphone => f.write_str("microphone"),
        }
    }
}

/// Transport type for an audio device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioTransportType {
    BuiltIn,
    Bluetooth,
    BluetoothLE,
    Usb,
    Virtual,
    Unknown,
}

/// An audio device available for capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    pub is_default: bool,
    pub transport_type: Option<AudioTransportType>,
}

/// Instantaneous loudness estimates, each normalized to 0.0–1.0.
///
/// `system` and `microphone` are refreshed as blocks arrive from the capture
/// threads, `mixed` on every mixing tick that produced output. The three
/// fields are updated independently.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioLevels {
    pub system: f32,
    pub microphone: f32,
    pub mixed: f32,
}

impl AudioLevels {
    pub fn source(&self, kind: SourceKind) -> f32 {
        match kind {
            SourceKind::System => self.system,
            SourceKind::Microphone => self.microphone,
        }
    }

    pub(crate) fn set_source(&mut self, kind: SourceKind, level: f32) {
        match kind {
            SourceKind::System => self.system = level,
            SourceKind::Microphone => self.microphone = level,
        }
    }
}

/// Per-source counters kept by the mixer for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceDiagnostics {
    pub blocks_received: u64,
    pub blocks_dropped: u64,
    pub frames_buffered: u64,
    pub frames_overflowed: u64,
}

/// Diagnostics for debugging a mixing session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixerDiagnostics {
    pub system: SourceDiagnostics,
    pub microphone: SourceDiagnostics,
    pub ticks: u64,
    pub ticks_written: u64,
    pub frames_written: u64,
    pub write_failures: u64,
}

impl MixerDiagnostics {
    pub fn source(&self, kind: SourceKind) -> &SourceDiagnostics {
        match kind {
            SourceKind::System => &self.system,
            SourceKind::Microphone => &self.microphone,
        }
    }

    pub(crate) fn source_mut(&mut self, kind: SourceKind) -> &mut SourceDiagnostics {
        match kind {
            SourceKind::System => &mut self.system,
            SourceKind::Microphone => &mut self.microphone,
        }
    }
}
