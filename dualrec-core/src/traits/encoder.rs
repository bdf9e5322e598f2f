use std::path::Path;

use crate::models::config::EncoderSettings;
use crate::models::error::CaptureError;
use crate::processing::format::AudioBlock;

/// Streaming sink for mixed canonical audio.
///
/// Owned by the mixer's tick thread for the lifetime of one recording.
pub trait AudioEncoder: Send {
    /// Encode and append one block.
    fn write(&mut self, block: &AudioBlock) -> Result<(), CaptureError>;

    /// Flush and close the output. The file is complete once this returns `Ok`.
    fn finish(self: Box<Self>) -> Result<(), CaptureError>;
}

/// Opens encoders for new recordings.
///
/// The default is [`crate::AacEncoderFactory`].
pub trait EncoderFactory: Send + Sync {
    /// Open an encoder writing to `path`. Nothing may be left at `path` on failure.
    fn open(&self, path: &Path, settings: &EncoderSettings) -> Result<Box<dyn AudioEncoder>, CaptureError>;
}
