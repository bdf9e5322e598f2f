//! AAC/M4A output through an `ffmpeg` child process.
//!
//! Mixed audio is piped to ffmpeg's stdin as interleaved 32-bit float PCM at
//! the canonical rate; ffmpeg encodes AAC-LC and muxes an MPEG-4 audio file.
//! The output container is forced (`-f ipod`) because the in-progress file
//! carries a `.recording` suffix.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::{self, JoinHandle};

use crate::models::config::EncoderSettings;
use crate::models::error::CaptureError;
use crate::processing::format::{AudioBlock, CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE};
use crate::traits::encoder::{AudioEncoder, EncoderFactory};

/// Raw PCM layout fed to ffmpeg, matching the host byte order.
const PCM_FORMAT: &str = if cfg!(target_endian = "big") { "f32be" } else { "f32le" };

/// Opens [`AacFileEncoder`]s. The default encoder factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct AacEncoderFactory;

impl EncoderFactory for AacEncoderFactory {
    fn open(&self, path: &Path, settings: &EncoderSettings) -> Result<Box<dyn AudioEncoder>, CaptureError> {
        Ok(Box::new(AacFileEncoder::open(path, settings)?))
    }
}

/// Streaming AAC encoder writing an `.m4a` container.
pub struct AacFileEncoder {
    path: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_reader: Option<JoinHandle<String>>,
    frames_written: u64,
}

impl AacFileEncoder {
    /// Spawn ffmpeg writing to `path`.
    ///
    /// The output file is created before ffmpeg starts so that an unwritable
    /// path fails here rather than on the first write. An existing file at
    /// `path` is never truncated or removed.
    pub fn open(path: &Path, settings: &EncoderSettings) -> Result<Self, CaptureError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                CaptureError::EncoderOpenFailed(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| CaptureError::EncoderOpenFailed(format!("failed to create {}: {}", path.display(), e)))?;

        let spawned = Command::new(&settings.ffmpeg_path)
            .args(build_ffmpeg_args(path, settings))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let _ = fs::remove_file(path);
                return Err(if e.kind() == ErrorKind::NotFound {
                    CaptureError::EncoderOpenFailed(format!("{} not found", settings.ffmpeg_path.display()))
                } else {
                    CaptureError::EncoderOpenFailed(format!("failed to start {}: {}", settings.ffmpeg_path.display(), e))
                });
            }
        };

        let stdin = child.stdin.take();
        let stderr_reader = child.stderr.take().and_then(|mut stderr| {
            thread::Builder::new()
                .name("dualrec-ffmpeg-stderr".into())
                .spawn(move || {
                    let mut output = String::new();
                    let _ = stderr.read_to_string(&mut output);
                    output
                })
                .ok()
        });

        log::info!(
            "Encoding AAC {} kbps to {}",
            settings.bitrate / 1000,
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            child: Some(child),
            stdin,
            stderr_reader,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn stderr_output(&mut self) -> String {
        self.stderr_reader
            .take()
            .and_then(|reader| reader.join().ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }
}

impl AudioEncoder for AacFileEncoder {
    fn write(&mut self, block: &AudioBlock) -> Result<(), CaptureError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| CaptureError::EncoderWriteFailed("encoder is closed".into()))?;
        let samples = block.interleaved();
        stdin
            .write_all(bytemuck::cast_slice(&samples))
            .map_err(|e| CaptureError::EncoderWriteFailed(format!("ffmpeg pipe: {}", e)))?;
        self.frames_written += block.frames() as u64;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), CaptureError> {
        // closing stdin signals end of stream
        drop(self.stdin.take());

        let Some(mut child) = self.child.take() else {
            return Err(CaptureError::EncoderWriteFailed("encoder already finished".into()));
        };
        let status = child
            .wait()
            .map_err(|e| CaptureError::EncoderWriteFailed(format!("waiting for ffmpeg: {}", e)))?;
        let stderr = self.stderr_output();

        if !status.success() {
            return Err(CaptureError::EncoderWriteFailed(format!("ffmpeg exited with {}: {}", status, stderr)));
        }
        if !stderr.is_empty() {
            log::warn!("ffmpeg: {}", stderr);
        }
        log::debug!("Encoded {} frames to {}", self.frames_written, self.path.display());
        Ok(())
    }
}

impl Drop for AacFileEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Build the ffmpeg command line for encoding canonical PCM from stdin to `output_path`.
pub fn build_ffmpeg_args(output_path: &Path, settings: &EncoderSettings) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-nostats".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        PCM_FORMAT.to_string(),
        "-ar".to_string(),
        CANONICAL_SAMPLE_RATE.to_string(),
        "-ac".to_string(),
        CANONICAL_CHANNELS.to_string(),
        "-i".to_string(),
        "pipe:0".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        format!("{}k", settings.bitrate / 1000),
        "-f".to_string(),
        "ipod".to_string(),
        "-y".to_string(),
        output_path.to_string_lossy().to_string(),
    ]
}
