//! Paths and finalization of recording files.
//!
//! A recording is written to `<destination>.recording` and only moved to
//! `<destination>` once the encoder has been closed.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;

/// Suffix appended to the destination while a recording is in progress.
pub const IN_PROGRESS_SUFFIX: &str = ".recording";

/// Extension given to destinations that have none.
pub const DEFAULT_EXTENSION: &str = "m4a";

/// The final path for `destination`, with `.m4a` added when it has no extension.
pub fn final_path(destination: &Path) -> PathBuf {
    if destination.extension().is_some() {
        destination.to_path_buf()
    } else {
        destination.with_extension(DEFAULT_EXTENSION)
    }
}

/// The in-progress path for a final path: `<final_path>.recording`.
pub fn in_progress_path(final_path: &Path) -> PathBuf {
    let mut name = OsString::from(final_path.as_os_str());
    name.push(IN_PROGRESS_SUFFIX);
    PathBuf::from(name)
}

/// Move a closed in-progress file to its final path.
///
/// On failure the in-progress file is left where it is.
pub fn finalize(in_progress: &Path, destination: &Path) -> Result<(), CaptureError> {
    fs::rename(in_progress, destination).map_err(|e| {
        CaptureError::FileRenameFailed(format!(
            "{} -> {}: {} (recording kept at {})",
            in_progress.display(),
            destination.display(),
            e,
            in_progress.display()
        ))
    })
}

/// Remove an in-progress file of an abandoned recording.
pub fn discard(in_progress: &Path) {
    match fs::remove_file(in_progress) {
        Ok(()) => log::debug!("Discarded {}", in_progress.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove {}: {}", in_progress.display(), e),
    }
}

/// Compute the SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let mut file = File::open(path)
        .map_err(|e| CaptureError::StorageError(format!("failed to open file for checksum: {}", e)))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| CaptureError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
