use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::models::config::CaptureConfig;
use crate::models::error::CaptureError;
use crate::models::recording_result::{RecordingMetadata, RecordingResult};
use crate::processing::wav_format::{ContainerHeader, WAV_HEADER_SIZE};

/// Write the container header for `payload_len` bytes at offset 0 of `out`.
///
/// The payload that follows the reserved header bytes is left untouched.
pub fn seal<W: Write + Seek>(
    out: &mut W,
    payload_len: u64,
    config: &CaptureConfig,
) -> Result<ContainerHeader, CaptureError> {
    let header = ContainerHeader::new(config, payload_len)?;

    out.seek(SeekFrom::Start(0))
        .map_err(|e| CaptureError::FinalizeError(format!("seek failed: {}", e)))?;
    out.write_all(&header.to_bytes())
        .map_err(|e| CaptureError::FinalizeError(format!("header write failed: {}", e)))?;
    out.flush()
        .map_err(|e| CaptureError::FinalizeError(format!("flush failed: {}", e)))?;

    Ok(header)
}

/// Seal a closed raw store into a playable WAV file.
///
/// The payload length is everything after the 44 reserved bytes. On failure
/// the raw capture stays on disk unsealed; the error is not retryable.
pub fn seal_file(path: &Path, config: &CaptureConfig) -> Result<RecordingResult, CaptureError> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| CaptureError::FinalizeError(format!("failed to open {}: {}", path.display(), e)))?;

    let file_len = file
        .metadata()
        .map_err(|e| CaptureError::FinalizeError(format!("failed to stat {}: {}", path.display(), e)))?
        .len();
    let payload_len = file_len.checked_sub(WAV_HEADER_SIZE as u64).ok_or_else(|| {
        CaptureError::FinalizeError(format!(
            "{} is {} bytes, shorter than the reserved header",
            path.display(),
            file_len
        ))
    })?;

    let header = seal(&mut file, payload_len, config)?;
    file.sync_all()
        .map_err(|e| CaptureError::FinalizeError(format!("sync failed: {}", e)))?;
    drop(file);

    let checksum = sha256_file(path)?;
    log::info!(
        "Sealed {} ({} payload bytes, {:.2}s)",
        path.display(),
        payload_len,
        header.duration_secs()
    );

    let metadata = RecordingMetadata::new(config, &header, &path.to_string_lossy(), &checksum);
    Ok(RecordingResult {
        file_path: path.to_path_buf(),
        payload_bytes: payload_len,
        duration_secs: header.duration_secs(),
        metadata,
        checksum,
    })
}

/// Compute SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let mut file = File::open(path)
        .map_err(|e| CaptureError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| CaptureError::StorageError(format!("failed to hash file: {}", e)))?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
