use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::config::CaptureConfig;
use crate::processing::wav_format::ContainerHeader;

/// Result returned when a recording has been sealed into a container file.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub payload_bytes: u64,
    pub duration_secs: f64,
    pub metadata: RecordingMetadata,
    pub checksum: String,
}

/// Metadata stored alongside a recording.
///
/// Serializable for the JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub file_path: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub payload_bytes: u64,
    pub duration_secs: f64,
    pub checksum: String,
    pub description: String,
}

impl RecordingMetadata {
    pub fn new(config: &CaptureConfig, header: &ContainerHeader, file_path: &str, checksum: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            file_path: file_path.to_string(),
            sample_rate: header.sample_rate,
            channels: header.channels,
            bits_per_sample: header.bits_per_sample,
            payload_bytes: header.data_size as u64,
            duration_secs: header.duration_secs(),
            checksum: checksum.to_string(),
            description: config.to_string(),
        }
    }
}
