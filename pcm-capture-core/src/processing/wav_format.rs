//! WAV container header.
//!
//! Generates and parses the standard 44-byte RIFF header that prefixes the
//! raw PCM payload of a finished recording.

use crate::models::config::CaptureConfig;
use crate::models::error::CaptureError;

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Samples always reach the raw store as 16-bit little-endian PCM.
pub const PCM_BITS_PER_SAMPLE: u16 = 16;

/// Header fields of a sealed recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl ContainerHeader {
    /// Header for `payload_len` bytes of PCM captured with `config`.
    ///
    /// The payload is always 16-bit: an 8-bit capture config only affects how
    /// the device is opened, not how samples are stored.
    pub fn new(config: &CaptureConfig, payload_len: u64) -> Result<Self, CaptureError> {
        let data_size = u32::try_from(payload_len)
            .ok()
            .filter(|size| size.checked_add(36).is_some())
            .ok_or_else(|| {
                CaptureError::FinalizeError(format!(
                    "payload of {} bytes does not fit a RIFF container",
                    payload_len
                ))
            })?;

        Ok(Self {
            channels: config.channels().count(),
            sample_rate: config.sample_rate(),
            bits_per_sample: PCM_BITS_PER_SAMPLE,
            data_size,
        })
    }

    /// RIFF chunk size: everything after the first 8 bytes.
    ///
    /// Saturates for parsed headers whose data size leaves no room for it.
    pub fn chunk_size(&self) -> u32 {
        self.data_size.saturating_add(36)
    }

    /// Widened so that any parsed header's fields multiply without overflow.
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64 * self.bits_per_sample as u64 / 8
    }

    pub fn block_align(&self) -> u32 {
        self.channels as u32 * self.bits_per_sample as u32 / 8
    }

    /// Total length of the sealed file.
    pub fn file_len(&self) -> u64 {
        WAV_HEADER_SIZE as u64 + self.data_size as u64
    }

    pub fn duration_secs(&self) -> f64 {
        let byte_rate = self.byte_rate();
        if byte_rate == 0 {
            return 0.0;
        }
        self.data_size as f64 / byte_rate as f64
    }

    pub fn to_bytes(&self) -> [u8; WAV_HEADER_SIZE] {
        generate_wav_header(self.sample_rate, self.bits_per_sample, self.channels, self.data_size)
    }

    /// Read a header back from the first 44 bytes of a container.
    pub fn parse(bytes: &[u8]) -> Result<Self, CaptureError> {
        if bytes.len() < WAV_HEADER_SIZE {
            return Err(CaptureError::StorageError(format!(
                "header needs {} bytes, got {}",
                WAV_HEADER_SIZE,
                bytes.len()
            )));
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(CaptureError::StorageError("not a RIFF/WAVE container".into()));
        }
        if &bytes[12..16] != b"fmt " || &bytes[36..40] != b"data" {
            return Err(CaptureError::StorageError("unexpected chunk layout".into()));
        }
        if read_u32(bytes, 16) != 16 || read_u16(bytes, 20) != 1 {
            return Err(CaptureError::StorageError("not uncompressed PCM".into()));
        }

        Ok(Self {
            channels: read_u16(bytes, 22),
            sample_rate: read_u32(bytes, 24),
            bits_per_sample: read_u16(bytes, 34),
            data_size: read_u32(bytes, 40),
        })
    }
}

/// Generate a 44-byte WAV RIFF header.
///
/// Format: PCM (format code 1), little-endian.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bit_depth / 8
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(sample_rate: u32, bit_depth: u16, channels: u16, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    // Out-of-range fields saturate; headers built from a CaptureConfig never reach the limits.
    let byte_rate = u32::try_from(sample_rate as u64 * channels as u64 * bit_depth as u64 / 8).unwrap_or(u32::MAX);
    let block_align = u16::try_from(channels as u32 * bit_depth as u32 / 8).unwrap_or(u16::MAX);
    let chunk_size = data_size.saturating_add(36);

    let mut header = [0u8; WAV_HEADER_SIZE];

    // RIFF chunk descriptor
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt sub-chunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    // data sub-chunk
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}
