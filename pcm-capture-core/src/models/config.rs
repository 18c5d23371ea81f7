use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Highest sample rate accepted by [`CaptureConfig`].
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Channel layout of the captured stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    /// Number of interleaved channels.
    pub fn count(self) -> u16 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }
}

impl TryFrom<u16> for ChannelLayout {
    type Error = CaptureError;

    fn try_from(channels: u16) -> Result<Self, Self::Error> {
        match channels {
            1 => Ok(Self::Mono),
            2 => Ok(Self::Stereo),
            other => Err(CaptureError::InvalidConfig(format!(
                "unsupported channel count: {}",
                other
            ))),
        }
    }
}

/// Sample width the device is asked to capture at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitDepth {
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "16")]
    Sixteen,
}

impl BitDepth {
    pub fn bits(self) -> u16 {
        match self {
            Self::Eight => 8,
            Self::Sixteen => 16,
        }
    }
}

impl TryFrom<u16> for BitDepth {
    type Error = CaptureError;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(Self::Eight),
            16 => Ok(Self::Sixteen),
            other => Err(CaptureError::InvalidConfig(format!(
                "unsupported bit depth: {}",
                other
            ))),
        }
    }
}

/// Which physical input the device should record from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    #[default]
    Default,
    Mic,
    Camcorder,
    VoiceRecognition,
    VoiceCommunication,
    Unprocessed,
}

/// Immutable capture configuration.
///
/// Every constructor (including deserialization) goes through the same
/// validation, so a `CaptureConfig` value is always usable by a session.
/// Without an output path the session only streams buffers and no container
/// file is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCaptureConfig", into = "RawCaptureConfig")]
pub struct CaptureConfig {
    sample_rate: u32,
    channels: ChannelLayout,
    bit_depth: BitDepth,
    source: CaptureSource,
    output_path: Option<PathBuf>,
}

impl CaptureConfig {
    pub fn new(
        sample_rate: u32,
        channels: ChannelLayout,
        bit_depth: BitDepth,
        source: CaptureSource,
    ) -> Result<Self, CaptureError> {
        if sample_rate == 0 {
            return Err(CaptureError::InvalidConfig("sample rate must be positive".into()));
        }
        if sample_rate > MAX_SAMPLE_RATE {
            return Err(CaptureError::InvalidConfig(format!(
                "sample rate {} exceeds {}",
                sample_rate, MAX_SAMPLE_RATE
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
            bit_depth,
            source,
            output_path: None,
        })
    }

    /// Build from plain numbers, e.g. values read from a settings store.
    pub fn from_raw(
        sample_rate: u32,
        channels: u16,
        bit_depth: u16,
        source: CaptureSource,
    ) -> Result<Self, CaptureError> {
        Self::new(
            sample_rate,
            ChannelLayout::try_from(channels)?,
            BitDepth::try_from(bit_depth)?,
            source,
        )
    }

    /// Parse a JSON configuration document.
    ///
    /// ```
    /// use pcm_capture_core::CaptureConfig;
    ///
    /// let config = CaptureConfig::from_json(
    ///     r#"{ "sample_rate": 44100, "channels": 1, "bit_depth": 16, "output_path": "take.wav" }"#,
    /// )
    /// .unwrap();
    /// assert_eq!(config.sample_rate(), 44100);
    /// ```
    pub fn from_json(json: &str) -> Result<Self, CaptureError> {
        serde_json::from_str(json)
            .map_err(|e| CaptureError::InvalidConfig(format!("failed to parse config: {}", e)))
    }

    /// Same configuration, persisted to `path` when the recording finishes.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> ChannelLayout {
        self.channels
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    pub fn source(&self) -> CaptureSource {
        self.source
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }
}

impl fmt::Display for CaptureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = match self.bit_depth {
            BitDepth::Sixteen => "16BIT",
            BitDepth::Eight => "8BIT",
        };
        let layout = match self.channels {
            ChannelLayout::Mono => "Mono",
            ChannelLayout::Stereo => "Stereo",
        };
        write!(f, "{} Hz, bits: {}, channel: {}", self.sample_rate, bits, layout)
    }
}

/// Wire form of [`CaptureConfig`]: plain numbers, validated on conversion.
#[derive(Serialize, Deserialize)]
struct RawCaptureConfig {
    sample_rate: u32,
    channels: u16,
    bit_depth: u16,
    #[serde(default)]
    source: CaptureSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_path: Option<PathBuf>,
}

impl TryFrom<RawCaptureConfig> for CaptureConfig {
    type Error = CaptureError;

    fn try_from(raw: RawCaptureConfig) -> Result<Self, Self::Error> {
        let mut config = Self::from_raw(raw.sample_rate, raw.channels, raw.bit_depth, raw.source)?;
        config.output_path = raw.output_path;
        Ok(config)
    }
}

impl From<CaptureConfig> for RawCaptureConfig {
    fn from(config: CaptureConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels.count(),
            bit_depth: config.bit_depth.bits(),
            source: config.source,
            output_path: config.output_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_and_oversized_rates() {
        let zero = CaptureConfig::new(0, ChannelLayout::Mono, BitDepth::Sixteen, CaptureSource::Mic);
        assert!(matches!(zero, Err(CaptureError::InvalidConfig(_))));

        let huge = CaptureConfig::new(
            MAX_SAMPLE_RATE + 1,
            ChannelLayout::Stereo,
            BitDepth::Sixteen,
            CaptureSource::Mic,
        );
        assert!(matches!(huge, Err(CaptureError::InvalidConfig(_))));
    }

    #[test]
    fn from_raw_rejects_bad_channels_and_depth() {
        assert_eq!(
            CaptureConfig::from_raw(44100, 3, 16, CaptureSource::Default),
            Err(CaptureError::InvalidConfig("unsupported channel count: 3".into()))
        );
        assert_eq!(
            CaptureConfig::from_raw(44100, 1, 24, CaptureSource::Default),
            Err(CaptureError::InvalidConfig("unsupported bit depth: 24".into()))
        );
    }

    #[test]
    fn display_matches_recorder_description() {
        let config = CaptureConfig::from_raw(44100, 1, 16, CaptureSource::Camcorder).unwrap();
        assert_eq!(config.to_string(), "44100 Hz, bits: 16BIT, channel: Mono");

        let config = CaptureConfig::from_raw(8000, 2, 8, CaptureSource::Mic).unwrap();
        assert_eq!(config.to_string(), "8000 Hz, bits: 8BIT, channel: Stereo");
    }

    #[test]
    fn json_round_trip_keeps_output_path() {
        let config = CaptureConfig::from_raw(22050, 2, 16, CaptureSource::VoiceRecognition)
            .unwrap()
            .with_output_path("/tmp/take.wav");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"voice_recognition\""));
        assert_eq!(CaptureConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn json_validation_runs_on_deserialize() {
        let err = CaptureConfig::from_json(r#"{ "sample_rate": 0, "channels": 1, "bit_depth": 16 }"#);
        assert!(matches!(err, Err(CaptureError::InvalidConfig(_))));

        let config =
            CaptureConfig::from_json(r#"{ "sample_rate": 16000, "channels": 1, "bit_depth": 8 }"#)
                .unwrap();
        assert_eq!(config.source(), CaptureSource::Default);
        assert_eq!(config.bit_depth(), BitDepth::Eight);
        assert!(config.output_path().is_none());
    }
}
