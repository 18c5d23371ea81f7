use thiserror::Error;

/// Errors reported by a capture device implementation.
///
/// These mirror the failure codes of a typical platform recorder API and are
/// folded into [`CaptureError::DeviceUnavailable`] once they reach the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("invalid device parameters: {0}")]
    InvalidParameters(String),

    #[error("device initialization failed: {0}")]
    InitializationFailed(String),

    #[error("device reported an invalid buffer size")]
    InvalidValue,

    #[error("device read failed: {0}")]
    ReadFailed(String),
}

/// Errors that can occur during capture, publishing, or finalization.
///
/// Propagation:
/// - `DeviceUnavailable`, `InvalidConfig`, `InvalidState` and the subscription
///   misuse variants are returned synchronously to the caller.
/// - `Interrupted` and `SinkWrite` are recoverable and travel through the
///   subscriber's error channel without ending the stream.
/// - `FinalizeError` is fatal for the recording; the raw capture is left
///   on disk unsealed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("a subscriber is already attached")]
    AlreadySubscribed,

    #[error("no subscriber attached")]
    NotSubscribed,

    #[error("stream already terminated")]
    StreamTerminated,

    #[error("capture interrupted while paused")]
    Interrupted,

    #[error("sink write failed: {0}")]
    SinkWrite(String),

    #[error("finalize failed: {0}")]
    FinalizeError(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("no supported capture configuration found")]
    NoSupportedConfig,
}

impl CaptureError {
    /// Whether the stream keeps flowing after this error is reported.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Interrupted | Self::SinkWrite(_))
    }
}

impl From<DeviceError> for CaptureError {
    fn from(err: DeviceError) -> Self {
        Self::DeviceUnavailable(err.to_string())
    }
}
