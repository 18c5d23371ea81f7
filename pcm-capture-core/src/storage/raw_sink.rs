use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::models::audio_models::SampleBuffer;
use crate::models::config::CaptureConfig;
use crate::models::error::CaptureError;
use crate::processing::wav_format::WAV_HEADER_SIZE;
use crate::traits::subscriber::Subscriber;

/// Append-only store for raw 16-bit PCM.
///
/// ## File Format
///
/// ```text
/// [44 reserved bytes, overwritten with the WAV header when sealed]
/// [raw 16-bit little-endian PCM data...]
/// ```
///
/// A sink without a target accepts and discards buffers, for sessions that
/// only stream.
pub struct RawSink {
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    payload_bytes: u64,
    finalized: bool,
}

impl RawSink {
    /// Create the store at `path`, creating parent directories as needed.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::StorageError(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(&path)
            .map_err(|e| CaptureError::StorageError(format!("failed to create {}: {}", path.display(), e)))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&[0u8; WAV_HEADER_SIZE])
            .map_err(|e| CaptureError::StorageError(format!("failed to reserve header: {}", e)))?;

        Ok(Self {
            path: Some(path),
            writer: Some(writer),
            payload_bytes: 0,
            finalized: false,
        })
    }

    /// A sink with no target; appends are no-ops.
    pub fn disabled() -> Self {
        Self {
            path: None,
            writer: None,
            payload_bytes: 0,
            finalized: false,
        }
    }

    /// File-backed when the config names an output path, disabled otherwise.
    pub fn for_config(config: &CaptureConfig) -> Result<Self, CaptureError> {
        match config.output_path() {
            Some(path) => Self::create(path),
            None => Ok(Self::disabled()),
        }
    }

    /// Append a buffer as little-endian 16-bit samples.
    pub fn append(&mut self, buffer: &SampleBuffer) -> Result<(), CaptureError> {
        if self.finalized {
            return Err(CaptureError::SinkWrite("raw sink already finalized".into()));
        }
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        writer
            .write_all(&buffer.to_le_bytes())
            .map_err(|e| CaptureError::SinkWrite(e.to_string()))?;
        self.payload_bytes += buffer.byte_len() as u64;
        Ok(())
    }

    /// Flush and close the store. Returns the payload length in bytes.
    pub fn finalize_write(&mut self) -> Result<u64, CaptureError> {
        if self.finalized {
            return Err(CaptureError::InvalidState("raw sink already finalized".into()));
        }
        self.finalized = true;

        if let Some(writer) = self.writer.take() {
            let file = writer
                .into_inner()
                .map_err(|e| CaptureError::StorageError(format!("flush failed: {}", e.error())))?;
            file.sync_all()
                .map_err(|e| CaptureError::StorageError(format!("sync failed: {}", e)))?;
        }
        Ok(self.payload_bytes)
    }

    /// Drop the store without finalizing it and delete its file.
    pub fn discard(mut self) -> Result<(), CaptureError> {
        self.writer.take();
        if let Some(path) = self.path.take() {
            fs::remove_file(&path)
                .map_err(|e| CaptureError::StorageError(format!("failed to remove {}: {}", path.display(), e)))?;
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Payload bytes appended so far (excluding the reserved header).
    pub fn payload_bytes(&self) -> u64 {
        self.payload_bytes
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Subscriber that appends every buffer to a [`RawSink`].
///
/// The sink is finalized when the stream completes; [`close`](Self::close)
/// returns that outcome (or finalizes now if the stream never completed).
pub struct RecordingSubscriber {
    sink: Mutex<RawSink>,
    closed: Mutex<Option<Result<u64, CaptureError>>>,
    errors: Mutex<Vec<CaptureError>>,
}

impl RecordingSubscriber {
    pub fn new(sink: RawSink) -> Self {
        Self {
            sink: Mutex::new(sink),
            closed: Mutex::new(None),
            errors: Mutex::new(Vec::new()),
        }
    }

    /// Finalize the sink once; later calls return the same outcome.
    pub fn close(&self) -> Result<u64, CaptureError> {
        let mut closed = self.closed.lock();
        if let Some(ref outcome) = *closed {
            return outcome.clone();
        }
        let outcome = self.sink.lock().finalize_write();
        *closed = Some(outcome.clone());
        outcome
    }

    /// Swap in a new target and hand back the previous one. Only meaningful
    /// before the stream starts.
    pub fn replace_sink(&self, sink: RawSink) -> RawSink {
        std::mem::replace(&mut *self.sink.lock(), sink)
    }

    /// Errors received through the stream, in arrival order.
    pub fn errors(&self) -> Vec<CaptureError> {
        self.errors.lock().clone()
    }

    pub fn payload_bytes(&self) -> u64 {
        self.sink.lock().payload_bytes()
    }
}

impl Subscriber for RecordingSubscriber {
    fn on_buffer(&self, buffer: &SampleBuffer) -> Result<(), CaptureError> {
        self.sink.lock().append(buffer)
    }

    fn on_error(&self, error: &CaptureError) {
        if error.is_recoverable() {
            log::warn!("Recording continues after error: {}", error);
        } else {
            log::error!("Recording stream failed: {}", error);
        }
        self.errors.lock().push(error.clone());
    }

    fn on_complete(&self) {
        if let Err(e) = self.close() {
            log::error!("Failed to finalize raw sink: {}", e);
        }
    }
}
