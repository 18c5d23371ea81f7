//! # pcm-capture-core
//!
//! Streaming PCM capture from a pull-based recording device.
//!
//! A dedicated worker reads fixed-size buffers of 16-bit samples from a
//! [`CaptureDevice`] and hands them, in order, to a single [`Subscriber`].
//! The bundled [`Recorder`] subscribes a raw sink that appends samples after
//! a reserved 44-byte header and seals the file as a canonical WAV once the
//! stream ends.
//!
//! ## Architecture
//!
//! ```text
//! pcm-capture-core (this crate)
//! ├── traits/       ← CaptureBackend, CaptureDevice, Subscriber
//! ├── models/       ← CaptureConfig, CaptureError, CaptureState, SampleBuffer, RecordingResult
//! ├── processing/   ← BufferPublisher, WAV header, format probing
//! ├── session/      ← CaptureLoop (worker), CaptureSession, Recorder
//! ├── storage/      ← RawSink, finalizer, metadata sidecar
//! └── mock          ← in-memory backend and collecting subscriber
//! ```

pub mod mock;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{CaptureDiagnostics, SampleBuffer};
pub use models::config::{BitDepth, CaptureConfig, CaptureSource, ChannelLayout};
pub use models::error::{CaptureError, DeviceError};
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use models::state::{CaptureState, DeviceState};
pub use processing::probe::{probe, probe_defaults};
pub use processing::publisher::BufferPublisher;
pub use processing::wav_format::{ContainerHeader, WAV_HEADER_SIZE};
pub use session::capture_loop::{CaptureLoop, LoopState};
pub use session::recorder::{CaptureSession, Recorder};
pub use storage::raw_sink::{RawSink, RecordingSubscriber};
pub use traits::capture_device::{CaptureBackend, CaptureDevice};
pub use traits::subscriber::Subscriber;
