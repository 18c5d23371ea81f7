use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::CaptureDiagnostics;
use crate::models::config::CaptureConfig;
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::{CaptureState, DeviceState};
use crate::processing::publisher::BufferPublisher;
use crate::session::capture_loop::{CaptureLoop, LoopState};
use crate::storage::finalizer;
use crate::storage::raw_sink::{RawSink, RecordingSubscriber};
use crate::traits::capture_device::{CaptureBackend, CaptureDevice};
use crate::traits::subscriber::Subscriber;

/// The device is asked for this many times its minimum buffer, to absorb
/// scheduling jitter without overruns.
pub const DEVICE_BUFFER_MULTIPLIER: usize = 10;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Capturing,
    Stopped,
}

struct SessionInner<D: CaptureDevice> {
    lifecycle: Lifecycle,
    capture: Option<Arc<CaptureLoop<D>>>,
    buffer_samples: usize,
}

/// One capture session: `Idle → Capturing → Stopped`.
///
/// All methods take `&self`, so a session can be shared with the subscriber
/// (for example to stop after a fixed number of buffers). Control calls never
/// hold the session lock while waiting on the capture worker.
pub struct CaptureSession<B: CaptureBackend> {
    backend: B,
    config: CaptureConfig,
    publisher: Arc<BufferPublisher>,
    inner: Mutex<SessionInner<B::Device>>,
}

impl<B: CaptureBackend> CaptureSession<B> {
    pub fn new(backend: B, config: CaptureConfig) -> Self {
        Self {
            backend,
            config,
            publisher: Arc::new(BufferPublisher::new()),
            inner: Mutex::new(SessionInner {
                lifecycle: Lifecycle::Idle,
                capture: None,
                buffer_samples: 0,
            }),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn state(&self) -> CaptureState {
        let (lifecycle, capture) = {
            let inner = self.inner.lock();
            (inner.lifecycle, inner.capture.clone())
        };
        match lifecycle {
            Lifecycle::Idle => CaptureState::Idle,
            Lifecycle::Stopped => CaptureState::Stopped,
            Lifecycle::Capturing => CaptureState::Capturing {
                paused: capture.is_some_and(|c| c.state() == LoopState::Paused),
            },
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state().is_capturing()
    }

    /// Samples per published buffer; 0 before the session starts.
    pub fn buffer_samples(&self) -> usize {
        self.inner.lock().buffer_samples
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        let capture = self.inner.lock().capture.clone();
        capture.map(|c| c.diagnostics()).unwrap_or_default()
    }

    /// Whether a requested pause has taken effect; see [`CaptureLoop::is_parked`].
    pub fn is_parked(&self) -> bool {
        let capture = self.inner.lock().capture.clone();
        capture.is_some_and(|c| c.is_parked())
    }

    /// Attach the single subscriber. Must happen before [`start`](Self::start).
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> Result<(), CaptureError> {
        self.publisher.subscribe(subscriber)
    }

    /// Open the device and launch the capture worker.
    ///
    /// Device failures surface here as [`CaptureError::DeviceUnavailable`]
    /// and no worker is launched. Starting twice is an `InvalidState` error.
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock();
        match inner.lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Capturing => {
                return Err(CaptureError::InvalidState("session is already capturing".into()))
            }
            Lifecycle::Stopped => {
                return Err(CaptureError::InvalidState("session has been stopped".into()))
            }
        }
        if !self.publisher.has_subscriber() {
            return Err(CaptureError::NotSubscribed);
        }

        let config = &self.config;
        let buffer_samples = self
            .backend
            .min_buffer_size(config.sample_rate(), config.channels(), config.bit_depth())
            .map_err(|e| CaptureError::DeviceUnavailable(format!("unable to get minimum buffer size: {}", e)))?;
        if buffer_samples == 0 {
            return Err(CaptureError::DeviceUnavailable(
                "device reported an empty minimum buffer".into(),
            ));
        }

        let device_buffer = buffer_samples.checked_mul(DEVICE_BUFFER_MULTIPLIER).ok_or_else(|| {
            CaptureError::DeviceUnavailable(format!("minimum buffer of {} samples is too large", buffer_samples))
        })?;
        let device = self
            .backend
            .open(config, device_buffer)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("unable to open capture device: {}", e)))?;

        if device.state() != DeviceState::Initialized {
            let state = device.state();
            if state != DeviceState::Uninitialized {
                device.release();
            }
            return Err(CaptureError::DeviceUnavailable(format!(
                "capture device not initialized ({:?})",
                state
            )));
        }

        if let Err(e) = device.start_recording() {
            device.release();
            return Err(CaptureError::DeviceUnavailable(format!("unable to start recording: {}", e)));
        }

        let capture = CaptureLoop::start(device, buffer_samples, Arc::clone(&self.publisher))?;
        inner.capture = Some(Arc::new(capture));
        inner.buffer_samples = buffer_samples;
        inner.lifecycle = Lifecycle::Capturing;
        log::info!("Capture started: {} ({} samples per buffer)", config, buffer_samples);
        Ok(())
    }

    pub fn pause(&self) -> Result<(), CaptureError> {
        self.active_capture()?.pause()
    }

    pub fn resume(&self) -> Result<(), CaptureError> {
        self.active_capture()?.resume()
    }

    /// Interrupt a paused capture; see [`CaptureLoop::interrupt`].
    pub fn interrupt(&self) -> Result<bool, CaptureError> {
        Ok(self.active_capture()?.interrupt())
    }

    /// Stop capturing and release the device.
    ///
    /// Idempotent, and a no-op on a session that never started. The stream is
    /// completed once the worker exits.
    pub fn stop(&self) {
        let capture = {
            let mut inner = self.inner.lock();
            if inner.lifecycle != Lifecycle::Capturing {
                return;
            }
            inner.lifecycle = Lifecycle::Stopped;
            inner.capture.clone()
        };

        if let Some(capture) = capture {
            capture.stop();
        }
        log::info!("Capture stopped");
    }

    fn active_capture(&self) -> Result<Arc<CaptureLoop<B::Device>>, CaptureError> {
        let inner = self.inner.lock();
        match (inner.lifecycle, inner.capture.as_ref()) {
            (Lifecycle::Capturing, Some(capture)) => Ok(Arc::clone(capture)),
            _ => Err(CaptureError::InvalidState("no capture in progress".into())),
        }
    }
}

impl<B: CaptureBackend> Drop for CaptureSession<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A capture session wired to a raw sink, producing a sealed WAV on finish.
///
/// ```
/// use pcm_capture_core::mock::MockBackend;
/// use pcm_capture_core::{CaptureConfig, CaptureSource, Recorder};
///
/// let dir = tempfile::tempdir().unwrap();
/// let config = CaptureConfig::from_raw(44100, 1, 16, CaptureSource::Mic)
///     .unwrap()
///     .with_output_path(dir.path().join("take.wav"));
///
/// let recorder = Recorder::new(MockBackend::new().with_sample_limit(2048), config).unwrap();
/// recorder.start().unwrap();
/// let result = recorder.finish().unwrap().expect("file-backed recording");
/// assert!(result.payload_bytes <= 4096);
/// ```
pub struct Recorder<B: CaptureBackend> {
    session: CaptureSession<B>,
    sink: Arc<RecordingSubscriber>,
    /// Set by `finish`; the lock also serializes `start` against it.
    finished: Mutex<bool>,
}

impl<B: CaptureBackend> Recorder<B> {
    /// Subscribe a recording sink to a new session. Nothing touches the disk
    /// until [`start`](Self::start).
    pub fn new(backend: B, config: CaptureConfig) -> Result<Self, CaptureError> {
        let sink = Arc::new(RecordingSubscriber::new(RawSink::disabled()));
        let session = CaptureSession::new(backend, config);
        session.subscribe(sink.clone())?;
        Ok(Self {
            session,
            sink,
            finished: Mutex::new(false),
        })
    }

    pub fn session(&self) -> &CaptureSession<B> {
        &self.session
    }

    pub fn state(&self) -> CaptureState {
        self.session.state()
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_recording()
    }

    /// Create the raw store (if the config has an output path) and start
    /// capturing into it.
    ///
    /// If the session fails to start, the store is removed again so a failed
    /// start leaves nothing on disk.
    pub fn start(&self) -> Result<(), CaptureError> {
        let finished = self.finished.lock();
        if *finished || !self.session.state().is_idle() {
            return self.session.start();
        }

        self.sink.replace_sink(RawSink::for_config(self.session.config())?);
        if let Err(e) = self.session.start() {
            if let Err(cleanup) = self.sink.replace_sink(RawSink::disabled()).discard() {
                log::warn!("Failed to remove raw store after aborted start: {}", cleanup);
            }
            return Err(e);
        }
        Ok(())
    }

    pub fn pause(&self) -> Result<(), CaptureError> {
        self.session.pause()
    }

    pub fn resume(&self) -> Result<(), CaptureError> {
        self.session.resume()
    }

    pub fn stop(&self) {
        self.session.stop()
    }

    /// Errors the stream reported while recording.
    pub fn errors(&self) -> Vec<CaptureError> {
        self.sink.errors()
    }

    /// Stop, close the raw store and seal it.
    ///
    /// Returns `None` for in-memory sessions. Can be called once.
    pub fn finish(&self) -> Result<Option<RecordingResult>, CaptureError> {
        {
            let mut finished = self.finished.lock();
            if *finished {
                return Err(CaptureError::InvalidState("recording already finished".into()));
            }
            if self.session.state().is_idle() {
                return Err(CaptureError::InvalidState("recording never started".into()));
            }
            *finished = true;
        }

        self.session.stop();
        let payload_bytes = self.sink.close()?;

        let Some(path) = self.session.config().output_path() else {
            return Ok(None);
        };
        let result = finalizer::seal_file(path, self.session.config())?;
        if result.payload_bytes != payload_bytes {
            log::warn!(
                "Sealed payload ({} bytes) differs from bytes appended ({})",
                result.payload_bytes,
                payload_bytes
            );
        }
        Ok(Some(result))
    }
}
