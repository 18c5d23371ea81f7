//! In-process capture backend for tests and CI.
//!
//! [`MockBackend`] opens [`MockDevice`]s that produce a deterministic ramp of
//! samples (`0, 1, 2, …` wrapping at `i16`), so a consumer can check that the
//! stream it received is gap-free and in order. Failures at each step of the
//! device interface can be scripted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::audio_models::SampleBuffer;
use crate::models::config::{BitDepth, CaptureConfig, ChannelLayout};
use crate::models::error::{CaptureError, DeviceError};
use crate::models::state::DeviceState;
use crate::traits::capture_device::{CaptureBackend, CaptureDevice};
use crate::traits::subscriber::Subscriber;

/// Calls observed across all devices opened by one backend.
#[derive(Debug, Default)]
pub struct DeviceCounters {
    pub opened: AtomicUsize,
    pub started: AtomicUsize,
    pub stopped: AtomicUsize,
    pub released: AtomicUsize,
    /// Internal buffer size requested by the last `open`.
    pub requested_buffer: AtomicUsize,
}

impl DeviceCounters {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn requested_buffer(&self) -> usize {
        self.requested_buffer.load(Ordering::SeqCst)
    }
}

/// Scriptable stand-in for a platform capture API.
#[derive(Clone)]
pub struct MockBackend {
    min_buffer: Result<usize, DeviceError>,
    open_error: Option<DeviceError>,
    open_uninitialized: bool,
    supported: Option<Vec<(u32, ChannelLayout, BitDepth)>>,
    sample_limit: Option<u64>,
    read_delay: Option<Duration>,
    fail_after: Option<u64>,
    stall_at: Option<u64>,
    counters: Arc<DeviceCounters>,
}

impl MockBackend {
    /// Backend whose devices report a 1024-sample minimum buffer and never
    /// run dry.
    pub fn new() -> Self {
        Self {
            min_buffer: Ok(1024),
            open_error: None,
            open_uninitialized: false,
            supported: None,
            sample_limit: None,
            read_delay: None,
            fail_after: None,
            stall_at: None,
            counters: Arc::new(DeviceCounters::default()),
        }
    }

    pub fn with_min_buffer_size(mut self, samples: usize) -> Self {
        self.min_buffer = Ok(samples);
        self
    }

    pub fn with_min_buffer_error(mut self, error: DeviceError) -> Self {
        self.min_buffer = Err(error);
        self
    }

    pub fn with_open_error(mut self, error: DeviceError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// Devices open but stay `Uninitialized`.
    pub fn uninitialized_on_open(mut self) -> Self {
        self.open_uninitialized = true;
        self
    }

    /// Only these formats get a buffer size; everything else is `InvalidValue`.
    pub fn with_supported_formats(mut self, formats: Vec<(u32, ChannelLayout, BitDepth)>) -> Self {
        self.supported = Some(formats);
        self
    }

    /// Devices stop on their own after producing `samples` samples.
    pub fn with_sample_limit(mut self, samples: u64) -> Self {
        self.sample_limit = Some(samples);
        self
    }

    /// Each read blocks this long before returning data.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Reads fail once `samples` samples have been produced.
    pub fn with_read_failure_after(mut self, samples: u64) -> Self {
        self.fail_after = Some(samples);
        self
    }

    /// After `samples` samples, reads block until the device is stopped.
    pub fn with_stall_at(mut self, samples: u64) -> Self {
        self.stall_at = Some(samples);
        self
    }

    pub fn counters(&self) -> Arc<DeviceCounters> {
        Arc::clone(&self.counters)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for MockBackend {
    type Device = MockDevice;

    fn min_buffer_size(
        &self,
        sample_rate: u32,
        channels: ChannelLayout,
        bit_depth: BitDepth,
    ) -> Result<usize, DeviceError> {
        if let Some(ref formats) = self.supported {
            if !formats.contains(&(sample_rate, channels, bit_depth)) {
                return Err(DeviceError::InvalidValue);
            }
        }
        self.min_buffer.clone()
    }

    fn open(&self, _config: &CaptureConfig, buffer_samples: usize) -> Result<MockDevice, DeviceError> {
        if let Some(ref error) = self.open_error {
            return Err(error.clone());
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.counters
            .requested_buffer
            .store(buffer_samples, Ordering::SeqCst);

        let state = if self.open_uninitialized {
            DeviceState::Uninitialized
        } else {
            DeviceState::Initialized
        };

        Ok(MockDevice {
            inner: Mutex::new(MockDeviceState { state, produced: 0 }),
            changed: Condvar::new(),
            sample_limit: self.sample_limit,
            read_delay: self.read_delay,
            fail_after: self.fail_after,
            stall_at: self.stall_at,
            counters: Arc::clone(&self.counters),
        })
    }
}

struct MockDeviceState {
    state: DeviceState,
    produced: u64,
}

/// Device opened by [`MockBackend`].
pub struct MockDevice {
    inner: Mutex<MockDeviceState>,
    changed: Condvar,
    sample_limit: Option<u64>,
    read_delay: Option<Duration>,
    fail_after: Option<u64>,
    stall_at: Option<u64>,
    counters: Arc<DeviceCounters>,
}

impl CaptureDevice for MockDevice {
    fn state(&self) -> DeviceState {
        self.inner.lock().state
    }

    fn start_recording(&self) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock();
        if inner.state != DeviceState::Initialized {
            return Err(DeviceError::InitializationFailed(format!(
                "cannot start from {:?}",
                inner.state
            )));
        }
        inner.state = DeviceState::Capturing;
        self.counters.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self, buffer: &mut [i16]) -> Result<usize, DeviceError> {
        let mut inner = self.inner.lock();

        // Condvar waits release the lock, so stop() cuts delays and stalls short.
        if let Some(delay) = self.read_delay {
            let deadline = Instant::now() + delay;
            while inner.state == DeviceState::Capturing {
                if self.changed.wait_until(&mut inner, deadline).timed_out() {
                    break;
                }
            }
        }
        if self.stall_at.is_some_and(|at| inner.produced >= at) {
            while inner.state == DeviceState::Capturing {
                self.changed.wait(&mut inner);
            }
        }

        if inner.state != DeviceState::Capturing {
            return Ok(0);
        }
        if let Some(limit) = self.fail_after {
            if inner.produced >= limit {
                return Err(DeviceError::ReadFailed("mock device unplugged".into()));
            }
        }

        let mut count = buffer.len() as u64;
        if let Some(limit) = self.sample_limit {
            count = count.min(limit.saturating_sub(inner.produced));
        }
        if let Some(at) = self.stall_at {
            count = count.min(at.saturating_sub(inner.produced));
        }

        for slot in buffer.iter_mut().take(count as usize) {
            *slot = inner.produced as i16;
            inner.produced += 1;
        }

        if self.sample_limit.is_some_and(|limit| inner.produced >= limit) {
            inner.state = DeviceState::Stopped;
        }
        Ok(count as usize)
    }

    fn stop(&self) {
        let mut inner = self.inner.lock();
        if inner.state == DeviceState::Capturing {
            inner.state = DeviceState::Stopped;
        }
        self.counters.stopped.fetch_add(1, Ordering::SeqCst);
        self.changed.notify_all();
    }

    fn release(&self) {
        self.inner.lock().state = DeviceState::Uninitialized;
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        self.changed.notify_all();
    }
}

#[derive(Default)]
struct Collected {
    buffers: Vec<SampleBuffer>,
    errors: Vec<CaptureError>,
    completions: usize,
}

/// Subscriber that records everything it receives.
#[derive(Default)]
pub struct CollectingSubscriber {
    collected: Mutex<Collected>,
    changed: Condvar,
}

impl CollectingSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffers(&self) -> Vec<SampleBuffer> {
        self.collected.lock().buffers.clone()
    }

    /// All received samples, concatenated in delivery order.
    pub fn samples(&self) -> Vec<i16> {
        self.collected
            .lock()
            .buffers
            .iter()
            .flat_map(|b| b.samples().iter().copied())
            .collect()
    }

    pub fn errors(&self) -> Vec<CaptureError> {
        self.collected.lock().errors.clone()
    }

    pub fn completions(&self) -> usize {
        self.collected.lock().completions
    }

    /// Block until at least `count` buffers arrived or `timeout` elapsed.
    pub fn wait_for_buffers(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |c| c.buffers.len() >= count)
    }

    /// Block until a terminal signal or an error arrived.
    pub fn wait_for_signal(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |c| c.completions > 0 || !c.errors.is_empty())
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&Collected) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut collected = self.collected.lock();
        while !done(&collected) {
            if self.changed.wait_until(&mut collected, deadline).timed_out() {
                return done(&collected);
            }
        }
        true
    }
}

impl Subscriber for CollectingSubscriber {
    fn on_buffer(&self, buffer: &SampleBuffer) -> Result<(), CaptureError> {
        self.collected.lock().buffers.push(buffer.clone());
        self.changed.notify_all();
        Ok(())
    }

    fn on_error(&self, error: &CaptureError) {
        self.collected.lock().errors.push(error.clone());
        self.changed.notify_all();
    }

    fn on_complete(&self) {
        self.collected.lock().completions += 1;
        self.changed.notify_all();
    }
}
