use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::models::audio_models::{CaptureDiagnostics, SampleBuffer};
use crate::models::error::{CaptureError, DeviceError};
use crate::models::state::DeviceState;
use crate::processing::publisher::BufferPublisher;
use crate::traits::capture_device::CaptureDevice;

/// Worker state machine: `NotStarted → Running ⇄ Paused → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    NotStarted,
    Running,
    Paused,
    Stopped,
}

/// Control state shared by the controlling thread and the worker.
struct Monitor<D> {
    state: LoopState,
    /// Control handle; taken by `stop()`. The worker reads through its own clone.
    device: Option<Arc<D>>,
    interrupt_pending: bool,
    /// Worker is waiting on the pause condition.
    parked: bool,
    diagnostics: CaptureDiagnostics,
}

struct Shared<D> {
    monitor: Mutex<Monitor<D>>,
    wake: Condvar,
}

/// Dedicated read → publish loop over one capture device.
///
/// The pause flag and the device's control handle live behind a single
/// monitor. The worker only holds it for state checks and while parked on the
/// pause condition (which releases it). Device reads and subscriber callbacks
/// run without it, so control calls never wait on I/O and `stop()` can end a
/// blocked read by stopping the device.
pub struct CaptureLoop<D: CaptureDevice> {
    shared: Arc<Shared<D>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl<D: CaptureDevice> CaptureLoop<D> {
    /// Launch the worker on a device that is already recording.
    ///
    /// Each cycle reads exactly `buffer_samples` samples before publishing.
    pub fn start(
        device: D,
        buffer_samples: usize,
        publisher: Arc<BufferPublisher>,
    ) -> Result<Self, CaptureError> {
        let device = Arc::new(device);
        let shared = Arc::new(Shared {
            monitor: Mutex::new(Monitor {
                state: LoopState::NotStarted,
                device: Some(Arc::clone(&device)),
                interrupt_pending: false,
                parked: false,
                diagnostics: CaptureDiagnostics::default(),
            }),
            wake: Condvar::new(),
        });

        shared.monitor.lock().state = LoopState::Running;

        let worker_shared = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name("pcm-capture".into())
            .spawn(move || run_worker(worker_shared, device, buffer_samples, publisher));

        match spawned {
            Ok(handle) => Ok(Self {
                shared,
                handle: Mutex::new(Some(handle)),
            }),
            Err(e) => {
                let device = {
                    let mut monitor = shared.monitor.lock();
                    monitor.state = LoopState::Stopped;
                    monitor.device.take()
                };
                if let Some(device) = device {
                    halt(&*device);
                    free(&*device);
                }
                Err(CaptureError::DeviceUnavailable(format!(
                    "failed to spawn capture thread: {}",
                    e
                )))
            }
        }
    }

    pub fn state(&self) -> LoopState {
        self.shared.monitor.lock().state
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        self.shared.monitor.lock().diagnostics
    }

    /// Whether a pause has taken effect: the in-flight buffer was delivered
    /// and the worker is waiting for `resume()`.
    pub fn is_parked(&self) -> bool {
        self.shared.monitor.lock().parked
    }

    /// Suspend the loop after the buffer currently in flight. Repeated calls
    /// are no-ops.
    pub fn pause(&self) -> Result<(), CaptureError> {
        let mut monitor = self.shared.monitor.lock();
        match monitor.state {
            LoopState::Running => {
                monitor.state = LoopState::Paused;
                monitor.diagnostics.pause_count += 1;
                log::debug!("Capture paused");
                Ok(())
            }
            LoopState::Paused => Ok(()),
            other => Err(CaptureError::InvalidState(format!(
                "cannot pause capture in {:?} state",
                other
            ))),
        }
    }

    pub fn resume(&self) -> Result<(), CaptureError> {
        let mut monitor = self.shared.monitor.lock();
        match monitor.state {
            LoopState::Paused => {
                monitor.state = LoopState::Running;
                self.shared.wake.notify_all();
                log::debug!("Capture resumed");
                Ok(())
            }
            LoopState::Running => Ok(()),
            other => Err(CaptureError::InvalidState(format!(
                "cannot resume capture in {:?} state",
                other
            ))),
        }
    }

    /// Wake a paused worker with an interruption.
    ///
    /// The worker reports [`CaptureError::Interrupted`] to the subscriber and
    /// goes back to waiting while the loop is still paused. Returns `false`
    /// when the loop is not paused, since there is no wait to interrupt.
    pub fn interrupt(&self) -> bool {
        let mut monitor = self.shared.monitor.lock();
        if monitor.state != LoopState::Paused {
            return false;
        }
        monitor.interrupt_pending = true;
        self.shared.wake.notify_all();
        true
    }

    /// Stop the loop and release the device.
    ///
    /// Idempotent. Stopping the device ends a read the worker is blocked in;
    /// whatever that read already returned is still delivered. The device is
    /// released once the worker has exited. When called from the worker
    /// thread itself (a subscriber callback), the worker is between reads and
    /// is left to exit on its own instead of being joined.
    pub fn stop(&self) {
        let device = {
            let mut monitor = self.shared.monitor.lock();
            monitor.state = LoopState::Stopped;
            monitor.interrupt_pending = false;
            self.shared.wake.notify_all();
            monitor.device.take()
        };

        if let Some(ref device) = device {
            halt(&**device);
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                log::debug!("Stop requested from the capture thread; not joining");
            } else if handle.join().is_err() {
                log::error!("Capture thread panicked");
            }
        }

        if let Some(ref device) = device {
            free(&**device);
        }
    }
}

impl<D: CaptureDevice> Drop for CaptureLoop<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn halt<D: CaptureDevice>(device: &D) {
    if device.state() == DeviceState::Capturing {
        device.stop();
    }
}

/// Free the device unless it never initialized.
fn free<D: CaptureDevice>(device: &D) {
    if device.state() != DeviceState::Uninitialized {
        device.release();
    }
}

/// Fill `buffer` from the device, accumulating partial reads.
///
/// Returns fewer samples than requested only when the device ran dry or was
/// stopped mid-read.
fn read_full<D: CaptureDevice>(device: &D, buffer: &mut [i16]) -> Result<usize, DeviceError> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = device.read(&mut buffer[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn run_worker<D: CaptureDevice>(
    shared: Arc<Shared<D>>,
    device: Arc<D>,
    buffer_samples: usize,
    publisher: Arc<BufferPublisher>,
) {
    log::debug!("Capture worker started ({} samples per buffer)", buffer_samples);
    let mut sequence = 0u64;

    loop {
        {
            let monitor = shared.monitor.lock();
            if monitor.state == LoopState::Stopped || monitor.device.is_none() {
                break;
            }
        }
        if device.state() != DeviceState::Capturing {
            log::info!("Capture device left the capturing state");
            break;
        }

        let mut samples = vec![0i16; buffer_samples];
        let filled = match read_full(device.as_ref(), &mut samples) {
            Ok(filled) => filled,
            Err(e) => {
                log::error!("Capture device read failed: {}", e);
                publisher.fail(e.into());
                return;
            }
        };
        if filled == 0 {
            break;
        }

        samples.truncate(filled);
        if let Err(e) = publisher.publish(SampleBuffer::new(sequence, samples)) {
            log::error!("Failed to publish buffer {}: {}", sequence, e);
            return;
        }
        sequence += 1;

        let mut monitor = shared.monitor.lock();
        monitor.diagnostics.buffers_published += 1;
        monitor.diagnostics.samples_published += filled as u64;

        if filled < buffer_samples {
            log::info!("Capture device returned a short buffer; ending capture");
            break;
        }

        wait_while_paused(&shared, &mut monitor, &publisher);
        if monitor.state == LoopState::Stopped {
            break;
        }
    }

    log::debug!("Capture worker exiting after {} buffers", sequence);
    publisher.complete();
}

fn wait_while_paused<D>(shared: &Shared<D>, monitor: &mut MutexGuard<'_, Monitor<D>>, publisher: &BufferPublisher) {
    while monitor.state == LoopState::Paused {
        if !monitor.interrupt_pending {
            monitor.parked = true;
            shared.wake.wait(monitor);
            monitor.parked = false;
            continue;
        }
        monitor.interrupt_pending = false;
        monitor.diagnostics.interruptions += 1;
        log::warn!("Paused capture interrupted");
        MutexGuard::unlocked(monitor, || {
            if let Err(e) = publisher.report(CaptureError::Interrupted) {
                log::warn!("Could not report interruption: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::mock::{CollectingSubscriber, MockBackend};
    use crate::models::config::{CaptureConfig, CaptureSource};
    use crate::traits::capture_device::CaptureBackend;

    const WAIT: Duration = Duration::from_secs(5);

    fn wait_until_parked<D: CaptureDevice>(capture: &CaptureLoop<D>) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if capture.is_parked() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    fn started_loop(
        backend: &MockBackend,
        buffer_samples: usize,
    ) -> (CaptureLoop<crate::mock::MockDevice>, Arc<CollectingSubscriber>) {
        let config = CaptureConfig::from_raw(16000, 1, 16, CaptureSource::Mic).unwrap();
        let device = backend.open(&config, buffer_samples * 10).unwrap();
        device.start_recording().unwrap();

        let publisher = Arc::new(BufferPublisher::new());
        let subscriber = Arc::new(CollectingSubscriber::new());
        publisher.subscribe(subscriber.clone()).unwrap();

        let capture = CaptureLoop::start(device, buffer_samples, publisher).unwrap();
        (capture, subscriber)
    }

    #[test]
    fn device_running_dry_completes_the_stream() {
        let backend = MockBackend::new().with_sample_limit(32);
        let (capture, subscriber) = started_loop(&backend, 8);

        assert!(subscriber.wait_for_signal(WAIT));
        assert_eq!(subscriber.completions(), 1);
        assert_eq!(subscriber.samples(), (0..32).collect::<Vec<i16>>());
        assert_eq!(capture.diagnostics().buffers_published, 4);

        capture.stop();
        assert_eq!(backend.counters().released(), 1);
    }

    #[test]
    fn partial_final_buffer_is_still_delivered() {
        let backend = MockBackend::new().with_sample_limit(10);
        let (capture, subscriber) = started_loop(&backend, 8);

        assert!(subscriber.wait_for_signal(WAIT));
        let lengths: Vec<usize> = subscriber.buffers().iter().map(|b| b.len()).collect();
        assert_eq!(lengths, vec![8, 2]);
        capture.stop();
    }

    #[test]
    fn read_failure_fails_the_stream_once() {
        let backend = MockBackend::new().with_read_failure_after(16);
        let (capture, subscriber) = started_loop(&backend, 8);

        assert!(subscriber.wait_for_signal(WAIT));
        assert_eq!(subscriber.buffers().len(), 2);
        assert_eq!(subscriber.completions(), 0);
        let errors = subscriber.errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], CaptureError::DeviceUnavailable(_)));
        capture.stop();
    }

    #[test]
    fn pause_twice_then_resume_keeps_stream_contiguous() {
        let backend = MockBackend::new().with_read_delay(Duration::from_millis(1));
        let (capture, subscriber) = started_loop(&backend, 16);

        assert!(subscriber.wait_for_buffers(2, WAIT));
        capture.pause().unwrap();
        capture.pause().unwrap();
        assert_eq!(capture.state(), LoopState::Paused);
        assert_eq!(capture.diagnostics().pause_count, 1);

        assert!(wait_until_parked(&capture));
        let parked = subscriber.buffers().len();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(subscriber.buffers().len(), parked);
        assert!(capture.is_parked());

        capture.resume().unwrap();
        assert!(subscriber.wait_for_buffers(parked + 2, WAIT));
        capture.stop();

        let samples = subscriber.samples();
        let expected: Vec<i16> = (0..samples.len()).map(|i| i as i16).collect();
        assert_eq!(samples, expected);
    }

    #[test]
    fn interrupt_reports_error_and_stays_paused() {
        let backend = MockBackend::new().with_read_delay(Duration::from_millis(1));
        let (capture, subscriber) = started_loop(&backend, 16);

        assert!(subscriber.wait_for_buffers(1, WAIT));
        capture.pause().unwrap();
        assert!(wait_until_parked(&capture));

        assert!(capture.interrupt());
        assert!(subscriber.wait_for_signal(WAIT));
        assert_eq!(subscriber.errors(), vec![CaptureError::Interrupted]);
        assert_eq!(capture.state(), LoopState::Paused);
        assert_eq!(subscriber.completions(), 0);

        capture.resume().unwrap();
        let seen = subscriber.buffers().len();
        assert!(subscriber.wait_for_buffers(seen + 1, WAIT));
        capture.stop();
        assert_eq!(capture.diagnostics().interruptions, 1);
    }

    #[test]
    fn interrupt_without_pause_is_ignored() {
        let backend = MockBackend::new().with_read_delay(Duration::from_millis(1));
        let (capture, subscriber) = started_loop(&backend, 16);
        assert!(!capture.interrupt());
        capture.stop();
        assert!(subscriber.errors().is_empty());
    }

    #[test]
    fn stop_wakes_a_paused_worker_and_is_idempotent() {
        let backend = MockBackend::new().with_read_delay(Duration::from_millis(1));
        let (capture, subscriber) = started_loop(&backend, 16);

        assert!(subscriber.wait_for_buffers(1, WAIT));
        capture.pause().unwrap();
        capture.stop();
        capture.stop();

        assert_eq!(capture.state(), LoopState::Stopped);
        assert_eq!(subscriber.completions(), 1);
        let counters = backend.counters();
        assert_eq!(counters.stopped(), 1);
        assert_eq!(counters.released(), 1);
        assert!(capture.pause().is_err());
        assert!(capture.resume().is_err());
    }

    #[test]
    fn stop_ends_a_stalled_read_and_delivers_what_it_got() {
        let backend = MockBackend::new().with_stall_at(20);
        let (capture, subscriber) = started_loop(&backend, 8);

        assert!(subscriber.wait_for_buffers(2, WAIT));
        // The worker is now blocked inside the third read; control calls
        // must not wait on it.
        std::thread::sleep(Duration::from_millis(20));
        let begun = Instant::now();
        assert_eq!(capture.state(), LoopState::Running);
        capture.stop();
        assert!(begun.elapsed() < Duration::from_secs(2));

        let lengths: Vec<usize> = subscriber.buffers().iter().map(|b| b.len()).collect();
        assert_eq!(lengths, vec![8, 8, 4]);
        assert_eq!(subscriber.samples(), (0..20).collect::<Vec<i16>>());
        assert_eq!(subscriber.completions(), 1);
        assert!(subscriber.errors().is_empty());

        let counters = backend.counters();
        assert_eq!(counters.stopped(), 1);
        assert_eq!(counters.released(), 1);
    }

    #[test]
    fn stop_from_another_thread_keeps_a_gap_free_prefix() {
        let backend = MockBackend::new().with_read_delay(Duration::from_millis(20));
        let (capture, subscriber) = started_loop(&backend, 16);
        let capture = Arc::new(capture);

        assert!(subscriber.wait_for_buffers(2, WAIT));
        let stopper = {
            let capture = Arc::clone(&capture);
            std::thread::spawn(move || capture.stop())
        };
        stopper.join().unwrap();

        assert_eq!(capture.state(), LoopState::Stopped);
        assert_eq!(subscriber.completions(), 1);
        assert!(subscriber.errors().is_empty());

        let samples = subscriber.samples();
        assert!(samples.len() >= 32);
        let expected: Vec<i16> = (0..samples.len()).map(|i| i as i16).collect();
        assert_eq!(samples, expected);
        assert_eq!(backend.counters().released(), 1);
    }
}
