use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::SampleBuffer;
use crate::models::error::CaptureError;
use crate::traits::subscriber::Subscriber;

struct PublisherState {
    subscriber: Option<Arc<dyn Subscriber>>,
    terminated: bool,
    delivered: u64,
}

/// Single-producer, single-subscriber handoff between the capture worker and
/// its consumer.
///
/// Delivery is synchronous: `publish` returns only after the subscriber's
/// `on_buffer` has run, which throttles the device read loop to the speed of
/// the consumer. The internal lock is never held while a subscriber callback
/// runs, so callbacks may safely call back into the session.
pub struct BufferPublisher {
    inner: Mutex<PublisherState>,
}

impl BufferPublisher {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PublisherState {
                subscriber: None,
                terminated: false,
                delivered: 0,
            }),
        }
    }

    /// Attach the one subscriber. A second subscription is rejected.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock();
        if inner.terminated {
            return Err(CaptureError::StreamTerminated);
        }
        if inner.subscriber.is_some() {
            return Err(CaptureError::AlreadySubscribed);
        }
        inner.subscriber = Some(subscriber);
        Ok(())
    }

    pub fn has_subscriber(&self) -> bool {
        self.inner.lock().subscriber.is_some()
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.lock().terminated
    }

    /// Number of buffers handed to the subscriber so far.
    pub fn delivered(&self) -> u64 {
        self.inner.lock().delivered
    }

    /// Deliver one buffer.
    ///
    /// Fails fast when nobody is subscribed or the stream has ended, so that a
    /// misconfigured pipeline never drops audio silently. An error returned by
    /// the subscriber's `on_buffer` is routed to its `on_error` and the buffer
    /// still counts as delivered.
    pub fn publish(&self, buffer: SampleBuffer) -> Result<(), CaptureError> {
        let subscriber = {
            let mut inner = self.inner.lock();
            if inner.terminated {
                return Err(CaptureError::StreamTerminated);
            }
            let subscriber = inner.subscriber.clone().ok_or(CaptureError::NotSubscribed)?;
            inner.delivered += 1;
            subscriber
        };

        if let Err(e) = subscriber.on_buffer(&buffer) {
            log::warn!("Subscriber failed to handle buffer {}: {}", buffer.sequence(), e);
            subscriber.on_error(&e);
        }
        Ok(())
    }

    /// Deliver a recoverable error without ending the stream.
    pub fn report(&self, error: CaptureError) -> Result<(), CaptureError> {
        let subscriber = {
            let inner = self.inner.lock();
            if inner.terminated {
                return Err(CaptureError::StreamTerminated);
            }
            inner.subscriber.clone().ok_or(CaptureError::NotSubscribed)?
        };
        subscriber.on_error(&error);
        Ok(())
    }

    /// Signal normal end of stream. Returns `false` if the stream had already
    /// terminated.
    pub fn complete(&self) -> bool {
        match self.terminate() {
            Some(Some(subscriber)) => {
                subscriber.on_complete();
                true
            }
            Some(None) => true,
            None => {
                log::debug!("Ignoring completion of an already terminated stream");
                false
            }
        }
    }

    /// Signal a fatal error. Returns `false` if the stream had already
    /// terminated, in which case the error is only logged.
    pub fn fail(&self, error: CaptureError) -> bool {
        match self.terminate() {
            Some(Some(subscriber)) => {
                subscriber.on_error(&error);
                true
            }
            Some(None) => {
                log::error!("Capture failed with no subscriber attached: {}", error);
                true
            }
            None => {
                log::warn!("Dropping error after stream termination: {}", error);
                false
            }
        }
    }

    /// Mark the stream terminated; `None` if it already was.
    fn terminate(&self) -> Option<Option<Arc<dyn Subscriber>>> {
        let mut inner = self.inner.lock();
        if inner.terminated {
            return None;
        }
        inner.terminated = true;
        Some(inner.subscriber.clone())
    }
}

impl Default for BufferPublisher {
    fn default() -> Self {
        Self::new()
    }
}
