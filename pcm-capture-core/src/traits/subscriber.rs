use crate::models::audio_models::SampleBuffer;
use crate::models::error::CaptureError;

/// Downstream consumer of captured buffers.
///
/// Reactive-stream contract: zero or more `on_buffer`, then at most one
/// terminal `on_complete` or fatal `on_error`. Recoverable errors
/// ([`CaptureError::is_recoverable`]) may arrive through `on_error` while the
/// stream keeps flowing.
///
/// All methods are called from the capture worker thread. `on_buffer` holds up
/// the next device read until it returns, so keep it short.
pub trait Subscriber: Send + Sync {
    /// Handle one buffer. Returning an error reports it back to this
    /// subscriber's `on_error` as a recoverable error; the stream continues.
    fn on_buffer(&self, buffer: &SampleBuffer) -> Result<(), CaptureError>;

    fn on_error(&self, error: &CaptureError);

    fn on_complete(&self);
}
