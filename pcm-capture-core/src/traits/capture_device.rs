use crate::models::config::{BitDepth, CaptureConfig, ChannelLayout};
use crate::models::error::DeviceError;
use crate::models::state::DeviceState;

/// Factory side of a platform capture API.
///
/// Implemented by platform backends and by [`MockBackend`](crate::mock::MockBackend).
/// The session only drives this interface; it never talks to hardware itself.
pub trait CaptureBackend: Send + Sync {
    type Device: CaptureDevice;

    /// Smallest buffer, in samples, the device can fill for this format.
    ///
    /// Fails with [`DeviceError::InvalidValue`] when the format is not supported.
    fn min_buffer_size(
        &self,
        sample_rate: u32,
        channels: ChannelLayout,
        bit_depth: BitDepth,
    ) -> Result<usize, DeviceError>;

    /// Open a device for `config` with an internal buffer of `buffer_samples`.
    ///
    /// A returned device should report [`DeviceState::Initialized`]; anything
    /// else is treated as a failed initialization by the caller.
    fn open(&self, config: &CaptureConfig, buffer_samples: usize) -> Result<Self::Device, DeviceError>;
}

/// An opened capture device yielding interleaved 16-bit PCM.
///
/// Shared between the capture worker, which blocks in [`read`](Self::read),
/// and the controlling thread, which may call [`stop`](Self::stop) at any
/// time. `stop` must make an in-flight `read` return promptly.
/// [`release`](Self::release) is only called once no read is in flight.
pub trait CaptureDevice: Send + Sync + 'static {
    fn state(&self) -> DeviceState;

    /// Transition `Initialized → Capturing`.
    fn start_recording(&self) -> Result<(), DeviceError>;

    /// Block until samples are available and copy up to `buffer.len()` of them.
    ///
    /// Returns the number of samples written. `Ok(0)` means the device had
    /// nothing more to give (typically because it stopped).
    fn read(&self, buffer: &mut [i16]) -> Result<usize, DeviceError>;

    /// Transition `Capturing → Stopped`, waking a blocked `read`.
    fn stop(&self);

    /// Free the underlying device. No calls are made after this.
    fn release(&self);
}
