//! Best-effort capability negotiation.
//!
//! Walks candidate formats until the backend accepts one, before any session
//! exists. Independent of the capture loop.

use crate::models::config::{BitDepth, CaptureConfig, CaptureSource, ChannelLayout};
use crate::models::error::CaptureError;
use crate::models::state::DeviceState;
use crate::traits::capture_device::{CaptureBackend, CaptureDevice};

pub const DEFAULT_PROBE_RATES: [u32; 4] = [8000, 11025, 22050, 44100];
pub const DEFAULT_PROBE_DEPTHS: [BitDepth; 2] = [BitDepth::Eight, BitDepth::Sixteen];
pub const DEFAULT_PROBE_LAYOUTS: [ChannelLayout; 2] = [ChannelLayout::Mono, ChannelLayout::Stereo];

/// Return the first candidate the backend can open.
///
/// Order: rates outermost, then bit depths, then channel layouts. A candidate
/// is accepted when the backend reports a buffer size for it and a trial
/// device initializes; the trial device is released either way.
pub fn probe<B: CaptureBackend>(
    backend: &B,
    rates: &[u32],
    depths: &[BitDepth],
    layouts: &[ChannelLayout],
    source: CaptureSource,
) -> Result<CaptureConfig, CaptureError> {
    for &rate in rates {
        for &depth in depths {
            for &layout in layouts {
                log::debug!(
                    "Probing {} Hz, bits: {}, channels: {}",
                    rate,
                    depth.bits(),
                    layout.count()
                );
                let config = match CaptureConfig::new(rate, layout, depth, source) {
                    Ok(config) => config,
                    Err(e) => {
                        log::debug!("Skipping candidate: {}", e);
                        continue;
                    }
                };
                if accepts(backend, &config) {
                    log::info!("Probe selected {}", config);
                    return Ok(config);
                }
            }
        }
    }
    Err(CaptureError::NoSupportedConfig)
}

/// [`probe`] over the default candidate lists.
pub fn probe_defaults<B: CaptureBackend>(backend: &B, source: CaptureSource) -> Result<CaptureConfig, CaptureError> {
    probe(
        backend,
        &DEFAULT_PROBE_RATES,
        &DEFAULT_PROBE_DEPTHS,
        &DEFAULT_PROBE_LAYOUTS,
        source,
    )
}

fn accepts<B: CaptureBackend>(backend: &B, config: &CaptureConfig) -> bool {
    let buffer_samples = match backend.min_buffer_size(config.sample_rate(), config.channels(), config.bit_depth()) {
        Ok(0) => return false,
        Ok(size) => size,
        Err(e) => {
            log::debug!("No buffer size for {}: {}", config, e);
            return false;
        }
    };

    match backend.open(config, buffer_samples) {
        Ok(device) => {
            let initialized = device.state() == DeviceState::Initialized;
            if device.state() != DeviceState::Uninitialized {
                device.release();
            }
            initialized
        }
        Err(e) => {
            log::debug!("Trial open failed for {}: {}", config, e);
            false
        }
    }
}
