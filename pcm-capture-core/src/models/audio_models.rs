use std::sync::Arc;

/// One block of interleaved signed 16-bit samples read from the device.
///
/// Immutable once built; clones share the same sample storage, so handing a
/// buffer to the subscriber never copies audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBuffer {
    sequence: u64,
    samples: Arc<[i16]>,
}

impl SampleBuffer {
    pub fn new(sequence: u64, samples: impl Into<Arc<[i16]>>) -> Self {
        Self {
            sequence,
            samples: samples.into(),
        }
    }

    /// Position of this buffer in the stream, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Size of the buffer once serialized as 16-bit PCM.
    pub fn byte_len(&self) -> usize {
        self.samples.len() * 2
    }

    /// Serialize as little-endian 16-bit PCM (low byte first).
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.byte_len());
        for &sample in self.samples.iter() {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        data
    }
}

/// Counters kept by the capture worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureDiagnostics {
    pub buffers_published: u64,
    pub samples_published: u64,
    pub pause_count: u64,
    pub interruptions: u64,
}
