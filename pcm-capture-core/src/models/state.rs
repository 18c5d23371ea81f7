/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → capturing { paused: false } ⇄ capturing { paused: true }
///                        ↓
///                     stopped
/// ```
/// Pausing never leaves `Capturing`: the device stays open while paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing { paused: bool },
    Stopped,
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Capturing { paused: true })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// State reported by a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Uninitialized,
    Initialized,
    Capturing,
    Stopped,
}
