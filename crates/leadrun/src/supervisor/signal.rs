use std::sync::atomic::{AtomicU8, Ordering};

/// Why a run was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Pause,
    Cancel,
    Timeout,
}

const NONE: u8 = 0;
const PAUSE: u8 = 1;
const CANCEL: u8 = 2;
const TIMEOUT: u8 = 3;

/// Cooperative stop request shared between the supervisor and a run.
///
/// The run polls it before each item. Cancellation overrides any earlier
/// request; otherwise the first request wins.
#[derive(Debug, Default)]
pub struct StopSignal {
    state: AtomicU8,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a stop request. Returns `false` if an earlier request
    /// already decided the outcome.
    pub fn request(&self, reason: StopReason) -> bool {
        let value = match reason {
            StopReason::Pause => PAUSE,
            StopReason::Cancel => CANCEL,
            StopReason::Timeout => TIMEOUT,
        };
        if reason == StopReason::Cancel {
            return self.state.swap(CANCEL, Ordering::SeqCst) != CANCEL;
        }
        self.state
            .compare_exchange(NONE, value, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn requested(&self) -> Option<StopReason> {
        match self.state.load(Ordering::SeqCst) {
            PAUSE => Some(StopReason::Pause),
            CANCEL => Some(StopReason::Cancel),
            TIMEOUT => Some(StopReason::Timeout),
            _ => None,
        }
    }
}
