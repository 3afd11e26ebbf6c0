//! Two-flag handshake between the audio thread and control threads.
//!
//! The audio thread raises *in flight* for the duration of a `process` call; a control
//! thread raises *pending* and waits for *in flight* to clear. Both sides store their own
//! flag before loading the other's, with `SeqCst`, so at most one side sees the other's
//! flag clear. The audio thread never waits: if a controller is pending it skips the block.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::{Error, Result};

/// Spins before the waiting controller starts yielding.
const SPIN_LIMIT: u32 = 64;
/// Yields before the waiting controller starts sleeping.
const YIELD_LIMIT: u32 = 256;
const SLEEP_INTERVAL: Duration = Duration::from_micros(100);

#[derive(Debug, Default)]
pub(crate) struct SwapGate {
    pending: AtomicBool,
    in_flight: AtomicBool,
}

/// Held by the audio thread while it runs the engine.
pub(crate) struct ProcessPermit<'a> {
    gate: &'a SwapGate,
}

impl Drop for ProcessPermit<'_> {
    fn drop(&mut self) {
        self.gate.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Held by a control thread while it has exclusive access to the engine.
pub(crate) struct ControlPermit<'a> {
    gate: &'a SwapGate,
}

impl Drop for ControlPermit<'_> {
    fn drop(&mut self) {
        self.gate.pending.store(false, Ordering::SeqCst);
    }
}

impl SwapGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Whether a controller holds or is waiting for the gate.
    pub(crate) fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Audio side. Never blocks; `None` means skip this block.
    pub(crate) fn try_enter_process(&self) -> Option<ProcessPermit<'_>> {
        if self.pending.load(Ordering::SeqCst) {
            return None;
        }
        let reentered = self.in_flight.swap(true, Ordering::SeqCst);
        debug_assert!(!reentered, "Engine::process called while another process is running");
        if reentered {
            return None;
        }
        if self.pending.load(Ordering::SeqCst) {
            // A controller raised pending between the two loads.
            self.in_flight.store(false, Ordering::SeqCst);
            return None;
        }
        Some(ProcessPermit { gate: self })
    }

    /// Control side. Waits at most `timeout` for the audio thread to leave `process`.
    ///
    /// On timeout the pending flag is cleared again and the engine is left untouched.
    pub(crate) fn acquire(&self, timeout: Duration) -> Result<ControlPermit<'_>> {
        let start = Instant::now();
        let mut attempts: u32 = 0;

        // Only one controller at a time
        while self
            .pending
            .compare_exchange_weak(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            if start.elapsed() >= timeout {
                return Err(self.timed_out(timeout, false));
            }
            backoff(&mut attempts);
        }
        let permit = ControlPermit { gate: self };

        attempts = 0;
        while self.in_flight.load(Ordering::SeqCst) {
            if start.elapsed() >= timeout {
                drop(permit);
                return Err(self.timed_out(timeout, true));
            }
            backoff(&mut attempts);
        }
        Ok(permit)
    }

    fn timed_out(&self, timeout: Duration, audio_busy: bool) -> Error {
        if audio_busy {
            tracing::error!(
                "Audio thread did not leave process within {:?}; operation abandoned",
                timeout
            );
        } else {
            tracing::error!(
                "Another controller held the engine for more than {:?}; operation abandoned",
                timeout
            );
        }
        Error::LockTimeout(timeout)
    }
}

#[inline]
fn backoff(attempts: &mut u32) {
    if *attempts < SPIN_LIMIT {
        std::hint::spin_loop();
    } else if *attempts < YIELD_LIMIT {
        std::thread::yield_now();
    } else {
        std::thread::sleep(SLEEP_INTERVAL);
    }
    *attempts = attempts.saturating_add(1);
}
