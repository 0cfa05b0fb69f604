//! Completion signalling for dispatched work.
//!
//! A [`CompletionSignal`] is the host-visible half of a device completion
//! notification. It is created with an initial value (one per pending
//! launch), the device subtracts from it when the work retires, and the
//! host blocks until the value drops below a threshold.
//!
//! # Example
//!
//! ```ignore
//! let signal = CompletionSignal::new(1);
//!
//! // Device side, after the launch retires
//! signal.subtract(1);
//!
//! // Host side
//! let observed = signal.wait_below(1, 0)?;
//! assert_eq!(observed, 0);
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, SignalTimeoutSnafu};

/// Host/device completion signal.
///
/// The value is a signed counter: it starts at the number of outstanding
/// completions, the device drives it toward zero, and a negative value
/// reports an execution fault. Waiters block until the value drops below
/// their threshold.
#[derive(Debug)]
pub struct CompletionSignal {
    /// Current signal value.
    value: AtomicI64,
    /// Mutex for condvar waiting (protects nothing, just for the condvar).
    mutex: Mutex<()>,
    /// Condvar for waiting threads.
    condvar: Condvar,
}

impl CompletionSignal {
    /// Create a new signal with the given initial value.
    pub fn new(initial: i64) -> Self {
        Self { value: AtomicI64::new(initial), mutex: Mutex::new(()), condvar: Condvar::new() }
    }

    /// Get the current signal value.
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Store a new value and wake all waiters.
    ///
    /// Used by backends to report an execution fault (negative value).
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
        self.condvar.notify_all();
    }

    /// Subtract `delta` from the value and wake all waiters.
    ///
    /// This is the device-side retirement path.
    pub fn subtract(&self, delta: i64) {
        self.value.fetch_sub(delta, Ordering::AcqRel);
        self.condvar.notify_all();
    }

    /// Wait until the signal value drops below `threshold`.
    ///
    /// # Arguments
    ///
    /// * `threshold` - Wait completes once `value < threshold`
    /// * `timeout_ms` - Maximum time to wait in milliseconds (0 = infinite)
    ///
    /// # Returns
    ///
    /// The observed value that satisfied the wait, or `Err` on timeout.
    pub fn wait_below(&self, threshold: i64, timeout_ms: u64) -> Result<i64> {
        // Fast path: already below.
        let current = self.value.load(Ordering::Acquire);
        if current < threshold {
            return Ok(current);
        }

        let mut guard = self.mutex.lock();

        if timeout_ms == 0 {
            loop {
                let current = self.value.load(Ordering::Acquire);
                if current < threshold {
                    return Ok(current);
                }
                self.condvar.wait(&mut guard);
            }
        }

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let current = self.value.load(Ordering::Acquire);
            if current < threshold {
                return Ok(current);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return SignalTimeoutSnafu { timeout_ms, threshold, current }.fail();
            }

            let result = self.condvar.wait_for(&mut guard, remaining);
            if result.timed_out() {
                let current = self.value.load(Ordering::Acquire);
                if current < threshold {
                    return Ok(current);
                }
                return SignalTimeoutSnafu { timeout_ms, threshold, current }.fail();
            }
        }
    }
}
