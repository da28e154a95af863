//! One-at-a-time admission of transactions on in-memory engines.
//!
//! Shared-cache connections report table contention as `SQLITE_LOCKED`,
//! which the busy handler never retries. Memory engines therefore queue
//! their transactions here, bounded by the same timeout file databases get
//! from `busy_timeout`.

use super::{PersistError, PersistResult};
use log::warn;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

pub(crate) struct WriteGate {
    held: Mutex<bool>,
    released: Condvar,
    timeout: Duration,
}

impl WriteGate {
    pub(crate) fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            held: Mutex::new(false),
            released: Condvar::new(),
            timeout,
        })
    }

    /// Waits until no other pass is alive and takes one.
    ///
    /// # Errors
    /// - `LockTimeout` when the gate stays held for longer than the timeout.
    pub(crate) fn enter(self: &Arc<Self>) -> PersistResult<GatePass> {
        let started_at = Instant::now();
        let held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut held, _) = self
            .released
            .wait_timeout_while(held, self.timeout, |held| *held)
            .unwrap_or_else(PoisonError::into_inner);

        if *held {
            let waited_ms = started_at.elapsed().as_millis();
            warn!(
                "event=tx_gate module=db status=error error_code=lock_timeout waited_ms={}",
                waited_ms
            );
            return Err(PersistError::LockTimeout { waited_ms });
        }
        *held = true;
        Ok(GatePass {
            gate: Arc::clone(self),
        })
    }
}

/// Proof of admission; dropping it lets the next transaction in.
pub(crate) struct GatePass {
    gate: Arc<WriteGate>,
}

impl Drop for GatePass {
    fn drop(&mut self) {
        *self.gate.held.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.gate.released.notify_one();
    }
}
