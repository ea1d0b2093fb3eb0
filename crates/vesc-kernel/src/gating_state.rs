//! [`GatingState`] – the armed and manual-override flags.
//!
//! Both flags, plus the time of the most recent override command, live behind
//! a single [`Mutex`]. Every read and read-modify-write takes that one lock,
//! so a status snapshot can never pair an old `armed` with a new
//! `override_engaged`, and concurrent [`GatingState::toggle_armed`] calls
//! serialize with each caller seeing the value it actually replaced.
//!
//! The override flag expires: when no override command has been recorded for
//! `override_timeout`, the next snapshot clears it. Expiry is evaluated
//! lazily against a caller-supplied [`Instant`], it never blocks or sleeps.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::info;

/// Flags read together under one lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSnapshot {
    pub armed: bool,
    pub override_engaged: bool,
}

#[derive(Debug)]
struct Flags {
    armed: bool,
    override_engaged: bool,
    last_override: Option<Instant>,
}

/// Process-wide gating flags shared by the dispatcher, the status
/// broadcaster and the arm service.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use vesc_kernel::GatingState;
///
/// let gate = GatingState::new(true, Some(Duration::from_secs(1)));
/// assert!(gate.is_armed());
///
/// let previous = gate.toggle_armed();
/// assert!(previous);
/// assert!(!gate.is_armed());
/// ```
#[derive(Debug)]
pub struct GatingState {
    flags: Mutex<Flags>,
    /// `None` disables expiry.
    override_timeout: Option<Duration>,
}

impl GatingState {
    /// Start in autonomous mode with the given arm state.
    pub fn new(initial_armed: bool, override_timeout: Option<Duration>) -> Self {
        Self {
            flags: Mutex::new(Flags {
                armed: initial_armed,
                override_engaged: false,
                last_override: None,
            }),
            override_timeout,
        }
    }

    pub fn override_timeout(&self) -> Option<Duration> {
        self.override_timeout
    }

    pub fn is_armed(&self) -> bool {
        self.lock().armed
    }

    /// Flip the armed flag and return its previous value.
    pub fn toggle_armed(&self) -> bool {
        let mut flags = self.lock();
        let previous = flags.armed;
        flags.armed = !previous;
        drop(flags);
        info!(previous_armed = previous, armed = !previous, "arm state toggled");
        previous
    }

    /// Clear the armed flag in one critical section and return its previous
    /// value. Never re-arms, whatever toggles it races with.
    pub fn disarm(&self) -> bool {
        let previous = std::mem::replace(&mut self.lock().armed, false);
        if previous {
            info!("disarmed");
        }
        previous
    }

    /// Override flag as of now, with expiry applied.
    pub fn is_override_engaged(&self) -> bool {
        self.snapshot().override_engaged
    }

    /// Force the override flag. Engaging through this call does not refresh
    /// the expiry timestamp; use [`GatingState::record_override_at`] for
    /// traffic-driven engagement.
    pub fn set_override_engaged(&self, engaged: bool) {
        let mut flags = self.lock();
        flags.override_engaged = engaged;
        if !engaged {
            flags.last_override = None;
        }
    }

    /// Note that an override command arrived at `now`: engage the flag and
    /// restart its expiry window.
    pub fn record_override_at(&self, now: Instant) {
        let mut flags = self.lock();
        if !flags.override_engaged {
            info!("manual override engaged");
        }
        flags.override_engaged = true;
        flags.last_override = Some(now);
    }

    pub fn record_override(&self) {
        self.record_override_at(Instant::now());
    }

    /// Apply override expiry as of `now`, then read both flags.
    pub fn snapshot_at(&self, now: Instant) -> GateSnapshot {
        let mut flags = self.lock();
        if let (true, Some(timeout), Some(last)) =
            (flags.override_engaged, self.override_timeout, flags.last_override)
            && now.saturating_duration_since(last) > timeout
        {
            flags.override_engaged = false;
            flags.last_override = None;
            info!(timeout_ms = timeout.as_millis() as u64, "manual override expired");
        }
        GateSnapshot {
            armed: flags.armed,
            override_engaged: flags.override_engaged,
        }
    }

    pub fn snapshot(&self) -> GateSnapshot {
        self.snapshot_at(Instant::now())
    }

    fn lock(&self) -> MutexGuard<'_, Flags> {
        // Every critical section writes whole booleans, so a poisoned guard
        // still holds a consistent state.
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for GatingState {
    /// Armed, autonomous, one-second override expiry.
    fn default() -> Self {
        Self::new(true, Some(Duration::from_secs(1)))
    }
}
