//! Single-flight guard: one exclusive execution slot per summarization kind.
//!
//! Concurrent callers for an occupied kind are rejected, never queued. The
//! slot is released through the guard's Drop on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightKind {
    /// Repository and per-user summarization.
    Summary,
    /// Daily report generation.
    Report,
    /// Per-commit message backfill.
    Backfill,
}

impl FlightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Report => "daily report",
            Self::Backfill => "commit backfill",
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::Summary => 0,
            Self::Report => 1,
            Self::Backfill => 2,
        }
    }
}

/// Per-kind boolean slots. Lives inside a session, not as process state.
#[derive(Debug, Default)]
pub struct SingleFlight {
    slots: [AtomicBool; 3],
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `kind`. Returns None if already held; the caller
    /// must then report "in progress" and abandon without side effects.
    pub fn try_enter(&self, kind: FlightKind) -> Option<FlightGuard<'_>> {
        let slot = &self.slots[kind.index()];
        if slot
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::debug!(kind = kind.as_str(), "Flight slot acquired");
            Some(FlightGuard { slot, kind })
        } else {
            tracing::debug!(kind = kind.as_str(), "Flight slot busy");
            None
        }
    }

    /// True if the slot for `kind` is currently held.
    pub fn in_flight(&self, kind: FlightKind) -> bool {
        self.slots[kind.index()].load(Ordering::Acquire)
    }
}

/// Releases its slot when dropped, success or failure alike.
pub struct FlightGuard<'a> {
    slot: &'a AtomicBool,
    kind: FlightKind,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.slot.store(false, Ordering::Release);
        tracing::debug!(kind = self.kind.as_str(), "Flight slot released");
    }
}
