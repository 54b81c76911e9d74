//! Activity clock: elapsed time counted only while some window holds focus.
//!
//! The clock is a plain value. The owner feeds it focus transitions and
//! persists [`ActivityClock::snapshot`] every pass; after an unplanned
//! teardown the persisted snapshot plus [`ActivityClock::recover`] restores
//! the time that elapsed between the last snapshot and the restart.
//!
//! - accumulated time never decreases
//! - `snapshot` folds the open focus session so the persisted value is exact
//!   as of `persisted_at`
//! - `recover` credits `now - persisted_at` at most once per snapshot

use chrono::{DateTime, Utc};

use crate::types::ClockState;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityClock {
    accumulated_ms: u64,
    focus_started_at: Option<DateTime<Utc>>,
    persisted_at: Option<DateTime<Utc>>,
    recovered_from: Option<DateTime<Utc>>,
}

/// Milliseconds from `from` to `to`, clamped at zero for backwards clock skew.
fn span_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    let ms = to.signed_duration_since(from).num_milliseconds();
    u64::try_from(ms).unwrap_or(0)
}

impl ActivityClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a clock from its persisted form without applying recovery.
    pub fn from_state(state: &ClockState) -> Self {
        Self {
            accumulated_ms: state.accumulated_ms,
            focus_started_at: state.focus_started_at,
            persisted_at: state.persisted_at,
            recovered_from: state.recovered_from,
        }
    }

    /// Accumulated activity plus the open focus session, in milliseconds.
    pub fn current_elapsed(&self, now: DateTime<Utc>) -> u64 {
        let open = self.focus_started_at.map_or(0, |start| span_ms(start, now));
        self.accumulated_ms.saturating_add(open)
    }

    pub fn is_focused(&self) -> bool {
        self.focus_started_at.is_some()
    }

    /// Apply a focus transition. Returns `true` when the clock changed.
    pub fn on_focus_change(&mut self, focused: bool, now: DateTime<Utc>) -> bool {
        match (focused, self.focus_started_at) {
            (true, None) => {
                self.focus_started_at = Some(now);
                true
            }
            (false, Some(start)) => {
                self.accumulated_ms = self.accumulated_ms.saturating_add(span_ms(start, now));
                self.focus_started_at = None;
                true
            }
            _ => false,
        }
    }

    /// Credit the gap between the last persisted snapshot and `now` when a
    /// focus session was open at teardown.
    ///
    /// Returns the milliseconds added. Calling again with the same
    /// `last_persisted_at` adds nothing.
    pub fn recover(
        &mut self,
        last_persisted_at: Option<DateTime<Utc>>,
        was_focused_at_teardown: bool,
        now: DateTime<Utc>,
    ) -> u64 {
        let Some(last) = last_persisted_at else {
            return 0;
        };
        if self.recovered_from == Some(last) {
            return 0;
        }

        let added = if was_focused_at_teardown {
            span_ms(last, now)
        } else {
            0
        };
        self.accumulated_ms = self.accumulated_ms.saturating_add(added);
        self.recovered_from = Some(last);
        self.focus_started_at = was_focused_at_teardown.then_some(now);
        added
    }

    /// Fold the open session and stamp `persisted_at = now`.
    pub fn snapshot(&mut self, now: DateTime<Utc>) -> ClockState {
        if let Some(start) = self.focus_started_at {
            self.accumulated_ms = self.accumulated_ms.saturating_add(span_ms(start, now));
            self.focus_started_at = Some(now);
        }
        self.persisted_at = Some(now);
        ClockState {
            accumulated_ms: self.accumulated_ms,
            focus_started_at: self.focus_started_at,
            persisted_at: self.persisted_at,
            recovered_from: self.recovered_from,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
