//! Status classifier: age → {fresh, aging, stale, expired}.
//!
//! Boundaries are inclusive on the upper side (`age >= threshold` advances).
//! Each step can be gated off; a closed gate also blocks every later step.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::TimeBase;
use crate::types::{CoreError, ItemRecord, Status};

/// Ascending age thresholds for the three transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub aging: Duration,
    pub stale: Duration,
    pub expired: Duration,
}

impl Thresholds {
    pub fn from_secs(aging: u64, stale: u64, expired: u64) -> Self {
        Self {
            aging: Duration::from_secs(aging),
            stale: Duration::from_secs(stale),
            expired: Duration::from_secs(expired),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.aging < self.stale && self.stale < self.expired {
            Ok(())
        } else {
            Err(CoreError::InvalidThresholds {
                aging_secs: self.aging.as_secs(),
                stale_secs: self.stale.as_secs(),
                expire_secs: self.expired.as_secs(),
            })
        }
    }
}

/// Per-transition enable flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionGates {
    pub aging: bool,
    pub stale: bool,
    pub expired: bool,
}

impl Default for TransitionGates {
    fn default() -> Self {
        Self {
            aging: true,
            stale: true,
            expired: true,
        }
    }
}

pub fn classify(age: Duration, thresholds: &Thresholds, gates: &TransitionGates) -> Status {
    let steps = [
        (gates.aging, thresholds.aging, Status::Aging),
        (gates.stale, thresholds.stale, Status::Stale),
        (gates.expired, thresholds.expired, Status::Expired),
    ];

    let mut status = Status::Fresh;
    for (enabled, threshold, next) in steps {
        if !enabled || age < threshold {
            break;
        }
        status = next;
    }
    status
}

/// Age of a record in the selected time base, saturating at zero.
///
/// `activity_elapsed_ms` is the activity clock's current reading.
pub fn item_age(
    record: &ItemRecord,
    activity_elapsed_ms: u64,
    now: DateTime<Utc>,
    time_base: TimeBase,
) -> Duration {
    match time_base {
        TimeBase::Activity => Duration::from_millis(
            activity_elapsed_ms.saturating_sub(record.refreshed_activity_ms),
        ),
        TimeBase::WallClock => now
            .signed_duration_since(record.refreshed_at)
            .to_std()
            .unwrap_or(Duration::ZERO),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemId, WindowId};
    use chrono::TimeDelta;
    use proptest::prelude::*;

    fn thresholds() -> Thresholds {
        Thresholds::from_secs(10, 20, 30)
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn record(activity_ms: u64, at: DateTime<Utc>) -> ItemRecord {
        ItemRecord {
            id: ItemId(1),
            window_id: WindowId(1),
            refreshed_activity_ms: activity_ms,
            refreshed_at: at,
            status: Some(Status::Fresh),
            group_id: None,
            in_state_group: false,
            pinned: false,
            url: String::new(),
        }
    }

    #[test]
    fn boundaries_are_inclusive() {
        let all = TransitionGates::default();
        assert_eq!(classify(secs(0), &thresholds(), &all), Status::Fresh);
        assert_eq!(classify(secs(9), &thresholds(), &all), Status::Fresh);
        assert_eq!(classify(secs(10), &thresholds(), &all), Status::Aging);
        assert_eq!(classify(secs(20), &thresholds(), &all), Status::Stale);
        assert_eq!(classify(secs(30), &thresholds(), &all), Status::Expired);
    }

    #[test]
    fn closed_gate_blocks_later_steps() {
        let gates = TransitionGates {
            aging: true,
            stale: false,
            expired: true,
        };
        assert_eq!(classify(secs(500), &thresholds(), &gates), Status::Aging);

        let none = TransitionGates {
            aging: false,
            stale: true,
            expired: true,
        };
        assert_eq!(classify(secs(500), &thresholds(), &none), Status::Fresh);
    }

    #[test]
    fn expire_gate_caps_at_stale() {
        let gates = TransitionGates {
            expired: false,
            ..TransitionGates::default()
        };
        assert_eq!(classify(secs(31), &thresholds(), &gates), Status::Stale);
    }

    #[test]
    fn validate_rejects_non_ascending() {
        assert!(thresholds().validate().is_ok());
        assert!(Thresholds::from_secs(10, 10, 30).validate().is_err());
        assert!(Thresholds::from_secs(30, 20, 10).validate().is_err());
    }

    #[test]
    fn activity_age_ignores_wall_time() {
        let now = Utc::now();
        let rec = record(5_000, now - TimeDelta::days(3));
        let age = item_age(&rec, 12_000, now, TimeBase::Activity);
        assert_eq!(age, Duration::from_millis(7_000));
    }

    #[test]
    fn wall_clock_age_ignores_activity() {
        let now = Utc::now();
        let rec = record(0, now - TimeDelta::seconds(90));
        let age = item_age(&rec, 0, now, TimeBase::WallClock);
        assert_eq!(age, secs(90));
    }

    #[test]
    fn future_refresh_saturates_to_zero() {
        let now = Utc::now();
        let rec = record(50_000, now + TimeDelta::seconds(30));
        assert_eq!(item_age(&rec, 1_000, now, TimeBase::Activity), Duration::ZERO);
        assert_eq!(item_age(&rec, 1_000, now, TimeBase::WallClock), Duration::ZERO);
    }

    fn arb_gates() -> impl Strategy<Value = TransitionGates> {
        (any::<bool>(), any::<bool>(), any::<bool>()).prop_map(|(aging, stale, expired)| {
            TransitionGates {
                aging,
                stale,
                expired,
            }
        })
    }

    proptest! {
        #[test]
        fn classify_is_monotonic_in_age(
            a in 0u64..100_000,
            b in 0u64..100_000,
            t1 in 1u64..1_000,
            d2 in 1u64..1_000,
            d3 in 1u64..1_000,
            gates in arb_gates(),
        ) {
            let th = Thresholds::from_secs(t1, t1 + d2, t1 + d2 + d3);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let s_lo = classify(secs(lo), &th, &gates);
            let s_hi = classify(secs(hi), &th, &gates);
            prop_assert!(s_lo <= s_hi);
            prop_assert!(Status::ALL.contains(&s_hi));
        }
    }
}
