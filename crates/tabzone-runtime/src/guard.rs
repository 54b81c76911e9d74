//! Lock-with-deadline guard.
//!
//! A holder that exceeds the ceiling is force-released on the next acquire
//! attempt instead of wedging every later pass. Tokens carry a generation so
//! a force-released holder dropping late cannot release its successor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Hold {
    generation: u64,
    since: Instant,
}

#[derive(Debug)]
pub struct DeadlineGuard {
    name: &'static str,
    ceiling: Duration,
    slot: Mutex<Option<Hold>>,
    generation: AtomicU64,
    forced: AtomicU64,
}

/// Held while the guarded section runs; releases on drop.
#[derive(Debug)]
pub struct GuardToken<'a> {
    guard: &'a DeadlineGuard,
    generation: u64,
}

impl DeadlineGuard {
    pub fn new(name: &'static str, ceiling: Duration) -> Self {
        Self {
            name,
            ceiling,
            slot: Mutex::new(None),
            generation: AtomicU64::new(0),
            forced: AtomicU64::new(0),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Hold>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire unless a live holder exists. Never waits.
    pub fn try_acquire(&self) -> Option<GuardToken<'_>> {
        let mut slot = self.slot();
        if let Some(hold) = *slot {
            let held = hold.since.elapsed();
            if held < self.ceiling {
                return None;
            }
            self.forced.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                "{} guard held for {}ms (ceiling {}ms), force-releasing",
                self.name,
                held.as_millis(),
                self.ceiling.as_millis()
            );
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        *slot = Some(Hold {
            generation,
            since: Instant::now(),
        });
        Some(GuardToken {
            guard: self,
            generation,
        })
    }

    /// Whether a holder exists that has not yet exceeded the ceiling.
    pub fn is_held(&self) -> bool {
        self.slot()
            .is_some_and(|hold| hold.since.elapsed() < self.ceiling)
    }

    /// Number of force-releases so far.
    pub fn forced_releases(&self) -> u64 {
        self.forced.load(Ordering::Relaxed)
    }
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        let mut slot = self.guard.slot();
        if slot.is_some_and(|hold| hold.generation == self.generation) {
            *slot = None;
        }
    }
}
