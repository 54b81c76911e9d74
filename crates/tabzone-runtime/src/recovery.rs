//! Restart recovery: rebuild state from the live host plus the last
//! persisted state. Single-flight: concurrent triggers share one run.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tabzone_core::ActivityClock;
use tabzone_core::reconcile::{ReconcileReport, reconcile};

use crate::context::EngineContext;

#[derive(Debug, Default)]
pub struct Recovery {
    gate: tokio::sync::Mutex<()>,
    runs: AtomicU64,
}

impl Recovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile unless the persisted state already carries this process's
    /// nonce. Returns `None` when nothing had to be done.
    pub async fn ensure(&self, ctx: &EngineContext) -> anyhow::Result<Option<ReconcileReport>> {
        let _gate = self.gate.lock().await;

        let state = ctx.state.read().await;
        if state.runtime_nonce.as_deref() == Some(ctx.nonce.as_str()) {
            return Ok(None);
        }

        let host = Arc::clone(&ctx.host);
        let live = tokio::task::spawn_blocking(move || host.snapshot()).await??;
        let now = Utc::now();
        let nonce = ctx.nonce.clone();

        let (clock, report, credited_ms) = ctx
            .state
            .update(|current| {
                let was_focused = current.clock.focus_started_at.is_some();
                let mut clock = ActivityClock::from_state(&current.clock);
                let credited = clock.recover(current.clock.persisted_at, was_focused, now);
                clock.on_focus_change(live.windows.iter().any(|w| w.focused), now);

                let elapsed = clock.current_elapsed(now);
                let rebuilt = reconcile(&current.items, &current.windows, &live, elapsed, now);
                current.items = rebuilt.items;
                current.windows = rebuilt.topology;
                current.clock = clock.snapshot(now);
                current.runtime_nonce = Some(nonce);
                (clock, rebuilt.report, credited)
            })
            .await?;

        ctx.with_clock(|c| *c = clock);
        self.runs.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            "recovered: {} by id, {} by url, {} fresh, {} windows remapped, {} dropped, clock +{credited_ms}ms",
            report.matched_by_id,
            report.matched_by_url,
            report.fresh,
            report.window_remaps,
            report.dropped_windows
        );
        Ok(Some(report))
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }
}
