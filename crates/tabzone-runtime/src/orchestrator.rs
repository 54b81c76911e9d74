//! Evaluation orchestrator: periodic full passes, debounced per-window
//! re-sorts and the reactive event handlers, arbitrated by two deadline
//! guards.
//!
//! Pass pipeline:
//!   recovery check → host snapshot → heal membership → classify
//!     → sort each window → merge into persisted state

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Duration;

use tabzone_core::reconcile::LiveSnapshot;
use tabzone_core::{
    ClockState, GroupId, ItemId, ItemRecord, LiveTab, PersistedState, Settings, Status,
    TopologyStore, WindowId, WindowTopology, classify, item_age,
};
use tabzone_host::HostEvent;

use crate::context::EngineContext;
use crate::guard::DeadlineGuard;
use crate::recovery::Recovery;
use crate::sorter::{SortReport, WindowOutcome, ZoneSorter};

pub const DEFAULT_GUARD_CEILING: Duration = Duration::from_secs(60);
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(750);

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub guard_ceiling: Duration,
    pub debounce: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            guard_ceiling: DEFAULT_GUARD_CEILING,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

// ─── Reports ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub fresh: usize,
    pub aging: usize,
    pub stale: usize,
    pub expired: usize,
    pub pinned: usize,
}

impl StatusCounts {
    fn add(&mut self, status: Option<Status>) {
        match status {
            Some(Status::Fresh) => self.fresh += 1,
            Some(Status::Aging) => self.aging += 1,
            Some(Status::Stale) => self.stale += 1,
            Some(Status::Expired) => self.expired += 1,
            None => self.pinned += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub windows: usize,
    pub items: usize,
    pub counts: StatusCounts,
    pub activity_ms: u64,
    /// Restart recovery ran before this pass.
    pub recovered: bool,
    pub pruned_windows: usize,
    /// Windows whose sort failed and were left untouched.
    pub failed_windows: usize,
    pub sort: SortReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Another holder owns the guard.
    Skipped,
    Aborted(String),
    Completed(PassReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDisposition {
    Applied,
    /// The running cycle persists a superset of this write.
    SkippedDuringCycle,
    Ignored,
}

#[derive(Debug, Default)]
struct Stats {
    cycles_completed: AtomicU64,
    cycles_skipped: AtomicU64,
    cycles_aborted: AtomicU64,
    sorts_completed: AtomicU64,
    sorts_skipped: AtomicU64,
    events: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    pub cycles_aborted: u64,
    pub sorts_completed: u64,
    pub sorts_skipped: u64,
    pub events: u64,
    pub recoveries: u64,
    pub forced_releases: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// ─── Orchestrator ─────────────────────────────────────────────────

pub struct Orchestrator {
    ctx: Arc<EngineContext>,
    cycle_running: DeadlineGuard,
    sort_running: DeadlineGuard,
    recovery: Recovery,
    debounce: Duration,
    /// Latest debounce ticket per window; a waking task runs only if it
    /// still holds the latest one.
    pending: Mutex<HashMap<WindowId, u64>>,
    tickets: AtomicU64,
    stats: Stats,
    last_report: Mutex<Option<PassReport>>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<EngineContext>, config: OrchestratorConfig) -> Self {
        Self {
            ctx,
            cycle_running: DeadlineGuard::new("cycle_running", config.guard_ceiling),
            sort_running: DeadlineGuard::new("sort_running", config.guard_ceiling),
            recovery: Recovery::new(),
            debounce: config.debounce,
            pending: Mutex::new(HashMap::new()),
            tickets: AtomicU64::new(0),
            stats: Stats::default(),
            last_report: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn stats(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            cycles_completed: load(&self.stats.cycles_completed),
            cycles_skipped: load(&self.stats.cycles_skipped),
            cycles_aborted: load(&self.stats.cycles_aborted),
            sorts_completed: load(&self.stats.sorts_completed),
            sorts_skipped: load(&self.stats.sorts_skipped),
            events: load(&self.stats.events),
            recoveries: self.recovery.runs(),
            forced_releases: self.cycle_running.forced_releases()
                + self.sort_running.forced_releases(),
        }
    }

    pub fn last_report(&self) -> Option<PassReport> {
        lock(&self.last_report).clone()
    }

    pub fn cycle_in_progress(&self) -> bool {
        self.cycle_running.is_held()
    }

    /// Reconcile against the host if the persisted state belongs to an
    /// earlier process.
    pub async fn recover(&self) -> anyhow::Result<bool> {
        Ok(self.recovery.ensure(&self.ctx).await?.is_some())
    }

    /// One full evaluation pass.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_token) = self.cycle_running.try_acquire() else {
            bump(&self.stats.cycles_skipped);
            tracing::debug!("cycle skipped: previous cycle still running");
            return CycleOutcome::Skipped;
        };

        match self.cycle().await {
            Ok(report) => {
                bump(&self.stats.cycles_completed);
                *lock(&self.last_report) = Some(report.clone());
                CycleOutcome::Completed(report)
            }
            Err(e) => {
                bump(&self.stats.cycles_aborted);
                tracing::warn!("cycle aborted: {e:#}");
                CycleOutcome::Aborted(format!("{e:#}"))
            }
        }
    }

    async fn cycle(&self) -> anyhow::Result<PassReport> {
        let settings = self.ctx.settings.current()?;
        let recovered = self.recover().await?;

        let host = Arc::clone(&self.ctx.host);
        let live = tokio::task::spawn_blocking(move || host.snapshot()).await??;

        let now = Utc::now();
        let focused = live.windows.iter().any(|w| w.focused);
        let activity_ms = self.ctx.with_clock(|c| {
            c.on_focus_change(focused, now);
            c.current_elapsed(now)
        });

        let state = self.ctx.state.read().await;
        let mut work = heal(&state, &live, activity_ms, now);
        let counts = classify_all(&mut work.items, &settings, activity_ms, now);

        let mut report = PassReport {
            windows: live.windows.len(),
            items: work.items.len(),
            counts,
            activity_ms,
            recovered,
            pruned_windows: work.pruned.len(),
            ..PassReport::default()
        };

        for window in live.windows.iter().map(|w| w.id) {
            let statuses = work.statuses(window);
            let topology = work.windows.get(window).cloned().unwrap_or_default();
            match self
                .sort(settings.clone(), window, statuses, topology)
                .await
            {
                Ok(outcome) => {
                    report.sort.merge(&outcome.report);
                    work.apply(window, outcome);
                }
                Err(e) => {
                    report.failed_windows += 1;
                    tracing::warn!("sorting {window} failed: {e:#}");
                }
            }
        }

        let clock = self.ctx.with_clock(|c| c.snapshot(Utc::now()));
        let nonce = self.ctx.nonce.clone();
        self.ctx
            .state
            .update(move |current| work.merge_into(current, clock, nonce))
            .await?;

        tracing::info!(
            "cycle: {} items ({} fresh, {} aging, {} stale, {} expired), {} moves, {} group moves",
            report.items,
            report.counts.fresh,
            report.counts.aging,
            report.counts.stale,
            report.counts.expired,
            report.sort.tabs_moved,
            report.sort.group_moves
        );
        Ok(report)
    }

    /// Run the sorter for one window off the async runtime.
    async fn sort(
        &self,
        settings: Settings,
        window: WindowId,
        statuses: HashMap<ItemId, Status>,
        topology: WindowTopology,
    ) -> anyhow::Result<WindowOutcome> {
        let ctx = Arc::clone(&self.ctx);
        let outcome = tokio::task::spawn_blocking(move || {
            ZoneSorter::new(&*ctx.host, &settings)
                .with_eviction(ctx.eviction.as_deref())
                .with_namer(ctx.namer.as_deref())
                .run(window, &statuses, topology)
        })
        .await??;
        Ok(outcome)
    }

    /// Lighter re-sort of one window using stored statuses.
    pub async fn sort_window(&self, window: WindowId) -> CycleOutcome {
        if self.cycle_running.is_held() {
            bump(&self.stats.sorts_skipped);
            return CycleOutcome::Skipped;
        }
        let Some(_token) = self.sort_running.try_acquire() else {
            bump(&self.stats.sorts_skipped);
            return CycleOutcome::Skipped;
        };

        match self.resort(window).await {
            Ok(report) => {
                bump(&self.stats.sorts_completed);
                CycleOutcome::Completed(report)
            }
            Err(e) => {
                tracing::warn!("re-sort of {window} aborted: {e:#}");
                CycleOutcome::Aborted(format!("{e:#}"))
            }
        }
    }

    async fn resort(&self, window: WindowId) -> anyhow::Result<PassReport> {
        let settings = self.ctx.settings.current()?;
        let host = Arc::clone(&self.ctx.host);
        let tabs = tokio::task::spawn_blocking(move || host.tabs(window)).await??;

        let state = self.ctx.state.read().await;
        let now = Utc::now();
        let activity_ms = self.ctx.with_clock(|c| c.current_elapsed(now));

        let mut counts = StatusCounts::default();
        let statuses: HashMap<ItemId, Status> = tabs
            .iter()
            .filter(|t| !t.pinned)
            .map(|t| {
                let status = state
                    .items
                    .get(&t.id)
                    .and_then(|r| r.status)
                    .unwrap_or(Status::Fresh);
                counts.add(Some(status));
                (t.id, status)
            })
            .collect();
        counts.pinned = tabs.len() - statuses.len();
        let topology = state.windows.get(window).cloned().unwrap_or_default();

        let outcome = self.sort(settings, window, statuses, topology).await?;
        let report = PassReport {
            windows: 1,
            items: tabs.len(),
            counts,
            activity_ms,
            sort: outcome.report.clone(),
            ..PassReport::default()
        };

        self.ctx
            .state
            .update(|current| {
                for id in &outcome.evicted {
                    current.items.remove(id);
                }
                for tab in &outcome.tabs {
                    let record = current
                        .items
                        .entry(tab.id)
                        .or_insert_with(|| ItemRecord::fresh(tab, activity_ms, now));
                    patch_membership(record, tab, &outcome.topology);
                }
                current.windows.insert(window, outcome.topology);
            })
            .await?;
        Ok(report)
    }

    /// Debounced [`Self::sort_window`]: a burst of calls for one window
    /// yields a single re-sort after the quiet period.
    pub fn schedule_sort(self: &Arc<Self>, window: WindowId) {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed) + 1;
        lock(&self.pending).insert(window, ticket);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.debounce).await;
            {
                let mut pending = lock(&this.pending);
                if pending.get(&window) != Some(&ticket) {
                    return;
                }
                pending.remove(&window);
            }
            let outcome = this.sort_window(window).await;
            tracing::debug!("debounced sort of {window}: {outcome:?}");
        });
    }

    // ─── Reactive handlers ────────────────────────────────────────

    /// Apply one host event. State left by an earlier process is recovered
    /// first, so the clock and record timestamps never start from zero.
    pub async fn handle_event(
        self: &Arc<Self>,
        event: HostEvent,
    ) -> anyhow::Result<EventDisposition> {
        bump(&self.stats.events);
        tracing::debug!("event {}", event.kind());
        if self.recover().await? {
            tracing::info!("recovered before handling {}", event.kind());
        }
        let now = Utc::now();
        let busy = self.cycle_running.is_held();

        let disposition = match event {
            HostEvent::TabCreated { tab } => {
                let activity_ms = self.ctx.with_clock(|c| c.current_elapsed(now));
                self.ctx
                    .state
                    .update(|s| {
                        s.items
                            .entry(tab.id)
                            .or_insert_with(|| ItemRecord::fresh(&tab, activity_ms, now));
                    })
                    .await?;
                self.schedule_sort(tab.window_id);
                EventDisposition::Applied
            }
            HostEvent::TabRemoved {
                window_closing: true,
                ..
            } => EventDisposition::Ignored,
            HostEvent::TabRemoved { tab_id, .. } => {
                if busy {
                    EventDisposition::SkippedDuringCycle
                } else {
                    self.ctx
                        .state
                        .update(|s| s.items.remove(&tab_id))
                        .await?;
                    EventDisposition::Applied
                }
            }
            HostEvent::TabNavigated {
                tab_id,
                window_id,
                url,
            } => {
                let activity_ms = self.ctx.with_clock(|c| c.current_elapsed(now));
                let known = self
                    .ctx
                    .state
                    .update(|s| match s.items.get_mut(&tab_id) {
                        Some(record) => {
                            record.refresh(activity_ms, now);
                            record.url = url;
                            true
                        }
                        None => false,
                    })
                    .await?;
                self.schedule_sort(window_id);
                if known {
                    EventDisposition::Applied
                } else {
                    EventDisposition::Ignored
                }
            }
            HostEvent::TabMoved { tab_id, window_id } => {
                let disposition = if busy {
                    EventDisposition::SkippedDuringCycle
                } else {
                    self.ctx
                        .state
                        .update(|s| {
                            if let Some(record) = s.items.get_mut(&tab_id)
                                && record.window_id != window_id
                            {
                                record.window_id = window_id;
                                record.group_id = None;
                                record.in_state_group = false;
                            }
                        })
                        .await?;
                    EventDisposition::Applied
                };
                self.schedule_sort(window_id);
                disposition
            }
            HostEvent::TabGroupChanged {
                tab_id,
                window_id,
                group_id,
            } => {
                let disposition = if busy {
                    EventDisposition::SkippedDuringCycle
                } else {
                    self.ctx
                        .state
                        .update(|s| {
                            let reserved =
                                group_id.is_some_and(|g| s.windows.is_state_group(window_id, g));
                            if let Some(record) = s.items.get_mut(&tab_id) {
                                record.window_id = window_id;
                                record.group_id = group_id;
                                record.in_state_group = reserved;
                            }
                        })
                        .await?;
                    EventDisposition::Applied
                };
                self.schedule_sort(window_id);
                disposition
            }
            HostEvent::TabPinnedChanged { tab_id, pinned, .. } => {
                self.ctx
                    .state
                    .update(|s| {
                        if let Some(record) = s.items.get_mut(&tab_id) {
                            record.pinned = pinned;
                            record.status = None;
                            if pinned {
                                record.group_id = None;
                                record.in_state_group = false;
                            }
                        }
                    })
                    .await?;
                EventDisposition::Applied
            }
            HostEvent::GroupCreated { group } | HostEvent::GroupUpdated { group } => {
                self.schedule_sort(group.window_id);
                EventDisposition::Applied
            }
            HostEvent::GroupRemoved {
                group_id,
                window_id,
            } => {
                self.ctx
                    .state
                    .update(|s| {
                        if s.windows.forget_group(window_id, group_id) {
                            tracing::info!("reserved container {group_id} in {window_id} removed");
                        }
                        for record in s.items.values_mut() {
                            if record.group_id == Some(group_id) {
                                record.group_id = None;
                                record.in_state_group = false;
                            }
                        }
                    })
                    .await?;
                EventDisposition::Applied
            }
            HostEvent::WindowFocusChanged { window_id } => {
                let clock = self.ctx.with_clock(|c| {
                    c.on_focus_change(window_id.is_some(), now)
                        .then(|| c.snapshot(now))
                });
                match clock {
                    Some(clock) => {
                        self.ctx.state.update(|s| s.clock = clock).await?;
                        EventDisposition::Applied
                    }
                    None => EventDisposition::Ignored,
                }
            }
            HostEvent::WindowRemoved { window_id } => {
                lock(&self.pending).remove(&window_id);
                let dropped = self
                    .ctx
                    .state
                    .update(|s| s.remove_window(window_id))
                    .await?;
                tracing::debug!("{window_id} closed, dropped {dropped} records");
                EventDisposition::Applied
            }
        };
        Ok(disposition)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn patch_membership(record: &mut ItemRecord, tab: &LiveTab, topology: &WindowTopology) {
    record.window_id = tab.window_id;
    record.group_id = tab.group_id;
    record.in_state_group = tab.group_id.is_some_and(|g| topology.is_state_group(g));
    record.pinned = tab.pinned;
    if tab.pinned {
        record.status = None;
    }
}

// ─── Pass working set ─────────────────────────────────────────────

/// The pass's view of persisted state, healed against the live host.
struct Working {
    items: BTreeMap<ItemId, ItemRecord>,
    /// Records whose tab no longer exists.
    vanished: HashSet<ItemId>,
    windows: TopologyStore,
    /// Topology as persisted when the pass started.
    base: TopologyStore,
    /// Windows the sorter finished.
    sorted: HashSet<WindowId>,
    pruned: Vec<WindowId>,
}

/// Align every record with where its tab actually is. Unknown live tabs get
/// fresh records; records of vanished tabs and windows are dropped.
fn heal(
    state: &PersistedState,
    live: &LiveSnapshot,
    activity_ms: u64,
    now: DateTime<Utc>,
) -> Working {
    let live_tabs: HashMap<ItemId, &LiveTab> = live.tabs.iter().map(|t| (t.id, t)).collect();

    let mut items = BTreeMap::new();
    let mut vanished = HashSet::new();
    for (id, record) in &state.items {
        match live_tabs.get(id) {
            Some(tab) => {
                let mut record = record.clone();
                record.url.clone_from(&tab.url);
                items.insert(*id, record);
            }
            None => {
                vanished.insert(*id);
            }
        }
    }
    for tab in &live.tabs {
        items
            .entry(tab.id)
            .or_insert_with(|| ItemRecord::fresh(tab, activity_ms, now));
    }

    let mut windows = state.windows.clone();
    let live_windows: HashSet<WindowId> = live.windows.iter().map(|w| w.id).collect();
    let pruned = windows.retain_windows(&live_windows);

    for tab in &live.tabs {
        if let Some(record) = items.get_mut(&tab.id) {
            let topology = windows.get(tab.window_id).cloned().unwrap_or_default();
            patch_membership(record, tab, &topology);
        }
    }

    Working {
        items,
        vanished,
        windows,
        base: state.windows.clone(),
        sorted: HashSet::new(),
        pruned,
    }
}

/// Containers a topology knows about, reserved or ordinary.
fn known_groups(topology: &WindowTopology) -> BTreeSet<GroupId> {
    topology
        .group_zones
        .keys()
        .copied()
        .chain(topology.aging_group)
        .chain(topology.stale_group)
        .collect()
}

fn classify_all(
    items: &mut BTreeMap<ItemId, ItemRecord>,
    settings: &Settings,
    activity_ms: u64,
    now: DateTime<Utc>,
) -> StatusCounts {
    let thresholds = settings.thresholds();
    let gates = settings.gates();
    let mut counts = StatusCounts::default();
    for record in items.values_mut() {
        record.status = if record.pinned {
            None
        } else {
            let age = item_age(record, activity_ms, now, settings.time_base);
            Some(classify(age, &thresholds, &gates))
        };
        counts.add(record.status);
    }
    counts
}

impl Working {
    fn statuses(&self, window: WindowId) -> HashMap<ItemId, Status> {
        self.items
            .values()
            .filter(|r| r.window_id == window)
            .filter_map(|r| r.status.map(|s| (r.id, s)))
            .collect()
    }

    fn apply(&mut self, window: WindowId, outcome: WindowOutcome) {
        for id in &outcome.evicted {
            self.items.remove(id);
            self.vanished.insert(*id);
        }
        for tab in &outcome.tabs {
            if let Some(record) = self.items.get_mut(&tab.id) {
                patch_membership(record, tab, &outcome.topology);
            }
        }
        self.windows.insert(window, outcome.topology);
        self.sorted.insert(window);
    }

    /// Write the pass result into the state as it is now. Only fields the
    /// pass owns are overwritten, so handler writes made while the pass ran
    /// survive: a record refreshed in the meantime keeps its fresh status,
    /// a window closed in the meantime stays closed and a container removed
    /// in the meantime stays forgotten.
    fn merge_into(self, current: &mut PersistedState, clock: ClockState, nonce: String) {
        let closed: HashSet<WindowId> = self
            .base
            .windows()
            .map(|(w, _)| *w)
            .filter(|w| current.windows.get(*w).is_none())
            .collect();

        for id in &self.vanished {
            current.items.remove(id);
        }
        for (id, record) in self.items {
            match current.items.get_mut(&id) {
                Some(existing) => {
                    let refreshed_meanwhile = existing.refreshed_at != record.refreshed_at
                        || existing.refreshed_activity_ms != record.refreshed_activity_ms;
                    existing.window_id = record.window_id;
                    existing.group_id = record.group_id;
                    existing.in_state_group = record.in_state_group;
                    existing.pinned = record.pinned;
                    if existing.pinned {
                        existing.status = None;
                    } else if !refreshed_meanwhile {
                        existing.status = record.status;
                    }
                }
                None if closed.contains(&record.window_id) => {}
                None => {
                    current.items.insert(id, record);
                }
            }
        }

        for window in &self.pruned {
            current.windows.remove_window(*window);
        }
        for window in &self.sorted {
            if closed.contains(window) {
                continue;
            }
            let Some(topology) = self.windows.get(*window).cloned() else {
                continue;
            };
            let forgotten: Vec<GroupId> =
                match (self.base.get(*window), current.windows.get(*window)) {
                    (Some(base), Some(now)) => known_groups(base)
                        .difference(&known_groups(now))
                        .copied()
                        .collect(),
                    _ => Vec::new(),
                };
            current.windows.insert(*window, topology);
            for group in forgotten {
                current.windows.forget_group(*window, group);
            }
        }
        current.clock = clock;
        current.runtime_nonce = Some(nonce);
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
