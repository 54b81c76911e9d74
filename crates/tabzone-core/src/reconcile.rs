//! Restart reconciliation: rebuild item/container/window maps from the live
//! host plus the last persisted state.
//!
//! Host identities are not stable across a restart, so matching is layered:
//!
//! 1. **Identity**: same item id and same URL.
//! 2. **Address**: same URL against persisted records not yet consumed. Each
//!    persisted record is consumed at most once.
//! 3. **Majority vote**: every matched item's persisted container/window id
//!    votes for the live container/window it now sits in. The highest-voted
//!    mapping wins; ties go to the lowest live id; each live id is adopted
//!    at most once.
//!
//! Unmatched live items start fresh. Persisted windows without a live
//! counterpart are dropped.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::topology::TopologyStore;
use crate::types::{
    GroupId, ItemId, ItemRecord, LiveGroup, LiveTab, LiveWindow, Status, WindowId, WindowTopology,
};

/// Everything the host currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    pub windows: Vec<LiveWindow>,
    pub tabs: Vec<LiveTab>,
    pub groups: Vec<LiveGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub matched_by_id: usize,
    pub matched_by_url: usize,
    pub fresh: usize,
    pub window_remaps: usize,
    pub group_remaps: usize,
    pub dropped_windows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub items: BTreeMap<ItemId, ItemRecord>,
    pub topology: TopologyStore,
    pub report: ReconcileReport,
}

pub fn reconcile(
    persisted_items: &BTreeMap<ItemId, ItemRecord>,
    persisted_topology: &TopologyStore,
    live: &LiveSnapshot,
    activity_ms: u64,
    now: DateTime<Utc>,
) -> Reconciled {
    let mut report = ReconcileReport::default();

    let mut tabs: Vec<&LiveTab> = live.tabs.iter().collect();
    tabs.sort_by_key(|t| (t.window_id, t.index));

    // ── 1. Identity matching ───────────────────────────────────────
    let mut consumed: HashSet<ItemId> = HashSet::new();
    let mut matched: Vec<(&LiveTab, &ItemRecord)> = Vec::new();
    let mut unmatched: Vec<&LiveTab> = Vec::new();

    for tab in tabs {
        match persisted_items.get(&tab.id) {
            Some(rec) if rec.url == tab.url => {
                consumed.insert(rec.id);
                matched.push((tab, rec));
                report.matched_by_id += 1;
            }
            _ => unmatched.push(tab),
        }
    }

    // ── 2. Address matching ────────────────────────────────────────
    let mut by_url: HashMap<&str, Vec<&ItemRecord>> = HashMap::new();
    for rec in persisted_items.values() {
        if !consumed.contains(&rec.id) && !rec.url.is_empty() {
            by_url.entry(rec.url.as_str()).or_default().push(rec);
        }
    }

    let mut fresh_tabs: Vec<&LiveTab> = Vec::new();
    for tab in unmatched {
        let candidate = by_url.get_mut(tab.url.as_str()).and_then(|recs| {
            let pos = recs.iter().position(|r| !consumed.contains(&r.id))?;
            Some(recs.remove(pos))
        });
        match candidate {
            Some(rec) => {
                consumed.insert(rec.id);
                matched.push((tab, rec));
                report.matched_by_url += 1;
            }
            None => fresh_tabs.push(tab),
        }
    }

    // ── 3. Majority-vote remapping ─────────────────────────────────
    let mut window_votes: BTreeMap<WindowId, BTreeMap<WindowId, u32>> = BTreeMap::new();
    let mut group_votes: BTreeMap<GroupId, BTreeMap<GroupId, u32>> = BTreeMap::new();
    for (tab, rec) in &matched {
        *window_votes
            .entry(rec.window_id)
            .or_default()
            .entry(tab.window_id)
            .or_default() += 1;
        if let (Some(old), Some(new)) = (rec.group_id, tab.group_id) {
            *group_votes.entry(old).or_default().entry(new).or_default() += 1;
        }
    }
    let window_map = adopt_majority(&window_votes);
    let group_map = adopt_majority(&group_votes);

    report.window_remaps = window_map.iter().filter(|(o, n)| o != n).count();
    report.group_remaps = group_map.iter().filter(|(o, n)| o != n).count();

    // ── 4. Topology carry-over ─────────────────────────────────────
    let live_groups: HashSet<(WindowId, GroupId)> =
        live.groups.iter().map(|g| (g.window_id, g.id)).collect();

    let mut topology = TopologyStore::new();
    for (old_window, old_topo) in persisted_topology.windows() {
        let Some(&new_window) = window_map.get(old_window) else {
            report.dropped_windows += 1;
            continue;
        };
        let carry = |g: GroupId| {
            group_map
                .get(&g)
                .copied()
                .filter(|n| live_groups.contains(&(new_window, *n)))
        };
        let remapped = WindowTopology {
            aging_group: old_topo.aging_group.and_then(carry),
            stale_group: old_topo.stale_group.and_then(carry),
            group_zones: old_topo
                .group_zones
                .iter()
                .filter_map(|(g, z)| carry(*g).map(|n| (n, *z)))
                .collect(),
        };
        topology.insert(new_window, remapped);
    }

    // ── 5. Records ─────────────────────────────────────────────────
    let mut items = BTreeMap::new();
    for (tab, rec) in matched {
        let status = if tab.pinned {
            None
        } else {
            Some(rec.status.unwrap_or(Status::Fresh))
        };
        items.insert(
            tab.id,
            ItemRecord {
                id: tab.id,
                window_id: tab.window_id,
                refreshed_activity_ms: rec.refreshed_activity_ms,
                refreshed_at: rec.refreshed_at,
                status,
                group_id: tab.group_id,
                in_state_group: in_state_group(&topology, tab),
                pinned: tab.pinned,
                url: tab.url.clone(),
            },
        );
    }
    for tab in fresh_tabs {
        let mut record = ItemRecord::fresh(tab, activity_ms, now);
        record.in_state_group = in_state_group(&topology, tab);
        items.insert(tab.id, record);
        report.fresh += 1;
    }

    Reconciled {
        items,
        topology,
        report,
    }
}

fn in_state_group(topology: &TopologyStore, tab: &LiveTab) -> bool {
    tab.group_id
        .is_some_and(|g| topology.is_state_group(tab.window_id, g))
}

/// Greedy one-to-one assignment by descending vote count.
fn adopt_majority<K>(votes: &BTreeMap<K, BTreeMap<K, u32>>) -> BTreeMap<K, K>
where
    K: Copy + Ord + Hash,
{
    let mut ballots: Vec<(u32, K, K)> = votes
        .iter()
        .flat_map(|(old, targets)| targets.iter().map(move |(new, n)| (*n, *old, *new)))
        .collect();
    ballots.sort_by(|a, b| b.0.cmp(&a.0).then(a.2.cmp(&b.2)).then(a.1.cmp(&b.1)));

    let mut mapping = BTreeMap::new();
    let mut taken = HashSet::new();
    for (_, old, new) in ballots {
        if mapping.contains_key(&old) || taken.contains(&new) {
            continue;
        }
        mapping.insert(old, new);
        taken.insert(new);
    }
    mapping
}

// ─── Tests ───────────────────────────────────────────────────────────
