//! Zone ordering: the pure half of the zone-sorting engine.
//!
//! Computes container zones from member statuses and the desired
//! left-to-right container order for one window:
//!
//! ```text
//! [fresh: entered.. staying..] [aging-reserved entered.. staying..] [stale-reserved entered.. staying..]
//! ```
//!
//! "Entered" means the container's recorded zone differs from the zone
//! computed this pass (post-classification membership). Containers without a
//! recorded zone keep their relative position.

use std::collections::{BTreeMap, HashSet};

use crate::types::{GroupId, LiveTab, Status, WindowTopology, Zone};

/// Best (least-aged) zone among member statuses; `None` for no members.
pub fn best_zone(statuses: impl IntoIterator<Item = Status>) -> Option<Zone> {
    statuses.into_iter().min().map(Zone::of)
}

/// Container order as displayed, by the index of each container's first tab.
pub fn live_group_order(tabs: &[LiveTab]) -> Vec<GroupId> {
    let mut sorted: Vec<&LiveTab> = tabs.iter().collect();
    sorted.sort_by_key(|t| t.index);

    let mut seen = HashSet::new();
    sorted
        .into_iter()
        .filter_map(|t| t.group_id)
        .filter(|g| seen.insert(*g))
        .collect()
}

/// Zone of every ordinary container with at least one qualifying member.
///
/// Pinned tabs, tabs without a status and reserved containers are ignored.
pub fn ordinary_group_zones(
    tabs: &[LiveTab],
    status_of: impl Fn(&LiveTab) -> Option<Status>,
    topology: &WindowTopology,
) -> BTreeMap<GroupId, Zone> {
    let mut members: BTreeMap<GroupId, Vec<Status>> = BTreeMap::new();
    for tab in tabs {
        let Some(group) = tab.group_id else { continue };
        if tab.pinned || topology.is_state_group(group) {
            continue;
        }
        if let Some(status) = status_of(tab) {
            members.entry(group).or_default().push(status);
        }
    }
    members
        .into_iter()
        .filter_map(|(g, statuses)| best_zone(statuses).map(|z| (g, z)))
        .collect()
}

/// Desired left-to-right container order.
///
/// `live_order` is the current displayed order (reserved containers
/// included); `zones` holds the freshly computed zone of each ordinary
/// container; `topology` carries the reserved ids and last recorded zones.
pub fn desired_order(
    live_order: &[GroupId],
    zones: &BTreeMap<GroupId, Zone>,
    topology: &WindowTopology,
) -> Vec<GroupId> {
    let live: HashSet<GroupId> = live_order.iter().copied().collect();
    let mut out = Vec::with_capacity(live_order.len());

    for zone in Zone::ORDER {
        if let Some(reserved) = topology.state_group(zone)
            && live.contains(&reserved)
        {
            out.push(reserved);
        }

        let in_zone = live_order
            .iter()
            .copied()
            .filter(|g| zones.get(g) == Some(&zone));

        let (entered, staying): (Vec<GroupId>, Vec<GroupId>) =
            in_zone.partition(|g| matches!(topology.group_zones.get(g), Some(prev) if *prev != zone));

        out.extend(entered);
        out.extend(staying);
    }
    out
}

/// Live order restricted to the containers that take part in sorting.
pub fn sortable_live_order(live_order: &[GroupId], desired: &[GroupId]) -> Vec<GroupId> {
    let wanted: HashSet<GroupId> = desired.iter().copied().collect();
    live_order
        .iter()
        .copied()
        .filter(|g| wanted.contains(g))
        .collect()
}

/// Whether any container is out of place.
pub fn needs_reorder(live_order: &[GroupId], desired: &[GroupId]) -> bool {
    sortable_live_order(live_order, desired) != desired
}

/// Tab index at which a new reserved container for `zone` should sit:
/// immediately left of the first ordinary container already in that zone.
/// `None` means the tail.
pub fn reserved_insert_index(
    tabs: &[LiveTab],
    zones: &BTreeMap<GroupId, Zone>,
    zone: Zone,
) -> Option<usize> {
    tabs.iter()
        .filter(|t| t.group_id.and_then(|g| zones.get(&g)) == Some(&zone))
        .map(|t| t.index)
        .min()
}

// ─── Tests ───────────────────────────────────────────────────────────
