//! Topology store: per-window reserved containers and last-observed zones.
//!
//! Reserved ids are only ever set by the engine that created the container
//! (or carried across a restart by reconciliation). They are never inferred
//! from a container label, since labels collide after renames.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::{GroupId, WindowId, WindowTopology, Zone};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopologyStore {
    windows: BTreeMap<WindowId, WindowTopology>,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, window: WindowId) -> Option<&WindowTopology> {
        self.windows.get(&window)
    }

    /// Topology for `window`, created empty on first sight.
    pub fn ensure(&mut self, window: WindowId) -> &mut WindowTopology {
        self.windows.entry(window).or_default()
    }

    pub fn insert(&mut self, window: WindowId, topology: WindowTopology) {
        self.windows.insert(window, topology);
    }

    pub fn remove_window(&mut self, window: WindowId) -> Option<WindowTopology> {
        self.windows.remove(&window)
    }

    pub fn windows(&self) -> impl Iterator<Item = (&WindowId, &WindowTopology)> {
        self.windows.iter()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Whether `group` is a reserved container of `window`.
    pub fn is_state_group(&self, window: WindowId, group: GroupId) -> bool {
        self.windows
            .get(&window)
            .is_some_and(|t| t.is_state_group(group))
    }

    /// Forget a removed container: its zone entry and any reserved slot it held.
    /// Returns `true` if it was a reserved container.
    pub fn forget_group(&mut self, window: WindowId, group: GroupId) -> bool {
        let Some(topo) = self.windows.get_mut(&window) else {
            return false;
        };
        topo.group_zones.remove(&group);
        match topo.reserved_zone(group) {
            Some(zone) => {
                topo.set_state_group(zone, None);
                true
            }
            None => false,
        }
    }

    /// Record the zone a container was last observed in.
    pub fn record_zone(&mut self, window: WindowId, group: GroupId, zone: Zone) {
        self.ensure(window).group_zones.insert(group, zone);
    }

    /// Drop windows that no longer exist. Returns the pruned ids.
    pub fn retain_windows(&mut self, live: &HashSet<WindowId>) -> Vec<WindowId> {
        let gone: Vec<WindowId> = self
            .windows
            .keys()
            .filter(|w| !live.contains(w))
            .copied()
            .collect();
        for w in &gone {
            self.windows.remove(w);
        }
        gone
    }
}
