//! Zone-sorting engine execution against a live host, one window at a time.
//!
//! Three passes, each re-reading the window so it acts on what the host
//! actually did:
//!
//! 1. ungrouped-item pass: loose tabs in and out of reserved containers
//! 2. eviction pass: only with an eviction sink
//! 3. container-zone pass: reorder containers, sync colors
//!
//! Host mutations that fail are logged and skipped; only the initial window
//! read can fail the whole run.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use tabzone_core::zone_order::{
    desired_order, live_group_order, needs_reorder, ordinary_group_zones, reserved_insert_index,
};
use tabzone_core::{
    GroupId, ItemId, LiveGroup, LiveTab, Settings, Status, WindowId, WindowTopology, Zone,
};
use tabzone_host::{GroupUpdate, HostError, Position, TabHost};

use crate::collab::{EvictionSink, GroupNamer};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SortReport {
    pub tabs_moved: usize,
    pub groups_created: usize,
    pub groups_released: usize,
    pub group_moves: usize,
    pub recolors: usize,
    pub renamed: usize,
    pub evicted_items: usize,
    pub evicted_groups: usize,
    pub host_errors: usize,
}

impl SortReport {
    pub fn merge(&mut self, other: &SortReport) {
        self.tabs_moved += other.tabs_moved;
        self.groups_created += other.groups_created;
        self.groups_released += other.groups_released;
        self.group_moves += other.group_moves;
        self.recolors += other.recolors;
        self.renamed += other.renamed;
        self.evicted_items += other.evicted_items;
        self.evicted_groups += other.evicted_groups;
        self.host_errors += other.host_errors;
    }

    /// Whether the run changed nothing on the host.
    pub fn is_noop(&self) -> bool {
        self.tabs_moved == 0
            && self.groups_created == 0
            && self.group_moves == 0
            && self.recolors == 0
            && self.renamed == 0
            && self.evicted_items == 0
            && self.evicted_groups == 0
    }
}

#[derive(Debug, Clone)]
pub struct WindowOutcome {
    pub topology: WindowTopology,
    /// Tabs of the window after every pass.
    pub tabs: Vec<LiveTab>,
    pub evicted: Vec<ItemId>,
    pub report: SortReport,
}

pub struct ZoneSorter<'a> {
    host: &'a dyn TabHost,
    settings: &'a Settings,
    eviction: Option<&'a dyn EvictionSink>,
    namer: Option<&'a dyn GroupNamer>,
}

struct Run<'a> {
    window: WindowId,
    statuses: &'a HashMap<ItemId, Status>,
    topology: WindowTopology,
    evicted: Vec<ItemId>,
    report: SortReport,
}

impl Run<'_> {
    fn status(&self, tab: &LiveTab) -> Option<Status> {
        if tab.pinned {
            return None;
        }
        self.statuses.get(&tab.id).copied()
    }

    fn zones(&self, tabs: &[LiveTab]) -> BTreeMap<GroupId, Zone> {
        ordinary_group_zones(tabs, |t| self.status(t), &self.topology)
    }

    fn host_failed(&mut self, op: &str, target: impl std::fmt::Display, e: &HostError) {
        self.report.host_errors += 1;
        tracing::warn!("{op} {target} in {} failed: {e}", self.window);
    }
}

impl<'a> ZoneSorter<'a> {
    pub fn new(host: &'a dyn TabHost, settings: &'a Settings) -> Self {
        Self {
            host,
            settings,
            eviction: None,
            namer: None,
        }
    }

    pub fn with_eviction(mut self, sink: Option<&'a dyn EvictionSink>) -> Self {
        self.eviction = sink;
        self
    }

    pub fn with_namer(mut self, namer: Option<&'a dyn GroupNamer>) -> Self {
        self.namer = namer;
        self
    }

    /// Run every enabled pass over `window`.
    ///
    /// `statuses` holds the computed status of each unpinned tracked tab;
    /// tabs missing from it take no part in zoning.
    pub fn run(
        &self,
        window: WindowId,
        statuses: &HashMap<ItemId, Status>,
        topology: WindowTopology,
    ) -> Result<WindowOutcome, HostError> {
        let mut run = Run {
            window,
            statuses,
            topology,
            evicted: Vec::new(),
            report: SortReport::default(),
        };

        let groups = self.host.groups(window)?;
        self.forget_vanished_reserved(&mut run, &groups);

        if self.settings.auto_group_enabled {
            self.ungrouped_pass(&mut run)?;
        }
        if let Some(sink) = self.eviction {
            self.eviction_pass(&mut run, sink)?;
        }
        self.release_empty_reserved(&mut run)?;
        self.zone_pass(&mut run)?;
        if let Some(namer) = self.namer {
            self.naming_pass(&mut run, namer)?;
        }

        let tabs = self.host.tabs(window)?;
        Ok(WindowOutcome {
            topology: run.topology,
            tabs,
            evicted: run.evicted,
            report: run.report,
        })
    }

    fn forget_vanished_reserved(&self, run: &mut Run<'_>, groups: &[LiveGroup]) {
        let live: HashSet<GroupId> = groups.iter().map(|g| g.id).collect();
        for zone in [Zone::Aging, Zone::Stale] {
            if let Some(g) = run.topology.state_group(zone)
                && !live.contains(&g)
            {
                tracing::debug!("reserved {zone} container {g} no longer exists");
                run.topology.set_state_group(zone, None);
            }
        }
    }

    // ─── 1. Ungrouped-item pass ──────────────────────────────────────

    fn ungrouped_pass(&self, run: &mut Run<'_>) -> Result<(), HostError> {
        let tabs = self.host.tabs(run.window)?;

        for tab in &tabs {
            let current = match tab.group_id {
                None => Zone::Fresh,
                Some(g) => match run.topology.reserved_zone(g) {
                    Some(zone) => zone,
                    None => continue,
                },
            };
            let Some(status) = run.status(tab) else {
                continue;
            };
            if status == Status::Expired && self.eviction.is_some() {
                continue;
            }
            let desired = Zone::of(status);
            if desired == current {
                continue;
            }

            match desired {
                Zone::Fresh => self.extract_to_front(run, tab.id),
                Zone::Aging | Zone::Stale => self.move_into_reserved(run, tab.id, desired)?,
            }
        }
        Ok(())
    }

    fn extract_to_front(&self, run: &mut Run<'_>, tab: ItemId) {
        if let Err(e) = self.host.ungroup_tabs(&[tab]) {
            run.host_failed("ungroup", tab, &e);
            return;
        }
        let front = match self.host.tabs(run.window) {
            Ok(tabs) => tabs.iter().take_while(|t| t.pinned).count(),
            Err(e) => {
                run.host_failed("list tabs for", tab, &e);
                return;
            }
        };
        match self.host.move_tab(tab, Position::At(front)) {
            Ok(()) => run.report.tabs_moved += 1,
            Err(e) => run.host_failed("move", tab, &e),
        }
    }

    fn move_into_reserved(
        &self,
        run: &mut Run<'_>,
        tab: ItemId,
        zone: Zone,
    ) -> Result<(), HostError> {
        if let Some(reserved) = run.topology.state_group(zone) {
            match self.host.group_tabs(&[tab], Some(reserved)) {
                Ok(_) => run.report.tabs_moved += 1,
                Err(e) => run.host_failed("group", tab, &e),
            }
            return Ok(());
        }

        let group = match self.host.group_tabs(&[tab], None) {
            Ok(g) => g,
            Err(e) => {
                run.host_failed("create reserved container with", tab, &e);
                return Ok(());
            }
        };
        run.topology.set_state_group(zone, Some(group));
        run.report.groups_created += 1;
        run.report.tabs_moved += 1;
        tracing::info!("created reserved {zone} container {group} in {}", run.window);

        let update = GroupUpdate {
            title: Some(self.settings.title_for(zone).to_string()),
            color: Some(self.settings.color_for(zone)),
        };
        if let Err(e) = self.host.update_group(group, &update) {
            run.host_failed("label", group, &e);
        }

        // Index among the tabs that stay put while the container moves
        let rest: Vec<LiveTab> = self
            .host
            .tabs(run.window)?
            .into_iter()
            .filter(|t| t.group_id != Some(group))
            .enumerate()
            .map(|(index, t)| LiveTab { index, ..t })
            .collect();
        let to = reserved_insert_index(&rest, &run.zones(&rest), zone)
            .map_or(Position::End, Position::At);
        if let Err(e) = self.host.move_group(group, to) {
            run.host_failed("place", group, &e);
        }
        Ok(())
    }

    // ─── 2. Eviction pass ────────────────────────────────────────────

    fn eviction_pass(&self, run: &mut Run<'_>, sink: &dyn EvictionSink) -> Result<(), HostError> {
        let tabs = self.host.tabs(run.window)?;
        let groups = self.host.groups(run.window)?;

        // Loose tabs and reserved-container members go one by one
        let mut declined = Vec::new();
        for tab in &tabs {
            let ordinary = tab
                .group_id
                .is_some_and(|g| !run.topology.is_state_group(g));
            if ordinary || run.status(tab) != Some(Status::Expired) {
                continue;
            }
            if let Err(e) = sink.evict_item(tab) {
                tracing::warn!("eviction of {} declined: {e}", tab.id);
                declined.push(tab);
                continue;
            }
            match self.host.remove_tabs(&[tab.id]) {
                Ok(()) => {
                    run.report.evicted_items += 1;
                    run.evicted.push(tab.id);
                }
                Err(e) => run.host_failed("remove", tab.id, &e),
            }
        }

        // Ordinary containers go whole, and only when every member expired
        let ordinary: Vec<&LiveGroup> = groups
            .iter()
            .filter(|g| !run.topology.is_state_group(g.id))
            .collect();
        for group in ordinary {
            let members: Vec<LiveTab> = tabs
                .iter()
                .filter(|t| t.group_id == Some(group.id) && !t.pinned)
                .cloned()
                .collect();
            if members.is_empty()
                || !members
                    .iter()
                    .all(|t| run.status(t) == Some(Status::Expired))
            {
                continue;
            }
            if let Err(e) = sink.evict_group(group, &members) {
                tracing::warn!("eviction of {} declined: {e}", group.id);
                continue;
            }
            let ids: Vec<ItemId> = members.iter().map(|t| t.id).collect();
            match self.host.remove_tabs(&ids) {
                Ok(()) => {
                    run.report.evicted_groups += 1;
                    run.report.evicted_items += ids.len();
                    run.evicted.extend(ids);
                    run.topology.group_zones.remove(&group.id);
                }
                Err(e) => run.host_failed("remove", group.id, &e),
            }
        }

        // Declined tabs wait in the stale zone until a later pass
        if self.settings.auto_group_enabled {
            for tab in declined {
                let zone = tab.group_id.and_then(|g| run.topology.reserved_zone(g));
                if zone != Some(Zone::Stale) {
                    self.move_into_reserved(run, tab.id, Zone::Stale)?;
                }
            }
        }
        Ok(())
    }

    fn release_empty_reserved(&self, run: &mut Run<'_>) -> Result<(), HostError> {
        let tabs = self.host.tabs(run.window)?;
        for zone in [Zone::Aging, Zone::Stale] {
            let Some(g) = run.topology.state_group(zone) else {
                continue;
            };
            if !tabs.iter().any(|t| t.group_id == Some(g)) {
                tracing::debug!("released empty reserved {zone} container {g}");
                run.topology.set_state_group(zone, None);
                run.report.groups_released += 1;
            }
        }
        Ok(())
    }

    // ─── 3. Container-zone pass ──────────────────────────────────────

    fn zone_pass(&self, run: &mut Run<'_>) -> Result<(), HostError> {
        let tabs = self.host.tabs(run.window)?;
        let zones = run.zones(&tabs);

        if self.settings.sorting_enabled {
            let live = live_group_order(&tabs);
            let desired = desired_order(&live, &zones, &run.topology);
            if needs_reorder(&live, &desired) {
                tracing::debug!("reordering {} containers in {}", desired.len(), run.window);
                for g in desired {
                    match self.host.move_group(g, Position::End) {
                        Ok(()) => run.report.group_moves += 1,
                        Err(e) => run.host_failed("reposition", g, &e),
                    }
                }
            }
        }

        if self.settings.coloring_enabled {
            for group in self.host.groups(run.window)? {
                let Some(zone) = zones.get(&group.id) else {
                    continue;
                };
                let color = self.settings.color_for(*zone);
                if group.color == color {
                    continue;
                }
                let update = GroupUpdate {
                    title: None,
                    color: Some(color),
                };
                match self.host.update_group(group.id, &update) {
                    Ok(()) => run.report.recolors += 1,
                    Err(e) => run.host_failed("recolor", group.id, &e),
                }
            }
        }

        run.topology.group_zones = zones;
        Ok(())
    }

    fn naming_pass(&self, run: &mut Run<'_>, namer: &dyn GroupNamer) -> Result<(), HostError> {
        let tabs = self.host.tabs(run.window)?;
        for group in self.host.groups(run.window)? {
            if !group.title.is_empty() || run.topology.is_state_group(group.id) {
                continue;
            }
            let members: Vec<LiveTab> = tabs
                .iter()
                .filter(|t| t.group_id == Some(group.id))
                .cloned()
                .collect();
            let Some(title) = namer.name(&group, &members) else {
                continue;
            };
            let update = GroupUpdate {
                title: Some(title),
                color: None,
            };
            match self.host.update_group(group.id, &update) {
                Ok(()) => run.report.renamed += 1,
                Err(e) => run.host_failed("rename", group.id, &e),
            }
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::testing::{FirstTitleNamer, RecordingEviction};
    use tabzone_core::{GroupColor, LiveWindow};
    use tabzone_host::{HostLayout, HostOp, MemoryHost, OpKind};

    /// Window 1 built from `(tab id, group id)` in display order.
    fn host(entries: &[(u64, Option<u64>)]) -> MemoryHost {
        let tabs = entries
            .iter()
            .enumerate()
            .map(|(index, (id, group))| LiveTab {
                id: ItemId(*id),
                window_id: WindowId(1),
                index,
                pinned: false,
                group_id: group.map(GroupId),
                url: format!("https://t{id}.test/"),
                title: format!("Tab {id}"),
            })
            .collect();
        let mut ids: Vec<u64> = entries.iter().filter_map(|(_, g)| *g).collect();
        ids.sort_unstable();
        ids.dedup();
        MemoryHost::new(HostLayout {
            windows: vec![LiveWindow {
                id: WindowId(1),
                focused: true,
            }],
            tabs,
            groups: ids
                .into_iter()
                .map(|g| LiveGroup {
                    id: GroupId(g),
                    window_id: WindowId(1),
                    title: format!("g{g}"),
                    color: GroupColor::Grey,
                })
                .collect(),
            next_group_id: 100,
        })
    }

    fn statuses(entries: &[(u64, Status)]) -> HashMap<ItemId, Status> {
        entries.iter().map(|(id, s)| (ItemId(*id), *s)).collect()
    }

    fn group_moves(ops: &[HostOp]) -> Vec<GroupId> {
        ops.iter()
            .filter_map(|op| match op {
                HostOp::MoveGroup { group, .. } => Some(*group),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn unsorted_window_gets_three_repositions_in_order() {
        // A(10):stale  B(20):fresh  C(30):aging
        let h = host(&[(1, Some(10)), (2, Some(20)), (3, Some(30))]);
        let settings = Settings::default();
        let st = statuses(&[(1, Status::Stale), (2, Status::Fresh), (3, Status::Aging)]);

        let out = ZoneSorter::new(&h, &settings)
            .run(WindowId(1), &st, WindowTopology::default())
            .expect("run");

        assert_eq!(
            group_moves(&h.ops()),
            vec![GroupId(20), GroupId(30), GroupId(10)]
        );
        assert_eq!(out.report.group_moves, 3);
        assert_eq!(out.topology.group_zones[&GroupId(10)], Zone::Stale);
    }

    #[test]
    fn sorted_window_issues_no_repositions() {
        let h = host(&[(2, Some(20)), (3, Some(30)), (1, Some(10))]);
        let mut settings = Settings::default();
        settings.coloring_enabled = false;
        let st = statuses(&[(1, Status::Stale), (2, Status::Fresh), (3, Status::Aging)]);

        let out = ZoneSorter::new(&h, &settings)
            .run(WindowId(1), &st, WindowTopology::default())
            .expect("run");
        assert!(h.ops().is_empty());
        assert!(out.report.is_noop());
    }

    #[test]
    fn second_run_is_idle() {
        let h = host(&[(1, Some(10)), (2, None), (3, Some(20)), (4, None)]);
        let settings = Settings::default();
        let st = statuses(&[
            (1, Status::Stale),
            (2, Status::Aging),
            (3, Status::Fresh),
            (4, Status::Stale),
        ]);
        let sorter = ZoneSorter::new(&h, &settings);

        let first = sorter
            .run(WindowId(1), &st, WindowTopology::default())
            .expect("first");
        assert!(!first.report.is_noop());

        h.take_ops();
        let second = sorter.run(WindowId(1), &st, first.topology).expect("second");
        assert!(h.ops().is_empty(), "unexpected ops: {:?}", h.ops());
        assert!(second.report.is_noop());
    }

    #[test]
    fn aging_loose_tab_creates_reserved_container() {
        let h = host(&[(1, None), (2, Some(10))]);
        let settings = Settings::default();
        let st = statuses(&[(1, Status::Aging), (2, Status::Fresh)]);

        let out = ZoneSorter::new(&h, &settings)
            .run(WindowId(1), &st, WindowTopology::default())
            .expect("run");

        let reserved = out.topology.aging_group.expect("reserved aging container");
        assert_eq!(out.report.groups_created, 1);
        let tab = out.tabs.iter().find(|t| t.id == ItemId(1)).expect("tab");
        assert_eq!(tab.group_id, Some(reserved));

        let group = h
            .groups(WindowId(1))
            .expect("groups")
            .into_iter()
            .find(|g| g.id == reserved)
            .expect("group");
        assert_eq!(group.title, "Aging");
        assert_eq!(group.color, GroupColor::Yellow);
        // Fresh container stays left of the aging zone
        assert_eq!(live_group_order(&out.tabs), vec![GroupId(10), reserved]);
    }

    #[test]
    fn reserved_container_is_placed_before_zone_peers() {
        // fresh(10) aging(20) aging(30), loose aging tab at the end
        let h = host(&[(1, Some(10)), (2, Some(20)), (3, Some(30)), (4, None)]);
        let mut settings = Settings::default();
        settings.sorting_enabled = false;
        let st = statuses(&[
            (1, Status::Fresh),
            (2, Status::Aging),
            (3, Status::Aging),
            (4, Status::Aging),
        ]);

        let out = ZoneSorter::new(&h, &settings)
            .run(WindowId(1), &st, WindowTopology::default())
            .expect("run");
        let reserved = out.topology.aging_group.expect("reserved");
        assert_eq!(
            live_group_order(&out.tabs),
            vec![GroupId(10), reserved, GroupId(20), GroupId(30)]
        );
    }

    #[test]
    fn fresh_tab_leaves_reserved_container_to_the_front() {
        let h = host(&[(1, None), (2, Some(50)), (3, Some(50))]);
        let settings = Settings::default();
        let topo = WindowTopology {
            stale_group: Some(GroupId(50)),
            ..WindowTopology::default()
        };
        let st = statuses(&[(1, Status::Fresh), (2, Status::Stale), (3, Status::Fresh)]);

        let out = ZoneSorter::new(&h, &settings)
            .run(WindowId(1), &st, topo)
            .expect("run");
        assert_eq!(out.tabs[0].id, ItemId(3));
        assert_eq!(out.tabs[0].group_id, None);
        assert_eq!(out.topology.stale_group, Some(GroupId(50)));
    }

    #[test]
    fn emptied_reserved_container_is_released() {
        let h = host(&[(1, Some(50))]);
        let settings = Settings::default();
        let topo = WindowTopology {
            aging_group: Some(GroupId(50)),
            ..WindowTopology::default()
        };
        let st = statuses(&[(1, Status::Fresh)]);

        let out = ZoneSorter::new(&h, &settings)
            .run(WindowId(1), &st, topo)
            .expect("run");
        assert_eq!(out.topology.aging_group, None);
        assert_eq!(out.report.groups_released, 1);
    }

    #[test]
    fn pinned_tabs_are_untouched() {
        let mut layout = host(&[(1, None), (2, None)]).layout();
        layout.tabs[0].pinned = true;
        let h = MemoryHost::new(layout);
        let settings = Settings::default();
        let st = statuses(&[(1, Status::Stale), (2, Status::Fresh)]);

        let out = ZoneSorter::new(&h, &settings)
            .run(WindowId(1), &st, WindowTopology::default())
            .expect("run");
        assert!(h.ops().is_empty());
        assert!(out.topology.stale_group.is_none());
    }

    #[test]
    fn disabled_auto_group_leaves_loose_tabs() {
        let h = host(&[(1, None)]);
        let mut settings = Settings::default();
        settings.auto_group_enabled = false;
        let st = statuses(&[(1, Status::Stale)]);

        ZoneSorter::new(&h, &settings)
            .run(WindowId(1), &st, WindowTopology::default())
            .expect("run");
        assert!(h.ops().is_empty());
    }

    #[test]
    fn container_evicted_only_when_all_members_expired() {
        let h = host(&[(1, Some(10)), (2, Some(10)), (3, Some(20)), (4, Some(20))]);
        let settings = Settings::default();
        let st = statuses(&[
            (1, Status::Expired),
            (2, Status::Fresh),
            (3, Status::Expired),
            (4, Status::Expired),
        ]);
        let sink = RecordingEviction::default();

        let out = ZoneSorter::new(&h, &settings)
            .with_eviction(Some(&sink))
            .run(WindowId(1), &st, WindowTopology::default())
            .expect("run");

        assert_eq!(*sink.groups.lock().expect("lock"), vec![GroupId(20)]);
        assert!(sink.items.lock().expect("lock").is_empty());
        assert_eq!(out.evicted, vec![ItemId(3), ItemId(4)]);
        let left: Vec<ItemId> = out.tabs.iter().map(|t| t.id).collect();
        assert_eq!(left, vec![ItemId(1), ItemId(2)]);
    }

    #[test]
    fn expired_loose_tab_is_evicted_not_grouped() {
        let h = host(&[(1, None), (2, None)]);
        let settings = Settings::default();
        let st = statuses(&[(1, Status::Expired), (2, Status::Fresh)]);
        let sink = RecordingEviction::default();

        let out = ZoneSorter::new(&h, &settings)
            .with_eviction(Some(&sink))
            .run(WindowId(1), &st, WindowTopology::default())
            .expect("run");
        assert_eq!(*sink.items.lock().expect("lock"), vec![ItemId(1)]);
        assert_eq!(out.report.groups_created, 0);
        assert_eq!(out.tabs.len(), 1);
    }

    #[test]
    fn stale_tab_moves_from_aging_to_new_stale_container() {
        let h = host(&[(1, Some(50))]);
        let settings = Settings::default();
        let topo = WindowTopology {
            aging_group: Some(GroupId(50)),
            ..WindowTopology::default()
        };
        let st = statuses(&[(1, Status::Stale)]);

        let out = ZoneSorter::new(&h, &settings)
            .run(WindowId(1), &st, topo)
            .expect("run");

        let stale = out.topology.stale_group.expect("reserved stale container");
        assert_ne!(stale, GroupId(50));
        assert_eq!(out.tabs[0].group_id, Some(stale));
        assert_eq!(out.topology.aging_group, None);
        assert_eq!(out.report.groups_created, 1);
        assert_eq!(out.report.groups_released, 1);
    }

    #[test]
    fn expired_member_of_reserved_container_is_evicted_alone() {
        let h = host(&[(1, Some(50)), (2, Some(50))]);
        let settings = Settings::default();
        let topo = WindowTopology {
            stale_group: Some(GroupId(50)),
            ..WindowTopology::default()
        };
        let st = statuses(&[(1, Status::Expired), (2, Status::Stale)]);
        let sink = RecordingEviction::default();

        let out = ZoneSorter::new(&h, &settings)
            .with_eviction(Some(&sink))
            .run(WindowId(1), &st, topo)
            .expect("run");

        assert_eq!(*sink.items.lock().expect("lock"), vec![ItemId(1)]);
        assert!(sink.groups.lock().expect("lock").is_empty());
        assert_eq!(out.evicted, vec![ItemId(1)]);
        assert_eq!(out.tabs.len(), 1);
        assert_eq!(out.tabs[0].group_id, Some(GroupId(50)));
        assert_eq!(out.topology.stale_group, Some(GroupId(50)));
    }

    #[test]
    fn declined_eviction_falls_back_to_stale_container() {
        let h = host(&[(1, Some(50)), (2, None)]);
        let settings = Settings::default();
        let topo = WindowTopology {
            aging_group: Some(GroupId(50)),
            ..WindowTopology::default()
        };
        let st = statuses(&[(1, Status::Expired), (2, Status::Fresh)]);
        let sink = RecordingEviction {
            refuse: true,
            ..RecordingEviction::default()
        };
        let sorter = ZoneSorter::new(&h, &settings).with_eviction(Some(&sink));

        let out = sorter.run(WindowId(1), &st, topo).expect("run");
        assert!(out.evicted.is_empty());
        let stale = out.topology.stale_group.expect("reserved stale container");
        let tab = out.tabs.iter().find(|t| t.id == ItemId(1)).expect("tab");
        assert_eq!(tab.group_id, Some(stale));
        assert_eq!(out.topology.aging_group, None);

        // Already in the stale zone: a later refusal moves nothing
        h.take_ops();
        let again = sorter.run(WindowId(1), &st, out.topology).expect("run");
        assert_eq!(again.report.tabs_moved, 0);
        assert_eq!(again.topology.stale_group, Some(stale));
    }

    #[test]
    fn declined_eviction_keeps_the_tab() {
        let h = host(&[(1, None)]);
        let settings = Settings::default();
        let st = statuses(&[(1, Status::Expired)]);
        let sink = RecordingEviction {
            refuse: true,
            ..RecordingEviction::default()
        };

        let out = ZoneSorter::new(&h, &settings)
            .with_eviction(Some(&sink))
            .run(WindowId(1), &st, WindowTopology::default())
            .expect("run");
        assert!(out.evicted.is_empty());
        assert_eq!(out.tabs.len(), 1);
    }

    #[test]
    fn without_sink_expired_tab_joins_stale_zone() {
        let h = host(&[(1, None)]);
        let settings = Settings::default();
        let st = statuses(&[(1, Status::Expired)]);

        let out = ZoneSorter::new(&h, &settings)
            .run(WindowId(1), &st, WindowTopology::default())
            .expect("run");
        assert!(out.topology.stale_group.is_some());
        assert!(out.evicted.is_empty());
    }

    #[test]
    fn failed_reposition_is_skipped_not_fatal() {
        let h = host(&[(1, Some(10)), (2, Some(20))]);
        h.fail_on(OpKind::MoveGroup);
        let settings = Settings::default();
        let st = statuses(&[(1, Status::Stale), (2, Status::Fresh)]);

        let out = ZoneSorter::new(&h, &settings)
            .run(WindowId(1), &st, WindowTopology::default())
            .expect("run");
        assert_eq!(out.report.host_errors, 2);
        assert_eq!(out.report.group_moves, 0);
        assert_eq!(out.report.recolors, 2);
    }

    #[test]
    fn colors_follow_zone() {
        let h = host(&[(1, Some(10)), (2, Some(20))]);
        let settings = Settings::default();
        let st = statuses(&[(1, Status::Fresh), (2, Status::Stale)]);

        ZoneSorter::new(&h, &settings)
            .run(WindowId(1), &st, WindowTopology::default())
            .expect("run");
        let colors: HashMap<GroupId, GroupColor> = h
            .groups(WindowId(1))
            .expect("groups")
            .into_iter()
            .map(|g| (g.id, g.color))
            .collect();
        assert_eq!(colors[&GroupId(10)], GroupColor::Green);
        assert_eq!(colors[&GroupId(20)], GroupColor::Red);
    }

    #[test]
    fn namer_labels_untitled_ordinary_containers() {
        let mut layout = host(&[(1, Some(10)), (2, Some(20))]).layout();
        for g in &mut layout.groups {
            g.title.clear();
        }
        let h = MemoryHost::new(layout);
        let mut settings = Settings::default();
        settings.coloring_enabled = false;
        let st = statuses(&[(1, Status::Fresh), (2, Status::Fresh)]);

        let out = ZoneSorter::new(&h, &settings)
            .with_namer(Some(&FirstTitleNamer))
            .run(WindowId(1), &st, WindowTopology::default())
            .expect("run");
        assert_eq!(out.report.renamed, 2);
        let titles: Vec<String> = h
            .groups(WindowId(1))
            .expect("groups")
            .into_iter()
            .map(|g| g.title)
            .collect();
        assert!(titles.contains(&"Tab 1".to_string()));
    }

    #[test]
    fn unreadable_window_fails_the_run() {
        let h = host(&[(1, None)]);
        h.fail_on(OpKind::Query);
        let settings = Settings::default();
        let st = HashMap::new();
        assert!(
            ZoneSorter::new(&h, &settings)
                .run(WindowId(1), &st, WindowTopology::default())
                .is_err()
        );
    }
}
