//! In-process host that keeps the browser's layout rules.
//!
//! Used by tests and by the `pass`/`daemon` simulator commands, which load a
//! [`HostLayout`] from JSON and write it back after a pass.
//!
//! Layout rules kept after every mutation:
//! - pinned tabs come first and are never grouped
//! - a group's tabs are contiguous; an insertion never lands inside a group
//! - a group with no tabs ceases to exist
//! - a tab moved on its own leaves its group

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tabzone_core::{GroupColor, GroupId, ItemId, LiveGroup, LiveTab, LiveWindow, WindowId};

use crate::error::HostError;
use crate::host::{GroupUpdate, Position, TabHost};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostLayout {
    #[serde(default)]
    pub windows: Vec<LiveWindow>,
    #[serde(default)]
    pub tabs: Vec<LiveTab>,
    #[serde(default)]
    pub groups: Vec<LiveGroup>,
    #[serde(default)]
    pub next_group_id: u64,
}

impl HostLayout {
    /// Tabs of `window` in display order.
    pub fn window_tabs(&self, window: WindowId) -> Vec<&LiveTab> {
        let mut tabs: Vec<&LiveTab> = self.tabs.iter().filter(|t| t.window_id == window).collect();
        tabs.sort_by_key(|t| t.index);
        tabs
    }

    fn normalize(&mut self) {
        let windows: Vec<WindowId> = self.windows.iter().map(|w| w.id).collect();
        self.tabs.retain(|t| windows.contains(&t.window_id));
        for w in windows {
            let mut list = self.take_window(w);
            // stable: keeps relative order within each class
            list.sort_by_key(|t| !t.pinned);
            for t in list.iter_mut().filter(|t| t.pinned) {
                t.group_id = None;
            }
            self.put_window(list);
        }
        let max_group = self.groups.iter().map(|g| g.id.0 + 1).max().unwrap_or(1);
        self.next_group_id = self.next_group_id.max(max_group);
    }

    fn take_window(&mut self, window: WindowId) -> Vec<LiveTab> {
        let (mut mine, rest): (Vec<LiveTab>, Vec<LiveTab>) = std::mem::take(&mut self.tabs)
            .into_iter()
            .partition(|t| t.window_id == window);
        self.tabs = rest;
        mine.sort_by_key(|t| t.index);
        mine
    }

    fn put_window(&mut self, mut list: Vec<LiveTab>) {
        for (i, t) in list.iter_mut().enumerate() {
            t.index = i;
        }
        self.tabs.extend(list);
        let used: HashSet<GroupId> = self.tabs.iter().filter_map(|t| t.group_id).collect();
        self.groups.retain(|g| used.contains(&g.id));
    }

    fn tab(&self, id: ItemId) -> Result<&LiveTab, HostError> {
        self.tabs
            .iter()
            .find(|t| t.id == id)
            .ok_or(HostError::TabNotFound(id))
    }

    fn group(&self, id: GroupId) -> Result<&LiveGroup, HostError> {
        self.groups
            .iter()
            .find(|g| g.id == id)
            .ok_or(HostError::GroupNotFound(id))
    }

    fn has_window(&self, window: WindowId) -> Result<(), HostError> {
        if self.windows.iter().any(|w| w.id == window) {
            Ok(())
        } else {
            Err(HostError::WindowNotFound(window))
        }
    }
}

/// Insert `block` at `to`, clamped to the pinned/unpinned boundary and
/// pushed past any group it would otherwise split.
fn insert_block(list: &mut Vec<LiveTab>, block: Vec<LiveTab>, to: Position) {
    let Some(first) = block.first() else {
        return;
    };
    let pinned = list.iter().take_while(|t| t.pinned).count();
    let mut at = match to {
        Position::At(i) => i.min(list.len()),
        Position::End => list.len(),
    };
    at = if first.pinned {
        at.min(pinned)
    } else {
        at.max(pinned)
    };
    if at > 0
        && let Some(g) = list[at - 1].group_id
    {
        while at < list.len() && list[at].group_id == Some(g) {
            at += 1;
        }
    }
    list.splice(at..at, block);
}

// ─── Op log & failure injection ──────────────────────────────────────

/// A mutation the host accepted, in call order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostOp {
    MoveTab {
        tab: ItemId,
        to: Position,
    },
    GroupTabs {
        tabs: Vec<ItemId>,
        into: Option<GroupId>,
        group: GroupId,
    },
    UngroupTabs {
        tabs: Vec<ItemId>,
    },
    UpdateGroup {
        group: GroupId,
        update: GroupUpdate,
    },
    MoveGroup {
        group: GroupId,
        to: Position,
    },
    RemoveTabs {
        tabs: Vec<ItemId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Query,
    MoveTab,
    GroupTabs,
    UngroupTabs,
    UpdateGroup,
    MoveGroup,
    RemoveTabs,
}

#[derive(Debug, Default)]
struct State {
    layout: HostLayout,
    ops: Vec<HostOp>,
    failing: HashSet<OpKind>,
}

impl State {
    fn check(&self, kind: OpKind, op: &'static str) -> Result<(), HostError> {
        if self.failing.contains(&kind) {
            return Err(HostError::Rejected {
                op,
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

// ─── MemoryHost ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryHost {
    state: Mutex<State>,
}

impl MemoryHost {
    pub fn new(mut layout: HostLayout) -> Self {
        layout.normalize();
        Self {
            state: Mutex::new(State {
                layout,
                ..State::default()
            }),
        }
    }

    pub fn load(path: &Path) -> Result<Self, HostError> {
        let content = std::fs::read_to_string(path)?;
        let layout: HostLayout = serde_json::from_str(&content)?;
        Ok(Self::new(layout))
    }

    pub fn save(&self, path: &Path) -> Result<(), HostError> {
        let json = serde_json::to_string_pretty(&self.layout())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn layout(&self) -> HostLayout {
        self.lock().layout.clone()
    }

    /// Mutations accepted so far.
    pub fn ops(&self) -> Vec<HostOp> {
        self.lock().ops.clone()
    }

    pub fn take_ops(&self) -> Vec<HostOp> {
        std::mem::take(&mut self.lock().ops)
    }

    /// Make every call of `kind` fail until [`Self::clear_failures`].
    pub fn fail_on(&self, kind: OpKind) {
        self.lock().failing.insert(kind);
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    /// Open a tab at `tab.index` (the browser creating one).
    pub fn add_tab(&self, tab: LiveTab) -> Result<(), HostError> {
        let mut st = self.lock();
        st.layout.has_window(tab.window_id)?;
        let index = tab.index;
        let mut list = st.layout.take_window(tab.window_id);
        insert_block(&mut list, vec![tab], Position::At(index));
        st.layout.put_window(list);
        Ok(())
    }

    /// Load a new address in an existing tab.
    pub fn navigate(&self, tab: ItemId, url: &str) -> Result<(), HostError> {
        let mut st = self.lock();
        let t = st
            .layout
            .tabs
            .iter_mut()
            .find(|t| t.id == tab)
            .ok_or(HostError::TabNotFound(tab))?;
        t.url = url.to_string();
        Ok(())
    }

    pub fn set_focused(&self, window: Option<WindowId>) {
        for w in &mut self.lock().layout.windows {
            w.focused = Some(w.id) == window;
        }
    }
}

impl TabHost for MemoryHost {
    fn windows(&self) -> Result<Vec<LiveWindow>, HostError> {
        let st = self.lock();
        st.check(OpKind::Query, "windows")?;
        Ok(st.layout.windows.clone())
    }

    fn tabs(&self, window: WindowId) -> Result<Vec<LiveTab>, HostError> {
        let st = self.lock();
        st.check(OpKind::Query, "tabs")?;
        st.layout.has_window(window)?;
        Ok(st.layout.window_tabs(window).into_iter().cloned().collect())
    }

    fn groups(&self, window: WindowId) -> Result<Vec<LiveGroup>, HostError> {
        let st = self.lock();
        st.check(OpKind::Query, "groups")?;
        st.layout.has_window(window)?;
        Ok(st
            .layout
            .groups
            .iter()
            .filter(|g| g.window_id == window)
            .cloned()
            .collect())
    }

    fn move_tab(&self, tab: ItemId, to: Position) -> Result<(), HostError> {
        let mut st = self.lock();
        st.check(OpKind::MoveTab, "move_tab")?;
        let window = st.layout.tab(tab)?.window_id;

        let mut list = st.layout.take_window(window);
        if let Some(pos) = list.iter().position(|t| t.id == tab) {
            let mut moved = list.remove(pos);
            moved.group_id = None;
            insert_block(&mut list, vec![moved], to);
        }
        st.layout.put_window(list);
        st.ops.push(HostOp::MoveTab { tab, to });
        Ok(())
    }

    fn group_tabs(&self, tabs: &[ItemId], into: Option<GroupId>) -> Result<GroupId, HostError> {
        let mut st = self.lock();
        st.check(OpKind::GroupTabs, "group_tabs")?;
        let Some(&first) = tabs.first() else {
            return Err(HostError::Rejected {
                op: "group_tabs",
                reason: "no tabs given".to_string(),
            });
        };
        let window = st.layout.tab(first)?.window_id;
        for id in tabs {
            let t = st.layout.tab(*id)?;
            if t.window_id != window || t.pinned {
                return Err(HostError::Rejected {
                    op: "group_tabs",
                    reason: format!("{id} is pinned or in another window"),
                });
            }
        }
        if let Some(g) = into
            && st.layout.group(g)?.window_id != window
        {
            return Err(HostError::Rejected {
                op: "group_tabs",
                reason: format!("{g} belongs to another window"),
            });
        }

        let group = match into {
            Some(g) => g,
            None => {
                let id = GroupId(st.layout.next_group_id);
                st.layout.next_group_id += 1;
                st.layout.groups.push(LiveGroup {
                    id,
                    window_id: window,
                    title: String::new(),
                    color: GroupColor::default(),
                });
                id
            }
        };

        let selected: HashSet<ItemId> = tabs.iter().copied().collect();
        let list = st.layout.take_window(window);
        let anchor = list
            .iter()
            .position(|t| selected.contains(&t.id))
            .unwrap_or(list.len());
        let (mut block, mut rest): (Vec<LiveTab>, Vec<LiveTab>) =
            list.into_iter().partition(|t| selected.contains(&t.id));
        for t in &mut block {
            t.group_id = Some(group);
        }

        match rest.iter().rposition(|t| t.group_id == Some(group)) {
            Some(last) => {
                rest.splice(last + 1..last + 1, block);
            }
            None => insert_block(&mut rest, block, Position::At(anchor)),
        }
        st.layout.put_window(rest);
        st.ops.push(HostOp::GroupTabs {
            tabs: tabs.to_vec(),
            into,
            group,
        });
        Ok(group)
    }

    fn ungroup_tabs(&self, tabs: &[ItemId]) -> Result<(), HostError> {
        let mut st = self.lock();
        st.check(OpKind::UngroupTabs, "ungroup_tabs")?;
        for id in tabs {
            st.layout.tab(*id)?;
        }

        for id in tabs {
            let window = st.layout.tab(*id)?.window_id;
            let mut list = st.layout.take_window(window);
            if let Some(pos) = list.iter().position(|t| t.id == *id) {
                let mut tab = list.remove(pos);
                let at = match tab.group_id.take() {
                    Some(g) => list
                        .iter()
                        .rposition(|t| t.group_id == Some(g))
                        .map_or(pos, |last| last + 1),
                    None => pos,
                };
                list.insert(at, tab);
            }
            st.layout.put_window(list);
        }
        st.ops.push(HostOp::UngroupTabs {
            tabs: tabs.to_vec(),
        });
        Ok(())
    }

    fn update_group(&self, group: GroupId, update: &GroupUpdate) -> Result<(), HostError> {
        let mut st = self.lock();
        st.check(OpKind::UpdateGroup, "update_group")?;
        let g = st
            .layout
            .groups
            .iter_mut()
            .find(|g| g.id == group)
            .ok_or(HostError::GroupNotFound(group))?;
        if let Some(title) = &update.title {
            g.title = title.clone();
        }
        if let Some(color) = update.color {
            g.color = color;
        }
        st.ops.push(HostOp::UpdateGroup {
            group,
            update: update.clone(),
        });
        Ok(())
    }

    fn move_group(&self, group: GroupId, to: Position) -> Result<(), HostError> {
        let mut st = self.lock();
        st.check(OpKind::MoveGroup, "move_group")?;
        let window = st.layout.group(group)?.window_id;

        let list = st.layout.take_window(window);
        let (block, mut rest): (Vec<LiveTab>, Vec<LiveTab>) =
            list.into_iter().partition(|t| t.group_id == Some(group));
        insert_block(&mut rest, block, to);
        st.layout.put_window(rest);
        st.ops.push(HostOp::MoveGroup { group, to });
        Ok(())
    }

    fn remove_tabs(&self, tabs: &[ItemId]) -> Result<(), HostError> {
        let mut st = self.lock();
        st.check(OpKind::RemoveTabs, "remove_tabs")?;
        let mut windows = Vec::new();
        for id in tabs {
            let w = st.layout.tab(*id)?.window_id;
            if !windows.contains(&w) {
                windows.push(w);
            }
        }

        let doomed: HashSet<ItemId> = tabs.iter().copied().collect();
        for w in windows {
            let mut list = st.layout.take_window(w);
            list.retain(|t| !doomed.contains(&t.id));
            st.layout.put_window(list);
        }
        st.ops.push(HostOp::RemoveTabs {
            tabs: tabs.to_vec(),
        });
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
