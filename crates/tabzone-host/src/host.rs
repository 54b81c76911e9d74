use serde::{Deserialize, Serialize};
use tabzone_core::reconcile::LiveSnapshot;
use tabzone_core::{GroupColor, GroupId, ItemId, LiveGroup, LiveTab, LiveWindow, WindowId};

use crate::error::HostError;

/// Target tab index for a move. Indices count the window's tabs after the
/// moved tabs are taken out, so `At(i)` is the final index of the first
/// moved tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    At(usize),
    End,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<GroupColor>,
}

/// Abstraction over the browser's window/tab/group API.
/// Enables mock injection for testing.
pub trait TabHost: Send + Sync {
    fn windows(&self) -> Result<Vec<LiveWindow>, HostError>;

    /// Tabs of `window`, ordered by index.
    fn tabs(&self, window: WindowId) -> Result<Vec<LiveTab>, HostError>;

    fn groups(&self, window: WindowId) -> Result<Vec<LiveGroup>, HostError>;

    /// Move a single tab. A grouped tab leaves its group.
    fn move_tab(&self, tab: ItemId, to: Position) -> Result<(), HostError>;

    /// Put `tabs` into `into`, or into a new group created in place.
    /// Returns the group id.
    fn group_tabs(&self, tabs: &[ItemId], into: Option<GroupId>) -> Result<GroupId, HostError>;

    fn ungroup_tabs(&self, tabs: &[ItemId]) -> Result<(), HostError>;

    fn update_group(&self, group: GroupId, update: &GroupUpdate) -> Result<(), HostError>;

    fn move_group(&self, group: GroupId, to: Position) -> Result<(), HostError>;

    fn remove_tabs(&self, tabs: &[ItemId]) -> Result<(), HostError>;

    /// Full live view across every window.
    fn snapshot(&self) -> Result<LiveSnapshot, HostError> {
        let windows = self.windows()?;
        let mut tabs = Vec::new();
        let mut groups = Vec::new();
        for w in &windows {
            tabs.extend(self.tabs(w.id)?);
            groups.extend(self.groups(w.id)?);
        }
        Ok(LiveSnapshot {
            windows,
            tabs,
            groups,
        })
    }
}

impl<T: TabHost + ?Sized> TabHost for &T {
    fn windows(&self) -> Result<Vec<LiveWindow>, HostError> {
        (**self).windows()
    }
    fn tabs(&self, window: WindowId) -> Result<Vec<LiveTab>, HostError> {
        (**self).tabs(window)
    }
    fn groups(&self, window: WindowId) -> Result<Vec<LiveGroup>, HostError> {
        (**self).groups(window)
    }
    fn move_tab(&self, tab: ItemId, to: Position) -> Result<(), HostError> {
        (**self).move_tab(tab, to)
    }
    fn group_tabs(&self, tabs: &[ItemId], into: Option<GroupId>) -> Result<GroupId, HostError> {
        (**self).group_tabs(tabs, into)
    }
    fn ungroup_tabs(&self, tabs: &[ItemId]) -> Result<(), HostError> {
        (**self).ungroup_tabs(tabs)
    }
    fn update_group(&self, group: GroupId, update: &GroupUpdate) -> Result<(), HostError> {
        (**self).update_group(group, update)
    }
    fn move_group(&self, group: GroupId, to: Position) -> Result<(), HostError> {
        (**self).move_group(group, to)
    }
    fn remove_tabs(&self, tabs: &[ItemId]) -> Result<(), HostError> {
        (**self).remove_tabs(tabs)
    }
}
