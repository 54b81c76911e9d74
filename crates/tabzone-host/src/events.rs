//! Host event notifications, as delivered to the reactive handlers.

use serde::{Deserialize, Serialize};
use tabzone_core::{GroupId, ItemId, LiveGroup, LiveTab, WindowId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    TabCreated {
        tab: LiveTab,
    },
    TabRemoved {
        tab_id: ItemId,
        window_id: WindowId,
        /// Removal caused by the whole window closing.
        #[serde(default)]
        window_closing: bool,
    },
    TabNavigated {
        tab_id: ItemId,
        window_id: WindowId,
        url: String,
    },
    /// Tab moved within its window or attached to another one.
    TabMoved {
        tab_id: ItemId,
        window_id: WindowId,
    },
    TabGroupChanged {
        tab_id: ItemId,
        window_id: WindowId,
        group_id: Option<GroupId>,
    },
    TabPinnedChanged {
        tab_id: ItemId,
        window_id: WindowId,
        pinned: bool,
    },
    GroupCreated {
        group: LiveGroup,
    },
    GroupUpdated {
        group: LiveGroup,
    },
    GroupRemoved {
        group_id: GroupId,
        window_id: WindowId,
    },
    /// `None` when no browser window holds focus.
    WindowFocusChanged {
        window_id: Option<WindowId>,
    },
    WindowRemoved {
        window_id: WindowId,
    },
}

impl HostEvent {
    /// Window the event concerns, if any.
    pub fn window(&self) -> Option<WindowId> {
        match self {
            Self::TabCreated { tab } => Some(tab.window_id),
            Self::GroupCreated { group } | Self::GroupUpdated { group } => Some(group.window_id),
            Self::TabRemoved { window_id, .. }
            | Self::TabNavigated { window_id, .. }
            | Self::TabMoved { window_id, .. }
            | Self::TabGroupChanged { window_id, .. }
            | Self::TabPinnedChanged { window_id, .. }
            | Self::GroupRemoved { window_id, .. }
            | Self::WindowRemoved { window_id } => Some(*window_id),
            Self::WindowFocusChanged { window_id } => *window_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::TabCreated { .. } => "tab_created",
            Self::TabRemoved { .. } => "tab_removed",
            Self::TabNavigated { .. } => "tab_navigated",
            Self::TabMoved { .. } => "tab_moved",
            Self::TabGroupChanged { .. } => "tab_group_changed",
            Self::TabPinnedChanged { .. } => "tab_pinned_changed",
            Self::GroupCreated { .. } => "group_created",
            Self::GroupUpdated { .. } => "group_updated",
            Self::GroupRemoved { .. } => "group_removed",
            Self::WindowFocusChanged { .. } => "window_focus_changed",
            Self::WindowRemoved { .. } => "window_removed",
        }
    }
}
