use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ─── Identity ─────────────────────────────────────────────────────

macro_rules! host_id {
    ($name:ident, $prefix:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

host_id!(ItemId, "tab:");
host_id!(GroupId, "group:");
host_id!(WindowId, "window:");

// ─── Status & Zone ────────────────────────────────────────────────

/// Age classification of a tracked item, ordered from least to most aged.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Status {
    #[default]
    Fresh = 0,
    Aging = 1,
    Stale = 2,
    Expired = 3,
}

impl Status {
    pub const ALL: [Self; 4] = [Self::Fresh, Self::Aging, Self::Stale, Self::Expired];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Aging => "aging",
            Self::Stale => "stale",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fresh" => Ok(Self::Fresh),
            "aging" => Ok(Self::Aging),
            "stale" => Ok(Self::Stale),
            "expired" => Ok(Self::Expired),
            _ => Err(CoreError::UnknownStatus(s.to_string())),
        }
    }
}

/// Visual partition of a window's containers. Expired content that survives
/// eviction is displayed in the stale zone.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    #[default]
    Fresh,
    Aging,
    Stale,
}

impl Zone {
    /// Left-to-right order of zones within a window.
    pub const ORDER: [Self; 3] = [Self::Fresh, Self::Aging, Self::Stale];

    pub fn of(status: Status) -> Self {
        match status {
            Status::Fresh => Self::Fresh,
            Status::Aging => Self::Aging,
            Status::Stale | Status::Expired => Self::Stale,
        }
    }

    /// Whether this zone is backed by an engine-owned reserved container.
    pub fn is_reserved(self) -> bool {
        !matches!(self, Self::Fresh)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Aging => "aging",
            Self::Stale => "stale",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Group Color ──────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupColor {
    #[default]
    Grey,
    Blue,
    Red,
    Yellow,
    Green,
    Pink,
    Purple,
    Cyan,
    Orange,
}

// ─── Records ──────────────────────────────────────────────────────

/// Persisted record of one tracked tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    pub window_id: WindowId,
    /// Activity-clock reading at the last refresh, in milliseconds.
    pub refreshed_activity_ms: u64,
    /// Wall-clock time of the last refresh.
    pub refreshed_at: DateTime<Utc>,
    /// `None` for pinned items.
    pub status: Option<Status>,
    pub group_id: Option<GroupId>,
    /// Member of one of the window's reserved state containers.
    #[serde(default)]
    pub in_state_group: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub url: String,
}

impl ItemRecord {
    /// A freshly refreshed record for a newly seen tab.
    pub fn fresh(tab: &LiveTab, activity_ms: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: tab.id,
            window_id: tab.window_id,
            refreshed_activity_ms: activity_ms,
            refreshed_at: now,
            status: (!tab.pinned).then_some(Status::Fresh),
            group_id: tab.group_id,
            in_state_group: false,
            pinned: tab.pinned,
            url: tab.url.clone(),
        }
    }

    /// Reset both refresh timestamps (navigation).
    pub fn refresh(&mut self, activity_ms: u64, now: DateTime<Utc>) {
        self.refreshed_activity_ms = activity_ms;
        self.refreshed_at = now;
        if !self.pinned {
            self.status = Some(Status::Fresh);
        }
    }
}

/// Per-window record of reserved containers and last-observed container zones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowTopology {
    pub aging_group: Option<GroupId>,
    pub stale_group: Option<GroupId>,
    #[serde(default)]
    pub group_zones: BTreeMap<GroupId, Zone>,
}

impl WindowTopology {
    pub fn state_group(&self, zone: Zone) -> Option<GroupId> {
        match zone {
            Zone::Fresh => None,
            Zone::Aging => self.aging_group,
            Zone::Stale => self.stale_group,
        }
    }

    pub fn set_state_group(&mut self, zone: Zone, group: Option<GroupId>) {
        match zone {
            Zone::Fresh => {}
            Zone::Aging => self.aging_group = group,
            Zone::Stale => self.stale_group = group,
        }
    }

    /// Zone of a reserved container, if `group` is one.
    pub fn reserved_zone(&self, group: GroupId) -> Option<Zone> {
        if self.aging_group == Some(group) {
            Some(Zone::Aging)
        } else if self.stale_group == Some(group) {
            Some(Zone::Stale)
        } else {
            None
        }
    }

    pub fn is_state_group(&self, group: GroupId) -> bool {
        self.reserved_zone(group).is_some()
    }
}

/// Persisted activity clock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockState {
    pub accumulated_ms: u64,
    pub focus_started_at: Option<DateTime<Utc>>,
    pub persisted_at: Option<DateTime<Utc>>,
    /// `persisted_at` value the last recovery was computed from.
    #[serde(default)]
    pub recovered_from: Option<DateTime<Utc>>,
}

// ─── Live Host View ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveWindow {
    pub id: WindowId,
    pub focused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveTab {
    pub id: ItemId,
    pub window_id: WindowId,
    pub index: usize,
    pub pinned: bool,
    pub group_id: Option<GroupId>,
    pub url: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveGroup {
    pub id: GroupId,
    pub window_id: WindowId,
    pub title: String,
    pub color: GroupColor,
}

// ─── Error ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    UnknownStatus(String),
    InvalidThresholds {
        aging_secs: u64,
        stale_secs: u64,
        expire_secs: u64,
    },
    InvalidSettings(String),
    UnsupportedSchema {
        version: u64,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownStatus(s) => write!(f, "unknown status: {s}"),
            Self::InvalidThresholds {
                aging_secs,
                stale_secs,
                expire_secs,
            } => write!(
                f,
                "thresholds must ascend: aging={aging_secs}s stale={stale_secs}s expire={expire_secs}s"
            ),
            Self::InvalidSettings(msg) => write!(f, "invalid settings: {msg}"),
            Self::UnsupportedSchema { version } => {
                write!(f, "unsupported persisted schema version {version}")
            }
        }
    }
}

impl std::error::Error for CoreError {}

// ─── Tests ────────────────────────────────────────────────────────
