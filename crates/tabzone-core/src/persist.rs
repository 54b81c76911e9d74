//! Versioned persisted schema and the one-shot migration run at load.
//!
//! The store layer hands raw JSON to [`decode`]. Records that fail to decode
//! are reported and treated as absent; the rest of the state survives.
//!
//! # Versions
//!
//! - **1**: `tabs` map with a single wall-clock `last_refreshed`, activity
//!   counter as top-level `active_ms`.
//! - **2** (current): `items`, `windows`, `clock`, `runtime_nonce`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::topology::TopologyStore;
use crate::types::{
    ClockState, CoreError, GroupId, ItemId, ItemRecord, Status, WindowId, WindowTopology,
};

pub const SCHEMA_VERSION: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u64,
    /// Identifies the process instance that last wrote this state.
    #[serde(default)]
    pub runtime_nonce: Option<String>,
    #[serde(default)]
    pub items: BTreeMap<ItemId, ItemRecord>,
    #[serde(default)]
    pub windows: TopologyStore,
    #[serde(default)]
    pub clock: ClockState,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            runtime_nonce: None,
            items: BTreeMap::new(),
            windows: TopologyStore::new(),
            clock: ClockState::default(),
        }
    }
}

impl PersistedState {
    /// Records belonging to `window`.
    pub fn window_items(&self, window: WindowId) -> impl Iterator<Item = &ItemRecord> {
        self.items.values().filter(move |r| r.window_id == window)
    }

    /// Drop every record and the topology of a closed window.
    pub fn remove_window(&mut self, window: WindowId) -> usize {
        let before = self.items.len();
        self.items.retain(|_, r| r.window_id != window);
        self.windows.remove_window(window);
        before - self.items.len()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A record dropped during decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeIssue {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub state: PersistedState,
    pub issues: Vec<DecodeIssue>,
    /// Version found on disk (before migration).
    pub source_version: u64,
}

/// Decode raw persisted JSON, migrating older schemas.
///
/// Unknown future versions are refused rather than misread.
pub fn decode(raw: &Value) -> Result<Decoded, CoreError> {
    let version = raw.get("version").and_then(Value::as_u64).unwrap_or(1);
    let mut issues = Vec::new();

    let state = match version {
        1 => migrate_v1(raw, &mut issues),
        SCHEMA_VERSION => decode_v2(raw, &mut issues),
        other => return Err(CoreError::UnsupportedSchema { version: other }),
    };

    Ok(Decoded {
        state,
        issues,
        source_version: version,
    })
}

fn decode_v2(raw: &Value, issues: &mut Vec<DecodeIssue>) -> PersistedState {
    let items = decode_map::<ItemRecord>(raw.get("items"), "items", issues)
        .into_iter()
        .filter_map(|(k, rec)| match k.parse::<u64>() {
            Ok(id) if id == rec.id.0 => Some((ItemId(id), rec)),
            _ => {
                issues.push(DecodeIssue {
                    key: format!("items.{k}"),
                    reason: format!("key does not match record id {}", rec.id),
                });
                None
            }
        })
        .collect();

    let mut windows = TopologyStore::new();
    for (k, topo) in decode_map::<WindowTopology>(raw.get("windows"), "windows", issues) {
        match k.parse::<u64>() {
            Ok(id) => windows.insert(WindowId(id), topo),
            Err(_) => issues.push(DecodeIssue {
                key: format!("windows.{k}"),
                reason: "window key is not numeric".to_string(),
            }),
        }
    }

    let clock = match raw.get("clock") {
        None | Some(Value::Null) => ClockState::default(),
        Some(v) => serde_json::from_value(v.clone()).unwrap_or_else(|e| {
            issues.push(DecodeIssue {
                key: "clock".to_string(),
                reason: e.to_string(),
            });
            ClockState::default()
        }),
    };

    PersistedState {
        version: SCHEMA_VERSION,
        runtime_nonce: raw
            .get("runtime_nonce")
            .and_then(Value::as_str)
            .map(String::from),
        items,
        windows,
        clock,
    }
}

fn decode_map<T: for<'de> Deserialize<'de>>(
    raw: Option<&Value>,
    section: &str,
    issues: &mut Vec<DecodeIssue>,
) -> Vec<(String, T)> {
    let Some(obj) = raw.and_then(Value::as_object) else {
        return Vec::new();
    };
    obj.iter()
        .filter_map(|(k, v)| match serde_json::from_value::<T>(v.clone()) {
            Ok(rec) => Some((k.clone(), rec)),
            Err(e) => {
                issues.push(DecodeIssue {
                    key: format!("{section}.{k}"),
                    reason: e.to_string(),
                });
                None
            }
        })
        .collect()
}

// ─── v1 → v2 ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TabV1 {
    id: u64,
    window_id: u64,
    last_refreshed: DateTime<Utc>,
    status: Option<Status>,
    group_id: Option<u64>,
    #[serde(default)]
    pinned: bool,
    #[serde(default)]
    url: String,
}

/// v1 only tracked wall-clock refreshes; activity ages restart from the
/// counter value at migration time.
fn migrate_v1(raw: &Value, issues: &mut Vec<DecodeIssue>) -> PersistedState {
    let active_ms = raw.get("active_ms").and_then(Value::as_u64).unwrap_or(0);

    let items = decode_map::<TabV1>(raw.get("tabs"), "tabs", issues)
        .into_iter()
        .map(|(_, tab)| {
            let record = ItemRecord {
                id: ItemId(tab.id),
                window_id: WindowId(tab.window_id),
                refreshed_activity_ms: active_ms,
                refreshed_at: tab.last_refreshed,
                status: if tab.pinned { None } else { tab.status },
                group_id: tab.group_id.map(GroupId),
                in_state_group: false,
                pinned: tab.pinned,
                url: tab.url,
            };
            (record.id, record)
        })
        .collect();

    let mut windows = TopologyStore::new();
    for (k, topo) in decode_map::<WindowTopology>(raw.get("windows"), "windows", issues) {
        if let Ok(id) = k.parse::<u64>() {
            windows.insert(WindowId(id), topo);
        }
    }

    PersistedState {
        version: SCHEMA_VERSION,
        runtime_nonce: None,
        items,
        windows,
        clock: ClockState {
            accumulated_ms: active_ms,
            ..ClockState::default()
        },
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
