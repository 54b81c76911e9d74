//! Settings model. Owned by the settings collaborator; read-only here.
//!
//! Loaded from TOML. Every field has a default so a partial file is valid.

use serde::{Deserialize, Serialize};

use crate::classify::{Thresholds, TransitionGates};
use crate::types::{CoreError, GroupColor, Zone};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBase {
    /// Age counts only while some window holds focus.
    #[default]
    Activity,
    WallClock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneColors {
    pub fresh: GroupColor,
    pub aging: GroupColor,
    pub stale: GroupColor,
}

impl Default for ZoneColors {
    fn default() -> Self {
        Self {
            fresh: GroupColor::Green,
            aging: GroupColor::Yellow,
            stale: GroupColor::Red,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTitles {
    pub aging: String,
    pub stale: String,
}

impl Default for StateTitles {
    fn default() -> Self {
        Self {
            aging: "Aging".to_string(),
            stale: "Stale".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub time_base: TimeBase,
    pub aging_after_secs: u64,
    pub stale_after_secs: u64,
    pub expire_after_secs: u64,
    pub aging_enabled: bool,
    pub stale_enabled: bool,
    pub expire_enabled: bool,
    /// Container-zone pass (reordering).
    pub sorting_enabled: bool,
    /// Container color sync.
    pub coloring_enabled: bool,
    /// Ungrouped-item pass (moving tabs into reserved containers).
    pub auto_group_enabled: bool,
    pub colors: ZoneColors,
    pub titles: StateTitles,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            time_base: TimeBase::Activity,
            aging_after_secs: 60 * 60,
            stale_after_secs: 3 * 60 * 60,
            expire_after_secs: 24 * 60 * 60,
            aging_enabled: true,
            stale_enabled: true,
            expire_enabled: false,
            sorting_enabled: true,
            coloring_enabled: true,
            auto_group_enabled: true,
            colors: ZoneColors::default(),
            titles: StateTitles::default(),
        }
    }
}

impl Settings {
    pub fn from_toml(s: &str) -> Result<Self, CoreError> {
        toml::from_str(s).map_err(|e| CoreError::InvalidSettings(e.to_string()))
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds::from_secs(
            self.aging_after_secs,
            self.stale_after_secs,
            self.expire_after_secs,
        )
    }

    pub fn gates(&self) -> TransitionGates {
        TransitionGates {
            aging: self.aging_enabled,
            stale: self.stale_enabled,
            expired: self.expire_enabled,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.thresholds().validate()?;
        if self.titles.aging.trim().is_empty() || self.titles.stale.trim().is_empty() {
            return Err(CoreError::InvalidSettings(
                "reserved container titles must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn color_for(&self, zone: Zone) -> GroupColor {
        match zone {
            Zone::Fresh => self.colors.fresh,
            Zone::Aging => self.colors.aging,
            Zone::Stale => self.colors.stale,
        }
    }

    /// Label of the reserved container for `zone` (empty for fresh).
    pub fn title_for(&self, zone: Zone) -> &str {
        match zone {
            Zone::Fresh => "",
            Zone::Aging => &self.titles.aging,
            Zone::Stale => &self.titles.stale,
        }
    }
}
