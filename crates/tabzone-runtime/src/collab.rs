//! Collaborators chosen at construction time: eviction and container naming.

use tabzone_core::{LiveGroup, LiveTab};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvictionError {
    #[error("eviction refused for {0}")]
    Refused(String),
}

/// Receives expired content before it is removed from the host.
/// A failure keeps the content in place for the next pass.
pub trait EvictionSink: Send + Sync {
    fn evict_item(&self, tab: &LiveTab) -> Result<(), EvictionError>;
    fn evict_group(&self, group: &LiveGroup, tabs: &[LiveTab]) -> Result<(), EvictionError>;
}

/// Records evictions in the log only. A tab without an address leaves
/// nothing to record and is refused.
pub struct LogEviction;

impl EvictionSink for LogEviction {
    fn evict_item(&self, tab: &LiveTab) -> Result<(), EvictionError> {
        if tab.url.is_empty() {
            return Err(EvictionError::Refused(format!("{} (no address)", tab.id)));
        }
        tracing::info!("evicting {} {}", tab.id, tab.url);
        Ok(())
    }

    fn evict_group(&self, group: &LiveGroup, tabs: &[LiveTab]) -> Result<(), EvictionError> {
        if let Some(blank) = tabs.iter().find(|t| t.url.is_empty()) {
            return Err(EvictionError::Refused(format!(
                "{} ({} has no address)",
                group.id, blank.id
            )));
        }
        for tab in tabs {
            tracing::debug!("evicting {} {} with {}", tab.id, tab.url, group.id);
        }
        tracing::info!(
            "evicting {} \"{}\" with {} tabs",
            group.id,
            group.title,
            tabs.len()
        );
        Ok(())
    }
}

/// May label an unnamed ordinary container after sorting.
pub trait GroupNamer: Send + Sync {
    fn name(&self, group: &LiveGroup, tabs: &[LiveTab]) -> Option<String>;
}
