//! Error types for the host boundary.

use tabzone_core::{GroupId, ItemId, WindowId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("no such tab: {0}")]
    TabNotFound(ItemId),

    #[error("no such group: {0}")]
    GroupNotFound(GroupId),

    #[error("no such window: {0}")]
    WindowNotFound(WindowId),

    #[error("host rejected {op}: {reason}")]
    Rejected { op: &'static str, reason: String },

    #[error("host io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("layout parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
