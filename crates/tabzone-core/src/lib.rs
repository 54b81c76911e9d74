//! tabzone-core: pure aging, classification and zone-ordering logic.
//! No IO, no async. Every state machine takes time as a parameter.

pub mod classify;
pub mod clock;
pub mod persist;
pub mod reconcile;
pub mod settings;
pub mod topology;
pub mod types;
pub mod zone_order;

pub use classify::{Thresholds, TransitionGates, classify, item_age};
pub use clock::ActivityClock;
pub use persist::{PersistedState, SCHEMA_VERSION};
pub use settings::{Settings, TimeBase};
pub use topology::TopologyStore;
pub use types::{
    ClockState, CoreError, GroupColor, GroupId, ItemId, ItemRecord, LiveGroup, LiveTab,
    LiveWindow, Status, WindowId, WindowTopology, Zone,
};
