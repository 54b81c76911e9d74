//! tabzone-host: browser host IO boundary.
//! Window/tab/group enumeration and mutation behind the `TabHost` trait,
//! host event types, and an in-process `MemoryHost`. No business logic.

pub mod error;
pub mod events;
pub mod host;
pub mod memory;

pub use error::HostError;
pub use events::HostEvent;
pub use host::{GroupUpdate, Position, TabHost};
pub use memory::{HostLayout, HostOp, MemoryHost, OpKind};
