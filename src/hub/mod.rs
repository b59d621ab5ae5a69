//! Routing hub
//!
//! The single serialized owner of registered sessions and groups, and the
//! router of every chat message.

pub mod core;
pub mod events;
pub mod group;
pub mod registry;
pub mod results;

pub use self::core::{Hub, HubHandle};
pub use events::{HubEvent, RegisterReply, Refused};
pub use group::Group;
pub use registry::ClientRegistry;
pub use results::DeliveryReport;
