//! Herald Core
//!
//! Background push pipeline of the messenger's native shell:
//! - Shared credential store and cross-process locks
//! - Session refresh under mutual exclusion
//! - Delivery acknowledgment for message pushes
//! - VoIP call admission (show, then correct)
//! - Notification cleanup, bridge methods and web push routing
//!
//! Hosts build a [`PushContext`] for their shared container and hand it to
//! the components they run.

pub mod api;
pub mod bridge;
pub mod config;
pub mod constants;
pub mod context;
pub mod delivery;
pub mod extension;
pub mod lock;
pub mod notifications;
pub mod paths;
pub mod session;
pub mod storage;
pub mod voip;
pub mod web;

#[cfg(test)]
mod testing;

pub use context::PushContext;
pub use paths::SharedContainer;
