// libs/presence-cell/src/lib.rs
//! Tracks which doctors are reachable right now.
//!
//! A doctor's client heartbeats every couple of minutes; an entry counts as live while
//! it is younger than the configured TTL (five minutes by default). Reads never mutate:
//! stale rows are physically removed by [`services::PresenceReaper`].

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{PresenceEntry, PresenceError};
pub use router::presence_routes;
pub use services::{PresenceReaper, PresenceRegistry};
