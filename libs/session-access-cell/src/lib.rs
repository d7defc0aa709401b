// libs/session-access-cell/src/lib.rs
//! Session entry for appointments and instant consultations.
//!
//! Records booked by a signed-in user carry a stable account key and are matched on it
//! alone. Older records only carry typed-in contact details; those fall back to name,
//! email and looked-up phone, and only when `LEGACY_IDENTITY_FALLBACK` allows it.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{AccessError, AccessTarget, JoinResponse};
pub use router::{change_routes, session_routes};
pub use services::{AccessGate, SessionJoinService};
