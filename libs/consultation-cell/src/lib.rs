// libs/consultation-cell/src/lib.rs
//! Instant consultation requests between a patient and an online doctor.
//!
//! ```text
//! pending --accept(doctor)--> accepted --complete(either)--> completed
//! pending --reject(doctor)--> rejected
//! pending --cancel(patient)--> cancelled
//! ```
//!
//! A `(patient, doctor)` pair has at most one pending or accepted request at a time.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    room_id_for, ConsultationError, ConsultationRequest, ConsultationStatus, NewConsultation,
};
pub use router::consultation_routes;
pub use services::{ConsultationAction, MatchRequestBroker};
