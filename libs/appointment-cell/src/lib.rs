// libs/appointment-cell/src/lib.rs
//! Appointment booking for fixed half-hour slots.
//!
//! At most one pending or confirmed appointment may hold a `(doctor, date, time)` slot.
//! Booking claims the slot atomically in the record store, so two sessions racing for
//! the same slot get one success and one `SlotTaken`.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{Actor, Appointment, AppointmentError, AppointmentStatus, NewBooking};
pub use router::appointment_routes;
pub use services::{AppointmentLifecycle, SlotLedger};
