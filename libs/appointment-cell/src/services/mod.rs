pub mod ledger;
pub mod lifecycle;
pub mod slots;

pub use ledger::SlotLedger;
pub use lifecycle::AppointmentLifecycle;
