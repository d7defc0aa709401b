pub mod broker;
pub mod state_machine;

pub use broker::MatchRequestBroker;
pub use state_machine::ConsultationAction;
