pub mod gate;
pub mod join;

pub use gate::AccessGate;
pub use join::SessionJoinService;
