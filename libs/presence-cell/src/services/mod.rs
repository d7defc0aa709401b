pub mod reaper;
pub mod registry;

pub use reaper::*;
pub use registry::*;
