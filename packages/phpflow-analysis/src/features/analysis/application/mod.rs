mod engine;
pub mod forward;
pub mod next_phase;

pub use forward::ForwardAnalysis;
pub use next_phase::NextPhaseAnalysis;
