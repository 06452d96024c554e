pub mod flow_set;

pub use flow_set::FlowSet;
