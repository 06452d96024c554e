pub mod condition;
pub mod graph;
pub mod point;

pub use condition::{AssumptionCondition, ConditionForm};
pub use graph::ProgramPointGraph;
pub use point::{
    CallState, CatchBlockDescription, NativeHook, PointArena, PointId, PointKind, ProgramPoint,
};
