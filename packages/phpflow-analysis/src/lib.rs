//! Abstract-interpretation analysis engine for PHP control flow graphs
//!
//! The crate turns a basic-block CFG into a program point graph, runs a
//! worklist-driven forward fixpoint over it, splices resolved calls and
//! includes into the graph while iterating, and lets any number of later
//! forward or backward phases reuse the finished graph.
//!
//! The abstract domain is injected through the
//! [`Snapshot`](features::memory::ports::Snapshot) trait; the language
//! semantics through the [`Evaluator`](features::analysis::ports::Evaluator),
//! [`FlowResolver`](features::analysis::ports::FlowResolver) and
//! [`FunctionResolver`](features::analysis::ports::FunctionResolver) ports.

pub mod config;
pub mod errors;
pub mod features;
pub mod shared;

pub use config::AnalysisConfig;
pub use errors::{AnalysisError, Result};

pub use features::analysis::application::{ForwardAnalysis, NextPhaseAnalysis};
pub use features::analysis::domain::{AnalysisWarning, WarningSeverity};
pub use features::analysis::ports::{
    AnalysisDirection, BranchTarget, CallTarget, Evaluator, FlowContext, FlowResolver,
    FunctionResolver, NextPhaseAnalyzer,
};
pub use features::interprocedural::domain::{Branch, BranchKey, FlowExtension, SpliceKind};
pub use features::memory::domain::FlowSet;
pub use features::memory::ports::Snapshot;
pub use features::points_graph::domain::{
    AssumptionCondition, CatchBlockDescription, ConditionForm, NativeHook, PointArena, PointId,
    PointKind, ProgramPoint, ProgramPointGraph,
};
pub use features::scheduler::domain::WorkList;
pub use shared::models::{
    BasicBlock, BinaryOp, BlockId, CatchTarget, ConditionalEdge, ControlFlowGraph, Expr, ExprId,
    Literal, UnaryOp,
};
