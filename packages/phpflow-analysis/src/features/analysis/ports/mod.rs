//! Ports of the fixpoint engine
//!
//! The engine owns graph traversal, scheduling and the snapshot protocol;
//! everything language-specific is injected through these traits. An
//! [`Evaluator`] gives expressions meaning, a [`FlowResolver`] decides
//! assumptions and exception scopes, a [`FunctionResolver`] maps call and
//! include sites to branch targets, and a [`NextPhaseAnalyzer`] is the
//! transfer function of a later phase running over a finished graph.

use std::sync::Arc;

use crate::features::analysis::domain::{AnalysisWarning, WarningSeverity};
use crate::features::interprocedural::domain::BranchKey;
use crate::features::memory::ports::Snapshot;
use crate::features::points_graph::domain::{
    AssumptionCondition, CatchBlockDescription, NativeHook, PointId, PointKind,
};
use crate::shared::models::{ControlFlowGraph, Expr, ExprId};

/// Direction a phase walks the finished graph in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisDirection {
    Forward,
    Backward,
}

/// View of one program point handed to the injected transfer functions
///
/// The input snapshot is read-only; all effects go into the output
/// snapshot, whose transaction the engine commits after the transfer
/// returns.
pub struct FlowContext<'a, S: Snapshot> {
    /// Point currently flowed through
    pub point: PointId,
    /// Expression under evaluation, for value points
    pub expr: Option<ExprId>,
    /// CFG the point's expression handles refer to
    pub cfg: Option<&'a ControlFlowGraph>,
    /// Committed input state
    pub in_snapshot: &'a S,
    /// Output state, inside an open transaction
    pub out_snapshot: &'a mut S,
    /// Argument values for a call produced at this point
    pub arguments: &'a mut Option<Vec<S::Value>>,
    /// Receiver value for a method call produced at this point
    pub called_object: &'a mut Option<S::Value>,
    warnings: &'a mut Vec<AnalysisWarning>,
}

impl<'a, S: Snapshot> FlowContext<'a, S> {
    pub(crate) fn new(
        point: PointId,
        expr: Option<ExprId>,
        cfg: Option<&'a ControlFlowGraph>,
        in_snapshot: &'a S,
        out_snapshot: &'a mut S,
        arguments: &'a mut Option<Vec<S::Value>>,
        called_object: &'a mut Option<S::Value>,
        warnings: &'a mut Vec<AnalysisWarning>,
    ) -> Self {
        Self {
            point,
            expr,
            cfg,
            in_snapshot,
            out_snapshot,
            arguments,
            called_object,
            warnings,
        }
    }

    /// Report an irregularity of the analyzed program
    pub fn warn(&mut self, severity: WarningSeverity, message: impl Into<String>) {
        let mut warning = AnalysisWarning::new(self.point, severity, message);
        warning.expr = self.expr;
        self.warnings.push(warning);
    }

    /// Resolve an expression handle against the point's source CFG
    pub fn expr_at(&self, id: ExprId) -> Option<&'a Expr> {
        self.cfg.and_then(|cfg| cfg.expr(id))
    }
}

/// Transfer functions over expressions
pub trait Evaluator<S: Snapshot> {
    /// Flow through one value point; `expr` is the node named by
    /// `flow.expr`
    fn eval(&mut self, flow: &mut FlowContext<'_, S>, expr: &Expr);
}

/// Decisions about assumptions and exception scopes
pub trait FlowResolver<S: Snapshot> {
    /// Evaluate an assumption against the input state, shaping the output
    /// state accordingly; returns whether the assumption may hold
    fn confirm_assumption(
        &mut self,
        flow: &mut FlowContext<'_, S>,
        condition: &AssumptionCondition,
    ) -> bool;

    /// A try block's catch scope opens
    fn try_scope_start(
        &mut self,
        _flow: &mut FlowContext<'_, S>,
        _catches: &[CatchBlockDescription],
    ) {
    }

    /// A try block's catch scope closes
    fn try_scope_end(
        &mut self,
        _flow: &mut FlowContext<'_, S>,
        _catches: &[CatchBlockDescription],
    ) {
    }
}

/// Body of one resolved branch target
pub enum BranchTarget<S: Snapshot> {
    /// A routine with source, expanded into its own program point graph
    Source(Arc<ControlFlowGraph>),
    /// A modelled routine with a direct transfer function
    Native(NativeHook<S>),
}

/// One callee or included script a call site resolves to
pub struct CallTarget<S: Snapshot> {
    pub key: BranchKey,
    pub target: BranchTarget<S>,
}

/// Resolution of call and include sites against the current state
pub trait FunctionResolver<S: Snapshot> {
    /// All targets a call site may reach under the input state
    ///
    /// The returned set is the desired branch set; the engine attaches
    /// missing branches and detaches ones no longer listed.
    fn resolve_call(
        &mut self,
        flow: &mut FlowContext<'_, S>,
        function: &str,
        arguments: &[ExprId],
    ) -> Vec<CallTarget<S>>;

    /// All scripts an include site may load under the input state
    fn resolve_include(&mut self, flow: &mut FlowContext<'_, S>, target: &str)
        -> Vec<CallTarget<S>>;

    /// Shape the merged state after all branches returned, e.g. bind the
    /// call result
    fn resolve_return(&mut self, _flow: &mut FlowContext<'_, S>, _branches: &[BranchKey]) {}
}

/// Transfer function of a phase running over an already built graph
pub trait NextPhaseAnalyzer<S: Snapshot> {
    fn flow_through(&mut self, flow: &mut FlowContext<'_, S>, kind: &PointKind<S>);
}
