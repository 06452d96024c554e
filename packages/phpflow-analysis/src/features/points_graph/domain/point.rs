//! Program points and their arena
//!
//! Program points live in a [`PointArena`] and refer to each other through
//! [`PointId`] handles. Flow edges are kept bidirectionally so that input
//! extension can walk parents and scheduling can walk children without
//! searching.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::features::analysis::ports::FlowContext;
use crate::features::interprocedural::domain::{FlowExtension, SpliceKind};
use crate::features::memory::domain::FlowSet;
use crate::features::memory::ports::Snapshot;
use crate::shared::models::{ControlFlowGraph, ExprId};

use super::condition::AssumptionCondition;

/// Handle of a program point within its [`PointArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointId(u32);

impl PointId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Catch handler visible to a try scope point, resolved to a program point
#[derive(Debug, Clone)]
pub struct CatchBlockDescription {
    /// Exception class name handled by this catch
    pub class_name: String,
    /// Variable the caught exception is bound to
    pub variable: String,
    /// Entry point of the catch handler
    pub target: PointId,
}

/// Arguments and receiver flowing from a call point into its branches
pub struct CallState<S: Snapshot> {
    /// Evaluated argument values, set by the transfer function of the call
    pub arguments: Option<Vec<S::Value>>,
    /// Receiver of a method call
    pub called_object: Option<S::Value>,
}

impl<S: Snapshot> CallState<S> {
    pub fn new() -> Self {
        Self {
            arguments: None,
            called_object: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_none() && self.called_object.is_none()
    }
}

impl<S: Snapshot> Default for CallState<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Snapshot> Clone for CallState<S> {
    fn clone(&self) -> Self {
        Self {
            arguments: self.arguments.clone(),
            called_object: self.called_object.clone(),
        }
    }
}

impl<S: Snapshot> fmt::Debug for CallState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallState")
            .field("has_arguments", &self.arguments.is_some())
            .field("has_called_object", &self.called_object.is_some())
            .finish()
    }
}

/// Transfer function of a native (modelled) routine
pub struct NativeHook<S: Snapshot>(Arc<dyn Fn(&mut FlowContext<'_, S>)>);

impl<S: Snapshot> NativeHook<S> {
    pub fn new(hook: impl Fn(&mut FlowContext<'_, S>) + 'static) -> Self {
        Self(Arc::new(hook))
    }

    pub fn run(&self, flow: &mut FlowContext<'_, S>) {
        (self.0)(flow)
    }
}

impl<S: Snapshot> Clone for NativeHook<S> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<S: Snapshot> fmt::Debug for NativeHook<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NativeHook")
    }
}

/// What a program point does when flowed through
#[derive(Debug)]
pub enum PointKind<S: Snapshot> {
    /// Structural point with an identity transfer function; used for graph
    /// boundaries and empty blocks
    Empty,
    /// Evaluation of one source expression
    Value { expr: ExprId },
    /// Transfer function of a native routine body
    Native { hook: NativeHook<S> },
    /// Flow filter on an outgoing branch
    Assume { condition: AssumptionCondition },
    /// Start of a try block's catch scope
    TryScopeStart { catches: Vec<CatchBlockDescription> },
    /// End of a try block's catch scope
    TryScopeEnd { catches: Vec<CatchBlockDescription> },
    /// Entry of one spliced call or include branch
    ExtensionBranch { caller: PointId, splice: SpliceKind },
    /// Join of all branch exits of one extended point
    ExtensionSink { owner: PointId },
}

impl<S: Snapshot> Clone for PointKind<S> {
    fn clone(&self) -> Self {
        match self {
            PointKind::Empty => PointKind::Empty,
            PointKind::Value { expr } => PointKind::Value { expr: *expr },
            PointKind::Native { hook } => PointKind::Native { hook: hook.clone() },
            PointKind::Assume { condition } => PointKind::Assume {
                condition: condition.clone(),
            },
            PointKind::TryScopeStart { catches } => PointKind::TryScopeStart {
                catches: catches.clone(),
            },
            PointKind::TryScopeEnd { catches } => PointKind::TryScopeEnd {
                catches: catches.clone(),
            },
            PointKind::ExtensionBranch { caller, splice } => PointKind::ExtensionBranch {
                caller: *caller,
                splice: *splice,
            },
            PointKind::ExtensionSink { owner } => PointKind::ExtensionSink { owner: *owner },
        }
    }
}

/// One node of the program point graph
#[derive(Debug)]
pub struct ProgramPoint<S: Snapshot> {
    /// Transfer behavior of this point
    pub kind: PointKind<S>,
    /// CFG whose expressions this point's handles refer to
    pub source: Option<Arc<ControlFlowGraph>>,
    /// Input flow set; `None` until the point is initialized
    pub in_set: Option<FlowSet<S>>,
    /// Output flow set; `None` until the point is initialized
    pub out_set: Option<FlowSet<S>>,
    /// Flow successors
    pub flow_children: Vec<PointId>,
    /// Flow predecessors
    pub flow_parents: Vec<PointId>,
    /// Spliced call and include branches hanging off this point
    pub extension: Option<FlowExtension>,
    /// For assume points: whether the last evaluation confirmed the
    /// assumption. Points of other kinds stay `true`.
    pub assumed: bool,
    /// Call arguments and receiver produced by this point's transfer
    pub call_state: CallState<S>,
}

impl<S: Snapshot> ProgramPoint<S> {
    fn new(kind: PointKind<S>, source: Option<Arc<ControlFlowGraph>>) -> Self {
        Self {
            kind,
            source,
            in_set: None,
            out_set: None,
            flow_children: Vec::new(),
            flow_parents: Vec::new(),
            extension: None,
            assumed: true,
            call_state: CallState::new(),
        }
    }

    /// Whether flow sets have been attached
    pub fn is_initialized(&self) -> bool {
        self.in_set.is_some()
    }

    /// Whether this point's output has been committed at least once, which
    /// makes it a usable extension source for its children
    pub fn is_flowed_through(&self) -> bool {
        self.out_set
            .as_ref()
            .map(|set| set.is_committed())
            .unwrap_or(false)
    }
}

/// Arena owning all program points of one analysis
#[derive(Debug, Default)]
pub struct PointArena<S: Snapshot> {
    points: Vec<ProgramPoint<S>>,
}

impl<S: Snapshot> PointArena<S> {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Allocate a point, returning its handle
    pub fn alloc(&mut self, kind: PointKind<S>, source: Option<Arc<ControlFlowGraph>>) -> PointId {
        let id = PointId(self.points.len() as u32);
        self.points.push(ProgramPoint::new(kind, source));
        id
    }

    pub fn point(&self, id: PointId) -> &ProgramPoint<S> {
        &self.points[id.index()]
    }

    pub fn point_mut(&mut self, id: PointId) -> &mut ProgramPoint<S> {
        &mut self.points[id.index()]
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = PointId> + '_ {
        (0..self.points.len() as u32).map(PointId)
    }

    /// Add the flow edge `parent -> child`, keeping both adjacency lists in
    /// step. Duplicate edges are ignored.
    pub fn add_flow_child(&mut self, parent: PointId, child: PointId) {
        if self.points[parent.index()].flow_children.contains(&child) {
            return;
        }
        self.points[parent.index()].flow_children.push(child);
        self.points[child.index()].flow_parents.push(parent);
    }

    /// Remove the flow edge `parent -> child` if present
    pub fn remove_flow_child(&mut self, parent: PointId, child: PointId) {
        self.points[parent.index()]
            .flow_children
            .retain(|c| *c != child);
        self.points[child.index()]
            .flow_parents
            .retain(|p| *p != parent);
    }

    /// Attach input and output flow sets to a point
    ///
    /// Panics when the point is already initialized.
    pub fn initialize(&mut self, id: PointId, in_set: FlowSet<S>, out_set: FlowSet<S>) {
        let point = &mut self.points[id.index()];
        assert!(
            point.in_set.is_none() && point.out_set.is_none(),
            "program point {id} initialized twice"
        );
        point.in_set = Some(in_set);
        point.out_set = Some(out_set);
    }
}
