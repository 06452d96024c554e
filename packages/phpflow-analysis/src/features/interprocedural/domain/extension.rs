//! Call and include splicing
//!
//! An extended point keeps a [`FlowExtension`]: one branch per resolved
//! callee or included script, all joined again in a single sink point. The
//! sink is created once and stays for the lifetime of the point; while no
//! branch is attached the owner keeps a direct edge to its sink, so the
//! visible child set of the owner is the same before any extension and
//! after the last branch is removed.

use std::collections::BTreeMap;

use tracing::trace;

use crate::features::memory::ports::Snapshot;
use crate::features::points_graph::domain::{PointArena, PointId, PointKind, ProgramPointGraph};

/// Whether a branch is spliced as a function call or an include
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceKind {
    /// Separate call level: arguments in, effects merged back
    Call,
    /// Same level: the included script runs in the caller's scope
    Include,
}

/// Identity of one branch of an extended point
///
/// Ordered so that branch iteration is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum BranchKey {
    /// A resolved function or method
    Function(String),
    /// A resolved include target
    Include(String),
}

/// One spliced branch: the entry point routing into a callee graph
#[derive(Debug, Clone)]
pub struct Branch {
    /// Entry point of the branch, child of the extended point
    pub entry: PointId,
    /// Graph of the callee or included script
    pub graph: ProgramPointGraph,
    /// How the branch is spliced
    pub splice: SpliceKind,
}

/// The branches and sink of one extended point
#[derive(Debug, Clone)]
pub struct FlowExtension {
    sink: PointId,
    branches: BTreeMap<BranchKey, Branch>,
}

impl FlowExtension {
    fn new(sink: PointId) -> Self {
        Self {
            sink,
            branches: BTreeMap::new(),
        }
    }

    /// The join point all branch exits flow into
    pub fn sink(&self) -> PointId {
        self.sink
    }

    pub fn branch(&self, key: &BranchKey) -> Option<&Branch> {
        self.branches.get(key)
    }

    pub fn branches(&self) -> impl Iterator<Item = (&BranchKey, &Branch)> {
        self.branches.iter()
    }

    pub fn branch_keys(&self) -> impl Iterator<Item = &BranchKey> {
        self.branches.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

/// Attach a branch to `owner`, creating its sink on first use
///
/// Returns the branch entry point. The owner's original children are
/// rerouted behind the sink the first time the point is extended; they keep
/// that position permanently.
pub fn add_branch<S: Snapshot>(
    arena: &mut PointArena<S>,
    owner: PointId,
    key: BranchKey,
    graph: ProgramPointGraph,
    splice: SpliceKind,
) -> PointId {
    let sink = ensure_sink(arena, owner);

    let was_empty = match &arena.point(owner).extension {
        Some(extension) => extension.is_empty(),
        None => unreachable!("sink ensured above"),
    };
    if was_empty {
        // Flow now passes through a branch instead of falling through.
        arena.remove_flow_child(owner, sink);
    }

    let entry = arena.alloc(
        PointKind::ExtensionBranch {
            caller: owner,
            splice,
        },
        None,
    );
    arena.add_flow_child(owner, entry);
    arena.add_flow_child(entry, graph.start);
    arena.add_flow_child(graph.end, sink);

    trace!(%owner, %entry, ?key, "branch attached");

    let branch = Branch {
        entry,
        graph,
        splice,
    };
    match &mut arena.point_mut(owner).extension {
        Some(extension) => {
            extension.branches.insert(key, branch);
        }
        None => unreachable!("sink ensured above"),
    }
    entry
}

/// Detach the branch identified by `key` from `owner`
///
/// When the last branch is removed the owner falls through to its sink
/// again, restoring its pre-extension child set.
pub fn remove_branch<S: Snapshot>(
    arena: &mut PointArena<S>,
    owner: PointId,
    key: &BranchKey,
) -> Option<Branch> {
    let (branch, sink, now_empty) = {
        let extension = arena.point_mut(owner).extension.as_mut()?;
        let branch = extension.branches.remove(key)?;
        (branch, extension.sink, extension.branches.is_empty())
    };

    arena.remove_flow_child(owner, branch.entry);
    arena.remove_flow_child(branch.entry, branch.graph.start);
    arena.remove_flow_child(branch.graph.end, sink);
    if now_empty {
        arena.add_flow_child(owner, sink);
    }

    trace!(%owner, entry = %branch.entry, ?key, "branch detached");
    Some(branch)
}

fn ensure_sink<S: Snapshot>(arena: &mut PointArena<S>, owner: PointId) -> PointId {
    if let Some(extension) = &arena.point(owner).extension {
        return extension.sink;
    }
    let sink = arena.alloc(PointKind::ExtensionSink { owner }, None);
    let children = arena.point(owner).flow_children.clone();
    for child in children {
        arena.remove_flow_child(owner, child);
        arena.add_flow_child(sink, child);
    }
    arena.add_flow_child(owner, sink);
    arena.point_mut(owner).extension = Some(FlowExtension::new(sink));
    sink
}
