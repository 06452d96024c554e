//! Program point graph
//!
//! A [`ProgramPointGraph`] is a lightweight view over a [`PointArena`]: it
//! records the boundary points and which arena points belong to it. Several
//! graphs (one per analyzed routine) share one arena.

use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::Result;
use crate::features::memory::ports::Snapshot;
use crate::shared::models::ControlFlowGraph;

use super::point::{NativeHook, PointArena, PointId, PointKind};
use crate::features::points_graph::infrastructure::GraphBuilder;

/// Program point view of one routine
#[derive(Debug, Clone)]
pub struct ProgramPointGraph {
    /// Boundary point every flow enters through
    pub start: PointId,
    /// Boundary point every flow leaves through
    pub end: PointId,
    /// All points of this graph, start and end included
    pub points: Vec<PointId>,
    /// Script the source CFG was built from, when known
    pub owning_script: Option<PathBuf>,
    /// Routine name; `None` for a whole script
    pub function_name: Option<String>,
}

impl ProgramPointGraph {
    /// Build the program point graph of a source CFG
    ///
    /// Fails on dangling block or expression handles; never panics on
    /// malformed input.
    pub fn from_cfg<S: Snapshot>(
        cfg: Arc<ControlFlowGraph>,
        arena: &mut PointArena<S>,
    ) -> Result<Self> {
        GraphBuilder::new(Arc::clone(&cfg), arena).build()
    }

    /// Build the two-boundary graph of a native routine: start, the native
    /// transfer point, end
    pub fn from_native<S: Snapshot>(hook: NativeHook<S>, arena: &mut PointArena<S>) -> Self {
        let start = arena.alloc(PointKind::Empty, None);
        let body = arena.alloc(PointKind::Native { hook }, None);
        let end = arena.alloc(PointKind::Empty, None);
        arena.add_flow_child(start, body);
        arena.add_flow_child(body, end);
        Self {
            start,
            end,
            points: vec![start, body, end],
            owning_script: None,
            function_name: None,
        }
    }
}
