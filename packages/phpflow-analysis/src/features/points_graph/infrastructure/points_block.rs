//! Linear chains of program points built for one basic block or condition

use crate::features::memory::ports::Snapshot;
use crate::features::points_graph::domain::{PointArena, PointId};

/// A non-empty chain of already linked program points
///
/// Edges between consecutive points are created when the block is formed;
/// only `first` and `last` are needed afterwards to wire blocks together.
#[derive(Debug, Clone, Copy)]
pub struct PointsBlock {
    pub first: PointId,
    pub last: PointId,
}

impl PointsBlock {
    /// Form a block from points in execution order, linking consecutive
    /// points with flow edges
    ///
    /// Panics on an empty chain; callers create an explicit empty point for
    /// blocks without statements.
    pub fn link<S: Snapshot>(arena: &mut PointArena<S>, points: &[PointId]) -> Self {
        let (first, rest) = points
            .split_first()
            .expect("points block formed from an empty chain");
        let mut previous = *first;
        for point in rest {
            arena.add_flow_child(previous, *point);
            previous = *point;
        }
        Self {
            first: *first,
            last: previous,
        }
    }
}
