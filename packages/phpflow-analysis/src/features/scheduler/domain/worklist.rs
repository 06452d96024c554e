//! Fixpoint worklist
//!
//! Points are classified when enqueued. Join points (more than one flow
//! parent) go on the close stack and are extracted last, so that all their
//! inputs settle first. Points just past a branch (their single parent has
//! several children) go on the open stack, extracted after the plain FIFO
//! queue drains, so one branch runs deep before its siblings start. The
//! contained set keeps every point enqueued at most once.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::features::memory::ports::Snapshot;
use crate::features::points_graph::domain::{PointArena, PointId};

/// Scheduler of pending program points
#[derive(Debug, Default)]
pub struct WorkList {
    contained: FxHashSet<PointId>,
    work_queue: VecDeque<PointId>,
    open_stack: Vec<PointId>,
    close_stack: Vec<PointId>,
}

impl WorkList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a point unless it is already pending
    pub fn add_work<S: Snapshot>(&mut self, point: PointId, arena: &PointArena<S>) {
        if !self.contained.insert(point) {
            return;
        }
        let node = arena.point(point);
        if node.flow_parents.len() > 1 {
            self.close_stack.push(point);
        } else if node
            .flow_parents
            .first()
            .is_some_and(|parent| arena.point(*parent).flow_children.len() > 1)
        {
            self.open_stack.push(point);
        } else {
            self.work_queue.push_back(point);
        }
    }

    /// Extract the next point to process
    pub fn next(&mut self) -> Option<PointId> {
        let point = self
            .work_queue
            .pop_front()
            .or_else(|| self.open_stack.pop())
            .or_else(|| self.close_stack.pop())?;
        self.contained.remove(&point);
        Some(point)
    }

    pub fn is_empty(&self) -> bool {
        self.contained.is_empty()
    }

    pub fn len(&self) -> usize {
        self.contained.len()
    }
}
