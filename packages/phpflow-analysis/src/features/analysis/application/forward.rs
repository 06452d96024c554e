//! First-phase forward analysis driver
//!
//! Owns the point arena, builds the entry graph, seeds the entry state and
//! drives the worklist to a fixpoint. A driver instance runs exactly once;
//! afterwards the graph and all flow sets stay available read-only.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::errors::Result;
use crate::features::analysis::domain::AnalysisWarning;
use crate::features::analysis::ports::{Evaluator, FlowResolver, FunctionResolver};
use crate::features::memory::domain::FlowSet;
use crate::features::memory::ports::Snapshot;
use crate::features::points_graph::domain::{PointArena, PointId, ProgramPointGraph};
use crate::features::scheduler::domain::WorkList;
use crate::shared::models::ControlFlowGraph;

use super::engine::FlowEngine;

/// Forward abstract interpretation of one entry CFG
pub struct ForwardAnalysis<S: Snapshot> {
    arena: PointArena<S>,
    entry_cfg: Arc<ControlFlowGraph>,
    entry_input: Option<FlowSet<S>>,
    snapshot_factory: Box<dyn FnMut() -> S>,
    config: AnalysisConfig,
    graph: Option<ProgramPointGraph>,
    warnings: Vec<AnalysisWarning>,
    is_analysed: bool,
}

impl<S: Snapshot> ForwardAnalysis<S> {
    /// Create a driver for `entry_cfg`; `snapshot_factory` produces the
    /// bottom state of the domain
    pub fn new(
        entry_cfg: Arc<ControlFlowGraph>,
        snapshot_factory: impl FnMut() -> S + 'static,
        config: AnalysisConfig,
    ) -> Self {
        let mut factory = Box::new(snapshot_factory) as Box<dyn FnMut() -> S>;
        // The entry input stays in an open transaction so the caller can
        // seed globals before the run commits it.
        let mut entry_input = FlowSet::new(factory(), config.widening_limit);
        entry_input.start_transaction();
        Self {
            arena: PointArena::new(),
            entry_cfg,
            entry_input: Some(entry_input),
            snapshot_factory: factory,
            config,
            graph: None,
            warnings: Vec::new(),
            is_analysed: false,
        }
    }

    /// The entry state, open for seeding until `analyse` runs
    pub fn entry_input(&mut self) -> &mut S {
        self.entry_input
            .as_mut()
            .expect("entry input present until analysis runs")
            .snapshot_mut()
    }

    /// Run the fixpoint
    ///
    /// Panics when called twice on the same driver.
    pub fn analyse(
        &mut self,
        evaluator: &mut dyn Evaluator<S>,
        flow_resolver: &mut dyn FlowResolver<S>,
        function_resolver: &mut dyn FunctionResolver<S>,
    ) -> Result<()> {
        assert!(!self.is_analysed, "analysis driver run twice");
        self.is_analysed = true;

        let graph = ProgramPointGraph::from_cfg(Arc::clone(&self.entry_cfg), &mut self.arena)?;

        let mut entry_input = self
            .entry_input
            .take()
            .expect("entry input present until analysis runs");
        entry_input.commit_transaction();
        let out_set = FlowSet::new((self.snapshot_factory)(), self.config.widening_limit);
        self.arena.initialize(graph.start, entry_input, out_set);

        let mut worklist = WorkList::new();
        worklist.add_work(graph.start, &self.arena);

        let mut visits: usize = 0;
        let mut engine = FlowEngine {
            arena: &mut self.arena,
            worklist: &mut worklist,
            evaluator,
            flow_resolver,
            function_resolver,
            snapshot_factory: &mut self.snapshot_factory,
            config: &self.config,
            warnings: &mut self.warnings,
        };
        while let Some(point) = engine.worklist.next() {
            if visits >= engine.config.max_visits {
                warn!(visits, "visit limit reached, aborting fixpoint");
                break;
            }
            visits += 1;
            engine.flow_through(point)?;
        }
        debug!(visits, warnings = self.warnings.len(), "fixpoint reached");

        self.freeze_flow_sets();
        self.graph = Some(graph);
        Ok(())
    }

    fn freeze_flow_sets(&mut self) {
        for id in self.arena.ids().collect::<Vec<_>>() {
            let point = self.arena.point_mut(id);
            if let Some(set) = point.in_set.as_mut() {
                set.freeze();
            }
            if let Some(set) = point.out_set.as_mut() {
                set.freeze();
            }
        }
    }

    /// Whether `analyse` has completed
    pub fn is_analysed(&self) -> bool {
        self.graph.is_some()
    }

    /// The entry program point graph
    ///
    /// Panics before `analyse` has completed.
    pub fn graph(&self) -> &ProgramPointGraph {
        self.graph.as_ref().expect("analysis not run yet")
    }

    /// All program points of the run, spliced branches included
    pub fn arena(&self) -> &PointArena<S> {
        &self.arena
    }

    /// Warnings collected during the run
    pub fn warnings(&self) -> &[AnalysisWarning] {
        &self.warnings
    }

    /// Committed output state of a point, when it was ever reached
    pub fn out_snapshot(&self, point: PointId) -> Option<&S> {
        self.arena
            .point(point)
            .out_set
            .as_ref()
            .filter(|set| set.is_committed())
            .map(|set| set.snapshot())
    }

    /// Committed input state of a point, when it was ever reached
    pub fn in_snapshot(&self, point: PointId) -> Option<&S> {
        self.arena
            .point(point)
            .in_set
            .as_ref()
            .filter(|set| set.is_committed())
            .map(|set| set.snapshot())
    }

    /// Configuration the run uses
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }
}
