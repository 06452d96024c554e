//! Later analysis phases over a finished graph
//!
//! A next phase reuses the structure, branch splicing and assumption
//! verdicts of a finished forward run, but keeps its own flow sets in a
//! side table, so any number of phases can run over the same graph without
//! touching the first phase's states. A phase walks the graph forward or
//! backward; in both directions branches that the first phase proved dead
//! stay dead.

use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::features::analysis::domain::AnalysisWarning;
use crate::features::analysis::ports::{AnalysisDirection, FlowContext, NextPhaseAnalyzer};
use crate::features::interprocedural::domain::SpliceKind;
use crate::features::memory::domain::FlowSet;
use crate::features::memory::ports::Snapshot;
use crate::features::points_graph::domain::{CallState, PointArena, PointId, PointKind};
use crate::features::scheduler::domain::WorkList;

use super::forward::ForwardAnalysis;

/// One later phase over the graph of a finished [`ForwardAnalysis`]
pub struct NextPhaseAnalysis<S: Snapshot> {
    direction: AnalysisDirection,
    config: AnalysisConfig,
    ins: Vec<Option<FlowSet<S>>>,
    outs: Vec<Option<FlowSet<S>>>,
    entry_input: Option<FlowSet<S>>,
    snapshot_factory: Box<dyn FnMut() -> S>,
    warnings: Vec<AnalysisWarning>,
    is_analysed: bool,
}

impl<S: Snapshot> NextPhaseAnalysis<S> {
    pub fn new(
        direction: AnalysisDirection,
        snapshot_factory: impl FnMut() -> S + 'static,
        config: AnalysisConfig,
    ) -> Self {
        let mut factory = Box::new(snapshot_factory) as Box<dyn FnMut() -> S>;
        let mut entry_input = FlowSet::new(factory(), config.widening_limit);
        entry_input.start_transaction();
        Self {
            direction,
            config,
            ins: Vec::new(),
            outs: Vec::new(),
            entry_input: Some(entry_input),
            snapshot_factory: factory,
            warnings: Vec::new(),
            is_analysed: false,
        }
    }

    /// The phase's entry state, open for seeding until `analyse` runs
    ///
    /// For a backward phase this seeds the graph end.
    pub fn entry_input(&mut self) -> &mut S {
        self.entry_input
            .as_mut()
            .expect("entry input present until analysis runs")
            .snapshot_mut()
    }

    /// Run the phase to its fixpoint
    ///
    /// Panics when called twice, or when `analysis` has not finished.
    pub fn analyse(
        &mut self,
        analysis: &ForwardAnalysis<S>,
        analyzer: &mut dyn NextPhaseAnalyzer<S>,
    ) {
        assert!(!self.is_analysed, "analysis driver run twice");
        self.is_analysed = true;
        assert!(
            analysis.is_analysed(),
            "next phase requires a finished first phase"
        );

        let arena = analysis.arena();
        self.ins = std::iter::repeat_with(|| None).take(arena.len()).collect();
        self.outs = std::iter::repeat_with(|| None).take(arena.len()).collect();

        let seed = match self.direction {
            AnalysisDirection::Forward => analysis.graph().start,
            AnalysisDirection::Backward => analysis.graph().end,
        };
        let mut entry_input = self
            .entry_input
            .take()
            .expect("entry input present until analysis runs");
        entry_input.commit_transaction();
        self.ins[seed.index()] = Some(entry_input);
        self.outs[seed.index()] = Some(FlowSet::new(
            (self.snapshot_factory)(),
            self.config.widening_limit,
        ));

        let mut worklist = WorkList::new();
        worklist.add_work(seed, arena);

        let mut visits: usize = 0;
        while let Some(point) = worklist.next() {
            if visits >= self.config.max_visits {
                warn!(visits, "visit limit reached, aborting fixpoint");
                break;
            }
            visits += 1;
            self.visit(point, seed, arena, analyzer, &mut worklist);
        }
        debug!(visits, direction = ?self.direction, "phase fixpoint reached");

        for set in self.ins.iter_mut().chain(self.outs.iter_mut()).flatten() {
            set.freeze();
        }
    }

    fn visit(
        &mut self,
        point: PointId,
        seed: PointId,
        arena: &PointArena<S>,
        analyzer: &mut dyn NextPhaseAnalyzer<S>,
        worklist: &mut WorkList,
    ) {
        self.ensure_sets(point);
        self.extend_input(point, seed, arena);
        self.transfer(point, arena, analyzer);

        let out_set = self.outs[point.index()]
            .as_mut()
            .expect("phase sets ensured above");
        out_set.commit_transaction();
        if !out_set.has_changes() {
            return;
        }

        // A branch the first phase proved dead stays dead in every phase.
        let node = arena.point(point);
        if matches!(node.kind, PointKind::Assume { .. }) && !node.assumed {
            return;
        }
        let successors = match self.direction {
            AnalysisDirection::Forward => &node.flow_children,
            AnalysisDirection::Backward => &node.flow_parents,
        };
        for successor in successors {
            worklist.add_work(*successor, arena);
        }
    }

    fn ensure_sets(&mut self, point: PointId) {
        let limit = self.config.widening_limit;
        if self.ins[point.index()].is_none() {
            self.ins[point.index()] = Some(FlowSet::new((self.snapshot_factory)(), limit));
        }
        if self.outs[point.index()].is_none() {
            self.outs[point.index()] = Some(FlowSet::new((self.snapshot_factory)(), limit));
        }
    }

    /// Join the phase outputs of the direction predecessors into this
    /// point's phase input
    ///
    /// A forward phase mirrors the first phase's input modes at branch
    /// entries and sinks, reusing the first phase's recorded call states. A
    /// backward phase joins plainly everywhere, walking the same edges
    /// against their direction.
    fn extend_input(&mut self, point: PointId, seed: PointId, arena: &PointArena<S>) {
        let node = arena.point(point);
        let predecessors = match self.direction {
            AnalysisDirection::Forward => &node.flow_parents,
            AnalysisDirection::Backward => &node.flow_children,
        };
        if point == seed && predecessors.is_empty() {
            return;
        }

        let mut in_set = self.ins[point.index()]
            .take()
            .expect("phase sets ensured before input extension");
        in_set.start_transaction();

        let forward_splice = match (&node.kind, self.direction) {
            (PointKind::ExtensionBranch { caller, splice }, AnalysisDirection::Forward) => {
                Some((*caller, Some(*splice)))
            }
            (PointKind::ExtensionSink { owner }, AnalysisDirection::Forward) => {
                Some((*owner, None))
            }
            _ => None,
        };

        match forward_splice {
            Some((caller, Some(splice))) => {
                if let Some(caller_out) = self.committed_out(caller) {
                    match splice {
                        SpliceKind::Call => {
                            let call_state: &CallState<S> = &arena.point(caller).call_state;
                            let arguments = call_state.arguments.clone().unwrap_or_default();
                            let called_object = call_state.called_object.clone();
                            in_set.snapshot_mut().extend_as_call(
                                caller_out,
                                called_object.as_ref(),
                                &arguments,
                            );
                        }
                        SpliceKind::Include => in_set.snapshot_mut().extend(&[caller_out]),
                    }
                }
            }
            Some((owner, None)) => {
                let end_ids: Vec<PointId> = match &arena.point(owner).extension {
                    Some(extension) => {
                        extension.branches().map(|(_, b)| b.graph.end).collect()
                    }
                    None => Vec::new(),
                };
                if let Some(owner_out) = self.committed_out(owner) {
                    let ends: Vec<&S> = end_ids
                        .iter()
                        .filter_map(|id| self.committed_out(*id))
                        .collect();
                    if ends.is_empty() {
                        in_set.snapshot_mut().extend(&[owner_out]);
                    } else {
                        in_set.snapshot_mut().merge_with_call_level(owner_out, &ends);
                    }
                }
            }
            None => {
                let sources: Vec<&S> = predecessors
                    .iter()
                    .filter_map(|id| {
                        let predecessor = arena.point(*id);
                        if matches!(predecessor.kind, PointKind::Assume { .. })
                            && !predecessor.assumed
                        {
                            return None;
                        }
                        self.committed_out(*id)
                    })
                    .collect();
                in_set.snapshot_mut().extend(&sources);
            }
        }

        in_set.commit_transaction();
        self.ins[point.index()] = Some(in_set);
    }

    fn transfer(
        &mut self,
        point: PointId,
        arena: &PointArena<S>,
        analyzer: &mut dyn NextPhaseAnalyzer<S>,
    ) {
        let node = arena.point(point);
        let kind = node.kind.clone();
        let source = node.source.clone();
        let expr = match &kind {
            PointKind::Value { expr } => Some(*expr),
            _ => None,
        };

        let in_snapshot = self.ins[point.index()]
            .as_ref()
            .expect("phase sets ensured before transfer")
            .snapshot();
        let out_set = self.outs[point.index()]
            .as_mut()
            .expect("phase sets ensured before transfer");
        out_set.start_transaction();
        out_set.snapshot_mut().extend(&[in_snapshot]);

        // Next phases do not resolve new calls, so the call state is a
        // per-visit scratch value.
        let mut scratch: CallState<S> = CallState::new();
        let mut ctx = FlowContext::new(
            point,
            expr,
            source.as_deref(),
            in_snapshot,
            out_set.snapshot_mut(),
            &mut scratch.arguments,
            &mut scratch.called_object,
            &mut self.warnings,
        );
        analyzer.flow_through(&mut ctx, &kind);
    }

    fn committed_out(&self, point: PointId) -> Option<&S> {
        self.outs[point.index()]
            .as_ref()
            .filter(|set| set.is_committed())
            .map(|set| set.snapshot())
    }

    /// Committed phase input of a point
    pub fn in_snapshot(&self, point: PointId) -> Option<&S> {
        self.ins[point.index()]
            .as_ref()
            .filter(|set| set.is_committed())
            .map(|set| set.snapshot())
    }

    /// Committed phase output of a point
    pub fn out_snapshot(&self, point: PointId) -> Option<&S> {
        self.committed_out(point)
    }

    /// Warnings collected by this phase
    pub fn warnings(&self) -> &[AnalysisWarning] {
        &self.warnings
    }

    /// Direction this phase walks the graph in
    pub fn direction(&self) -> AnalysisDirection {
        self.direction
    }
}
