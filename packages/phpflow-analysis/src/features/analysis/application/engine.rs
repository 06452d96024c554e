//! Per-point flow protocol
//!
//! One visit of a program point runs a fixed protocol: attach flow sets on
//! first contact, extend the input from the live parents, extend the output
//! from the input, run the kind-specific transfer, reconcile call branches
//! against the resolver's desired set, commit the output, and schedule the
//! children when the committed output changed.

use tracing::trace;

use crate::config::AnalysisConfig;
use crate::errors::Result;
use crate::features::analysis::domain::AnalysisWarning;
use crate::features::analysis::ports::{
    BranchTarget, CallTarget, Evaluator, FlowContext, FlowResolver, FunctionResolver,
};
use crate::features::interprocedural::domain::{
    add_branch, remove_branch, BranchKey, SpliceKind,
};
use crate::features::memory::domain::FlowSet;
use crate::features::memory::ports::Snapshot;
use crate::features::points_graph::domain::{PointArena, PointId, PointKind, ProgramPointGraph};
use crate::features::scheduler::domain::WorkList;
use crate::shared::models::Expr;

#[derive(Clone, Copy)]
enum InputShape {
    Plain,
    Branch { caller: PointId, splice: SpliceKind },
    Sink { owner: PointId },
}

/// The engine of one fixpoint run, borrowing the driver's state
pub(crate) struct FlowEngine<'a, S: Snapshot> {
    pub arena: &'a mut PointArena<S>,
    pub worklist: &'a mut WorkList,
    pub evaluator: &'a mut dyn Evaluator<S>,
    pub flow_resolver: &'a mut dyn FlowResolver<S>,
    pub function_resolver: &'a mut dyn FunctionResolver<S>,
    pub snapshot_factory: &'a mut dyn FnMut() -> S,
    pub config: &'a AnalysisConfig,
    pub warnings: &'a mut Vec<AnalysisWarning>,
}

impl<'a, S: Snapshot> FlowEngine<'a, S> {
    /// Run the whole protocol on one point
    pub fn flow_through(&mut self, point: PointId) -> Result<()> {
        trace!(%point, "flow through");
        self.ensure_initialized(point);
        self.extend_input(point);
        let branch_updates = self.transfer(point);
        if let Some((splice, targets)) = branch_updates {
            self.apply_branch_updates(point, splice, targets)?;
        }
        if self.commit_output(point) {
            self.enqueue_children(point);
        }
        Ok(())
    }

    fn ensure_initialized(&mut self, point: PointId) {
        if self.arena.point(point).is_initialized() {
            return;
        }
        let limit = self.config.widening_limit;
        let in_set = FlowSet::new((self.snapshot_factory)(), limit);
        let out_set = FlowSet::new((self.snapshot_factory)(), limit);
        self.arena.initialize(point, in_set, out_set);
    }

    /// Rebuild the point's input from its live parents
    ///
    /// A parent is live when its output has been committed and it is not an
    /// unconfirmed assume point. Branch entries pull from their caller's
    /// output across the call boundary; sinks merge the branch exits back
    /// into the caller's flow.
    fn extend_input(&mut self, point: PointId) {
        let shape = match &self.arena.point(point).kind {
            PointKind::ExtensionBranch { caller, splice } => InputShape::Branch {
                caller: *caller,
                splice: *splice,
            },
            PointKind::ExtensionSink { owner } => InputShape::Sink { owner: *owner },
            _ => InputShape::Plain,
        };

        if matches!(shape, InputShape::Plain) && self.arena.point(point).flow_parents.is_empty() {
            // Entry points keep their seeded input.
            return;
        }

        let mut in_set = self
            .arena
            .point_mut(point)
            .in_set
            .take()
            .expect("flow set attached before input extension");
        in_set.start_transaction();

        match shape {
            InputShape::Branch { caller, splice } => {
                let caller_point = self.arena.point(caller);
                let caller_out = caller_point
                    .out_set
                    .as_ref()
                    .expect("caller flowed before its branches")
                    .snapshot();
                match splice {
                    SpliceKind::Call => {
                        let arguments = caller_point.call_state.arguments.clone().unwrap_or_default();
                        let called_object = caller_point.call_state.called_object.clone();
                        in_set.snapshot_mut().extend_as_call(
                            caller_out,
                            called_object.as_ref(),
                            &arguments,
                        );
                    }
                    SpliceKind::Include => in_set.snapshot_mut().extend(&[caller_out]),
                }
            }
            InputShape::Sink { owner } => {
                let end_ids: Vec<PointId> = match &self.arena.point(owner).extension {
                    Some(extension) => {
                        extension.branches().map(|(_, b)| b.graph.end).collect()
                    }
                    None => Vec::new(),
                };
                let owner_out = self
                    .arena
                    .point(owner)
                    .out_set
                    .as_ref()
                    .expect("owner flowed before its sink")
                    .snapshot();
                let ends: Vec<&S> = end_ids
                    .iter()
                    .filter_map(|id| self.arena.point(*id).out_set.as_ref())
                    .filter(|set| set.is_committed())
                    .map(|set| set.snapshot())
                    .collect();
                if ends.is_empty() {
                    in_set.snapshot_mut().extend(&[owner_out]);
                } else {
                    in_set.snapshot_mut().merge_with_call_level(owner_out, &ends);
                }
            }
            InputShape::Plain => {
                let parent_ids = self.arena.point(point).flow_parents.clone();
                let sources: Vec<&S> = parent_ids
                    .iter()
                    .filter_map(|id| {
                        let parent = self.arena.point(*id);
                        if matches!(parent.kind, PointKind::Assume { .. }) && !parent.assumed {
                            return None;
                        }
                        parent
                            .out_set
                            .as_ref()
                            .filter(|set| set.is_committed())
                            .map(|set| set.snapshot())
                    })
                    .collect();
                in_set.snapshot_mut().extend(&sources);
            }
        }

        in_set.commit_transaction();
        self.arena.point_mut(point).in_set = Some(in_set);
    }

    /// Open the output transaction, seed it from the input and run the
    /// kind-specific transfer; the transaction stays open for branch
    /// reconciliation and is closed by `commit_output`
    fn transfer(&mut self, point: PointId) -> Option<(SpliceKind, Vec<CallTarget<S>>)> {
        let kind = self.arena.point(point).kind.clone();
        let source = self.arena.point(point).source.clone();
        let sink_branches: Vec<BranchKey> = match &kind {
            PointKind::ExtensionSink { owner } => match &self.arena.point(*owner).extension {
                Some(extension) => extension.branch_keys().cloned().collect(),
                None => Vec::new(),
            },
            _ => Vec::new(),
        };

        let mut out_set = self
            .arena
            .point_mut(point)
            .out_set
            .take()
            .expect("flow set attached before transfer");
        out_set.start_transaction();

        let mut branch_updates = None;
        let mut assumed_update = None;
        {
            let node = self.arena.point_mut(point);
            let in_snapshot = node
                .in_set
                .as_ref()
                .expect("input extended before transfer")
                .snapshot();
            out_set.snapshot_mut().extend(&[in_snapshot]);

            let expr = match &kind {
                PointKind::Value { expr } => Some(*expr),
                _ => None,
            };
            let mut ctx = FlowContext::new(
                point,
                expr,
                source.as_deref(),
                in_snapshot,
                out_set.snapshot_mut(),
                &mut node.call_state.arguments,
                &mut node.call_state.called_object,
                self.warnings,
            );

            match &kind {
                PointKind::Empty | PointKind::ExtensionBranch { .. } => {}
                PointKind::Value { expr } => {
                    // Construction validated every handle against the
                    // point's immutable source CFG.
                    let expr_node = ctx
                        .expr_at(*expr)
                        .expect("value point expression resolved at construction");
                    self.evaluator.eval(&mut ctx, expr_node);
                    match expr_node {
                        Expr::Call {
                            function,
                            arguments,
                        } => {
                            let targets =
                                self.function_resolver
                                    .resolve_call(&mut ctx, function, arguments);
                            branch_updates = Some((SpliceKind::Call, targets));
                        }
                        Expr::Include { target } => {
                            let targets =
                                self.function_resolver.resolve_include(&mut ctx, target);
                            branch_updates = Some((SpliceKind::Include, targets));
                        }
                        _ => {}
                    }
                }
                PointKind::Native { hook } => hook.run(&mut ctx),
                PointKind::Assume { condition } => {
                    assumed_update =
                        Some(self.flow_resolver.confirm_assumption(&mut ctx, condition));
                }
                PointKind::TryScopeStart { catches } => {
                    self.flow_resolver.try_scope_start(&mut ctx, catches);
                }
                PointKind::TryScopeEnd { catches } => {
                    self.flow_resolver.try_scope_end(&mut ctx, catches);
                }
                PointKind::ExtensionSink { .. } => {
                    self.function_resolver.resolve_return(&mut ctx, &sink_branches);
                }
            }
        }

        if let Some(assumed) = assumed_update {
            self.arena.point_mut(point).assumed = assumed;
        }
        self.arena.point_mut(point).out_set = Some(out_set);
        branch_updates
    }

    /// Reconcile the attached branches with the resolver's desired set:
    /// detach branches no longer resolved, attach and schedule new ones
    fn apply_branch_updates(
        &mut self,
        point: PointId,
        splice: SpliceKind,
        targets: Vec<CallTarget<S>>,
    ) -> Result<()> {
        let attached: Vec<BranchKey> = match &self.arena.point(point).extension {
            Some(extension) => extension.branch_keys().cloned().collect(),
            None => Vec::new(),
        };
        let desired: Vec<BranchKey> = targets.iter().map(|t| t.key.clone()).collect();

        let mut changed = false;
        for key in &attached {
            if !desired.contains(key) {
                remove_branch(self.arena, point, key);
                changed = true;
            }
        }

        let mut new_entries = Vec::new();
        for target in targets {
            if attached.contains(&target.key) {
                continue;
            }
            let graph = match target.target {
                BranchTarget::Source(cfg) => ProgramPointGraph::from_cfg(cfg, self.arena)?,
                BranchTarget::Native(hook) => ProgramPointGraph::from_native(hook, self.arena),
            };
            new_entries.push(add_branch(self.arena, point, target.key, graph, splice));
            changed = true;
        }

        for entry in new_entries {
            self.worklist.add_work(entry, self.arena);
        }
        if changed {
            if let Some(extension) = &self.arena.point(point).extension {
                let sink = extension.sink();
                self.worklist.add_work(sink, self.arena);
            }
        }
        Ok(())
    }

    fn commit_output(&mut self, point: PointId) -> bool {
        let out_set = self
            .arena
            .point_mut(point)
            .out_set
            .as_mut()
            .expect("flow set attached before commit");
        out_set.commit_transaction();
        out_set.has_changes()
    }

    /// Schedule the children of a point whose output changed; an
    /// unconfirmed assume point blocks its whole branch
    fn enqueue_children(&mut self, point: PointId) {
        let node = self.arena.point(point);
        if matches!(node.kind, PointKind::Assume { .. }) && !node.assumed {
            return;
        }
        let children = node.flow_children.clone();
        for child in children {
            self.worklist.add_work(child, self.arena);
        }
    }
}
