//! Program point graph construction from a basic-block CFG
//!
//! Construction runs in two phases over the reachable blocks. The first
//! phase walks blocks breadth first and expands each into a linked chain of
//! points. The second phase wires block edges: plain successor edges,
//! condition chains with assume points on conditional edges, the negated
//! assume point guarding the default branch, and the catch targets of try
//! scope points. Condition chains are memoized per expression so that every
//! edge guarded by the same expression routes through one chain.

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::errors::{AnalysisError, Result};
use crate::features::memory::ports::Snapshot;
use crate::features::points_graph::domain::{
    AssumptionCondition, CatchBlockDescription, ConditionForm, PointArena, PointId, PointKind,
    ProgramPointGraph,
};
use crate::shared::models::{BlockId, ControlFlowGraph, Expr, ExprId};

use super::points_block::PointsBlock;

pub struct GraphBuilder<'a, S: Snapshot> {
    cfg: Arc<ControlFlowGraph>,
    arena: &'a mut PointArena<S>,
    block_memo: FxHashMap<BlockId, PointsBlock>,
    condition_memo: FxHashMap<ExprId, PointsBlock>,
    created: Vec<PointId>,
    /// Try scope points whose catch targets still need resolution, paired
    /// with the try block carrying the catch declarations
    scope_patches: Vec<(PointId, BlockId)>,
}

impl<'a, S: Snapshot> GraphBuilder<'a, S> {
    pub fn new(cfg: Arc<ControlFlowGraph>, arena: &'a mut PointArena<S>) -> Self {
        Self {
            cfg,
            arena,
            block_memo: FxHashMap::default(),
            condition_memo: FxHashMap::default(),
            created: Vec::new(),
            scope_patches: Vec::new(),
        }
    }

    pub fn build(mut self) -> Result<ProgramPointGraph> {
        let start = self.alloc(PointKind::Empty);

        self.expand_reachable_blocks()?;
        let entry = self.block_memo[&self.cfg.entry];
        self.arena.add_flow_child(start, entry.first);

        self.connect_blocks()?;
        self.patch_scope_points()?;

        let end = self.alloc(PointKind::Empty);
        self.connect_childless_points(end);

        debug!(
            points = self.created.len(),
            blocks = self.block_memo.len(),
            "program point graph built"
        );

        Ok(ProgramPointGraph {
            start,
            end,
            points: self.created,
            owning_script: self.cfg.file.clone(),
            function_name: self.cfg.function_name.clone(),
        })
    }

    fn alloc(&mut self, kind: PointKind<S>) -> PointId {
        let id = self.arena.alloc(kind, Some(Arc::clone(&self.cfg)));
        self.created.push(id);
        id
    }

    /// Phase one: breadth-first expansion of every reachable block into a
    /// linked point chain
    fn expand_reachable_blocks(&mut self) -> Result<()> {
        let mut pending = VecDeque::new();
        pending.push_back(self.cfg.entry);

        while let Some(block_id) = pending.pop_front() {
            if self.block_memo.contains_key(&block_id) {
                continue;
            }
            let block = self
                .cfg
                .block(block_id)
                .ok_or_else(|| AnalysisError::invalid_cfg(format!("dangling block {block_id}")))?
                .clone();

            let chain = self.expand_block(block_id)?;
            self.block_memo.insert(block_id, chain);

            pending.extend(block.successors.iter().copied());
            pending.extend(block.conditional_edges.iter().map(|e| e.target));
            pending.extend(block.default_branch);
            pending.extend(block.catch_targets.iter().map(|c| c.target));
        }
        Ok(())
    }

    fn expand_block(&mut self, block_id: BlockId) -> Result<PointsBlock> {
        let block = self
            .cfg
            .block(block_id)
            .ok_or_else(|| AnalysisError::invalid_cfg(format!("dangling block {block_id}")))?
            .clone();

        let mut points = Vec::new();
        for ending in &block.ending_try_blocks {
            let point = self.alloc(PointKind::TryScopeEnd { catches: Vec::new() });
            self.scope_patches.push((point, *ending));
            points.push(point);
        }
        if !block.catch_targets.is_empty() {
            let point = self.alloc(PointKind::TryScopeStart { catches: Vec::new() });
            self.scope_patches.push((point, block_id));
            points.push(point);
        }
        for statement in &block.statements {
            self.expand_expr(*statement, &mut points)?;
        }
        if points.is_empty() {
            points.push(self.alloc(PointKind::Empty));
        }
        Ok(PointsBlock::link(self.arena, &points))
    }

    /// Post-order expansion of an expression tree into value points, one
    /// per node with operands before their consumer
    fn expand_expr(&mut self, expr_id: ExprId, points: &mut Vec<PointId>) -> Result<()> {
        let expr = self
            .cfg
            .expr(expr_id)
            .ok_or_else(|| {
                AnalysisError::invalid_cfg(format!("dangling expression {expr_id}"))
            })?
            .clone();

        match &expr {
            Expr::Literal(_) | Expr::Variable(_) | Expr::Include { .. } => {}
            Expr::Unary { operand, .. } => self.expand_expr(*operand, points)?,
            Expr::Binary { left, right, .. } => {
                self.expand_expr(*left, points)?;
                self.expand_expr(*right, points)?;
            }
            Expr::Assign { value, .. } => self.expand_expr(*value, points)?,
            Expr::Call { arguments, .. } => {
                for argument in arguments {
                    self.expand_expr(*argument, points)?;
                }
            }
        }
        points.push(self.alloc(PointKind::Value { expr: expr_id }));
        Ok(())
    }

    /// Phase two: wire block-level edges between the expanded chains
    fn connect_blocks(&mut self) -> Result<()> {
        let block_ids: Vec<BlockId> = self.block_memo.keys().copied().collect();
        for block_id in block_ids {
            let block = self
                .cfg
                .block(block_id)
                .ok_or_else(|| AnalysisError::invalid_cfg(format!("dangling block {block_id}")))?
                .clone();
            let chain = self.block_memo[&block_id];

            for successor in &block.successors {
                let target = self.memoized_block(*successor)?;
                self.arena.add_flow_child(chain.last, target.first);
            }

            let mut condition_chains = Vec::new();
            for edge in &block.conditional_edges {
                let condition = self.condition_chain(edge.condition)?;
                condition_chains.push(condition);
                self.arena.add_flow_child(chain.last, condition.first);

                let assume = self.alloc(PointKind::Assume {
                    condition: AssumptionCondition::new(ConditionForm::All, vec![edge.condition]),
                });
                let target = self.memoized_block(edge.target)?;
                self.arena.add_flow_child(condition.last, assume);
                self.arena.add_flow_child(assume, target.first);
            }

            if let Some(default_branch) = block.default_branch {
                let target = self.memoized_block(default_branch)?;
                if condition_chains.is_empty() {
                    self.arena.add_flow_child(chain.last, target.first);
                } else {
                    // The default branch is taken when at least one guard
                    // may fail.
                    let parts = block.conditional_edges.iter().map(|e| e.condition).collect();
                    let assume = self.alloc(PointKind::Assume {
                        condition: AssumptionCondition::new(ConditionForm::SomeNot, parts),
                    });
                    for condition in &condition_chains {
                        self.arena.add_flow_child(condition.last, assume);
                    }
                    self.arena.add_flow_child(assume, target.first);
                }
            }
        }
        Ok(())
    }

    fn memoized_block(&self, block_id: BlockId) -> Result<PointsBlock> {
        self.block_memo.get(&block_id).copied().ok_or_else(|| {
            AnalysisError::invalid_cfg(format!("dangling block {block_id}"))
        })
    }

    fn condition_chain(&mut self, condition: ExprId) -> Result<PointsBlock> {
        if let Some(chain) = self.condition_memo.get(&condition) {
            return Ok(*chain);
        }
        let mut points = Vec::new();
        self.expand_expr(condition, &mut points)?;
        let chain = PointsBlock::link(self.arena, &points);
        self.condition_memo.insert(condition, chain);
        Ok(chain)
    }

    /// Resolve the catch targets of try scope points now that every handler
    /// block has a chain
    fn patch_scope_points(&mut self) -> Result<()> {
        for (point, try_block) in std::mem::take(&mut self.scope_patches) {
            let block = self
                .cfg
                .block(try_block)
                .ok_or_else(|| AnalysisError::invalid_cfg(format!("dangling block {try_block}")))?
                .clone();
            let mut resolved = Vec::with_capacity(block.catch_targets.len());
            for catch in &block.catch_targets {
                let target = self.memoized_block(catch.target)?;
                resolved.push(CatchBlockDescription {
                    class_name: catch.class_name.clone(),
                    variable: catch.variable.clone(),
                    target: target.first,
                });
            }
            match &mut self.arena.point_mut(point).kind {
                PointKind::TryScopeStart { catches } | PointKind::TryScopeEnd { catches } => {
                    *catches = resolved;
                }
                _ => panic!("scope patch on a non-scope point"),
            }
        }
        Ok(())
    }

    /// Every point without successors flows into the graph end
    fn connect_childless_points(&mut self, end: PointId) {
        for point in self.created.clone() {
            if point != end && self.arena.point(point).flow_children.is_empty() {
                self.arena.add_flow_child(point, end);
            }
        }
    }
}
