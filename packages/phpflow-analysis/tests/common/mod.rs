//! Shared test fixtures: a small value-set domain over integers and the
//! concrete collaborators driving it.
//!
//! The domain maps variable names to finite sets of integers, with `Top`
//! as the widened unknown. Call levels are tracked so the merge after a
//! call can tell caller-level states (includes) from callee-level ones.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use phpflow_analysis::{
    BasicBlock, BinaryOp, BranchKey, BranchTarget, CallTarget, ConditionalEdge, ControlFlowGraph,
    Evaluator, Expr, ExprId, FlowContext, FlowResolver, FunctionResolver, Literal, NativeHook,
    Snapshot, UnaryOp, WarningSeverity,
};
use phpflow_analysis::{AssumptionCondition, ConditionForm};

/// Widening width: result sets larger than this collapse to `Top`
const MAX_WIDTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Values {
    Set(BTreeSet<i64>),
    Top,
}

impl Values {
    pub fn empty() -> Self {
        Values::Set(BTreeSet::new())
    }

    pub fn singleton(v: i64) -> Self {
        Values::Set(BTreeSet::from([v]))
    }

    pub fn of(vals: &[i64]) -> Self {
        Values::Set(vals.iter().copied().collect())
    }

    pub fn union(&self, other: &Self) -> Self {
        match (self, other) {
            (Values::Top, _) | (_, Values::Top) => Values::Top,
            (Values::Set(a), Values::Set(b)) => {
                let joined: BTreeSet<i64> = a.union(b).copied().collect();
                if joined.len() > MAX_WIDTH {
                    Values::Top
                } else {
                    Values::Set(joined)
                }
            }
        }
    }

    pub fn contains(&self, v: i64) -> bool {
        match self {
            Values::Top => true,
            Values::Set(s) => s.contains(&v),
        }
    }

    pub fn is_superset(&self, other: &Self) -> bool {
        match (self, other) {
            (Values::Top, _) => true,
            (Values::Set(_), Values::Top) => false,
            (Values::Set(a), Values::Set(b)) => b.is_subset(a),
        }
    }

    pub fn may_true(&self) -> bool {
        match self {
            Values::Top => true,
            Values::Set(s) => s.iter().any(|v| *v != 0),
        }
    }

    pub fn may_false(&self) -> bool {
        self.contains(0)
    }

    fn map(&self, f: impl Fn(i64) -> i64) -> Self {
        match self {
            Values::Top => Values::Top,
            Values::Set(s) => {
                let mapped: BTreeSet<i64> = s.iter().copied().map(f).collect();
                if mapped.len() > MAX_WIDTH {
                    Values::Top
                } else {
                    Values::Set(mapped)
                }
            }
        }
    }

    fn product(&self, other: &Self, f: impl Fn(i64, i64) -> i64) -> Self {
        match (self, other) {
            (Values::Set(a), Values::Set(b)) => {
                let mut out = BTreeSet::new();
                for x in a {
                    for y in b {
                        out.insert(f(*x, *y));
                        if out.len() > MAX_WIDTH {
                            return Values::Top;
                        }
                    }
                }
                Values::Set(out)
            }
            _ => Values::Top,
        }
    }

    fn compare(&self, other: &Self, f: impl Fn(i64, i64) -> bool) -> Self {
        match (self, other) {
            (Values::Set(a), Values::Set(b)) if !a.is_empty() && !b.is_empty() => {
                let mut out = BTreeSet::new();
                for x in a {
                    for y in b {
                        out.insert(f(*x, *y) as i64);
                    }
                }
                Values::Set(out)
            }
            _ => Values::of(&[0, 1]),
        }
    }

    pub fn add_const(&self, c: i64) -> Self {
        self.map(|v| v.wrapping_add(c))
    }

    /// Keep only values satisfying `pred`; `Top` cannot be filtered
    pub fn filter(&self, pred: impl Fn(i64) -> bool) -> Self {
        match self {
            Values::Top => Values::Top,
            Values::Set(s) => Values::Set(s.iter().copied().filter(|v| pred(*v)).collect()),
        }
    }
}

/// Abstract state: variable name to value set, plus the call level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetSnapshot {
    pub vars: BTreeMap<String, Values>,
    pub level: u32,
    saved: Option<(BTreeMap<String, Values>, u32)>,
}

impl SetSnapshot {
    pub fn new() -> Self {
        Self {
            vars: BTreeMap::new(),
            level: 0,
            saved: None,
        }
    }

    pub fn var(&self, name: &str) -> Values {
        self.vars.get(name).cloned().unwrap_or_else(Values::empty)
    }
}

impl Snapshot for SetSnapshot {
    type Value = Values;

    fn start_transaction(&mut self) {
        self.saved = Some((self.vars.clone(), self.level));
    }

    fn commit_transaction(&mut self) -> bool {
        match self.saved.take() {
            Some((vars, level)) => vars != self.vars || level != self.level,
            None => true,
        }
    }

    fn widen_and_commit_transaction(&mut self) -> bool {
        let saved = self.saved.take();
        if let Some((before, _)) = &saved {
            // Every variable still moving collapses to Top.
            for (name, values) in self.vars.iter_mut() {
                if before.get(name) != Some(values) {
                    *values = Values::Top;
                }
            }
        }
        match saved {
            Some((vars, level)) => vars != self.vars || level != self.level,
            None => true,
        }
    }

    fn extend(&mut self, sources: &[&Self]) {
        let mut vars: BTreeMap<String, Values> = BTreeMap::new();
        let mut level = 0;
        for source in sources {
            for (name, values) in &source.vars {
                vars.entry(name.clone())
                    .and_modify(|v| *v = v.union(values))
                    .or_insert_with(|| values.clone());
            }
            level = level.max(source.level);
        }
        self.vars = vars;
        self.level = level;
    }

    fn extend_as_call(
        &mut self,
        caller: &Self,
        called_object: Option<&Values>,
        arguments: &[Values],
    ) {
        self.level = caller.level + 1;
        self.vars = caller
            .vars
            .iter()
            .filter(|(name, _)| name.starts_with("g_"))
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect();
        for (i, argument) in arguments.iter().enumerate() {
            self.vars.insert(format!("arg{i}"), argument.clone());
        }
        if let Some(object) = called_object {
            self.vars.insert("this".into(), object.clone());
        }
    }

    fn merge_with_call_level(&mut self, caller: &Self, branch_outputs: &[&Self]) {
        self.level = caller.level;
        self.vars = caller.vars.clone();
        // The call result is whatever the branches produced, not the stale
        // caller binding.
        self.vars.remove("ret");
        for output in branch_outputs {
            if output.level > caller.level {
                for (name, values) in &output.vars {
                    if name.starts_with("g_") || name == "ret" {
                        self.vars
                            .entry(name.clone())
                            .and_modify(|v| *v = v.union(values))
                            .or_insert_with(|| values.clone());
                    }
                }
            } else {
                for (name, values) in &output.vars {
                    self.vars
                        .entry(name.clone())
                        .and_modify(|v| *v = v.union(values))
                        .or_insert_with(|| values.clone());
                }
            }
        }
    }
}

/// Recursive evaluation of an expression against a state
pub fn eval_expr(cfg: &ControlFlowGraph, snapshot: &SetSnapshot, id: ExprId) -> Values {
    let expr = cfg.expr(id).expect("expression handle valid in tests");
    match expr {
        Expr::Literal(Literal::Int(v)) => Values::singleton(*v),
        Expr::Literal(Literal::Bool(b)) => Values::singleton(*b as i64),
        Expr::Literal(Literal::Null) => Values::singleton(0),
        Expr::Literal(_) => Values::Top,
        Expr::Variable(name) => snapshot.var(name),
        Expr::Unary { op, operand } => {
            let v = eval_expr(cfg, snapshot, *operand);
            match op {
                UnaryOp::Minus => v.map(|x| x.wrapping_neg()),
                UnaryOp::Plus => v,
                UnaryOp::Not => {
                    let mut out = BTreeSet::new();
                    if v.may_true() {
                        out.insert(0);
                    }
                    if v.may_false() {
                        out.insert(1);
                    }
                    Values::Set(out)
                }
                UnaryOp::BitNot => Values::Top,
            }
        }
        Expr::Binary { op, left, right } => {
            let l = eval_expr(cfg, snapshot, *left);
            let r = eval_expr(cfg, snapshot, *right);
            match op {
                BinaryOp::Add => l.product(&r, |a, b| a.wrapping_add(b)),
                BinaryOp::Sub => l.product(&r, |a, b| a.wrapping_sub(b)),
                BinaryOp::Mul => l.product(&r, |a, b| a.wrapping_mul(b)),
                BinaryOp::Lt => l.compare(&r, |a, b| a < b),
                BinaryOp::LtEq => l.compare(&r, |a, b| a <= b),
                BinaryOp::Gt => l.compare(&r, |a, b| a > b),
                BinaryOp::GtEq => l.compare(&r, |a, b| a >= b),
                BinaryOp::Eq | BinaryOp::Identical => l.compare(&r, |a, b| a == b),
                BinaryOp::NotEq | BinaryOp::NotIdentical => l.compare(&r, |a, b| a != b),
                BinaryOp::And => l.compare(&r, |a, b| a != 0 && b != 0),
                BinaryOp::Or => l.compare(&r, |a, b| a != 0 || b != 0),
                _ => Values::Top,
            }
        }
        Expr::Assign { value, .. } => eval_expr(cfg, snapshot, *value),
        // The merged call result sits in `ret` after the sink.
        Expr::Call { .. } => snapshot.var("ret"),
        Expr::Include { .. } => Values::singleton(0),
    }
}

/// Evaluator binding assignments and call arguments
pub struct ConcreteEvaluator;

impl Evaluator<SetSnapshot> for ConcreteEvaluator {
    fn eval(&mut self, flow: &mut FlowContext<'_, SetSnapshot>, expr: &Expr) {
        let cfg = flow.cfg.expect("value points carry a source CFG");
        match expr {
            Expr::Assign { target, value } => {
                let v = eval_expr(cfg, flow.in_snapshot, *value);
                flow.out_snapshot.vars.insert(target.clone(), v);
            }
            Expr::Call { arguments, .. } => {
                let args: Vec<Values> = arguments
                    .iter()
                    .map(|a| eval_expr(cfg, flow.in_snapshot, *a))
                    .collect();
                *flow.arguments = Some(args);
            }
            Expr::Variable(name) => {
                if !flow.in_snapshot.vars.contains_key(name) {
                    flow.warn(WarningSeverity::Notice, format!("undefined variable {name}"));
                }
            }
            _ => {}
        }
    }
}

/// Confirms assumptions by evaluating their parts against the input, and
/// narrows `var OP literal` comparisons in the output state
pub struct SetFlowResolver;

impl SetFlowResolver {
    /// Restrict the assumed variable when a part has the shape
    /// `Variable OP IntLiteral`
    fn refine(
        cfg: &ControlFlowGraph,
        out: &mut SetSnapshot,
        part: ExprId,
        expect_true: bool,
    ) {
        let Some(Expr::Binary { op, left, right }) = cfg.expr(part) else {
            return;
        };
        let (Some(Expr::Variable(name)), Some(Expr::Literal(Literal::Int(c)))) =
            (cfg.expr(*left), cfg.expr(*right))
        else {
            return;
        };
        let c = *c;
        let holds: Box<dyn Fn(i64) -> bool> = match op {
            BinaryOp::Lt => Box::new(move |v| v < c),
            BinaryOp::LtEq => Box::new(move |v| v <= c),
            BinaryOp::Gt => Box::new(move |v| v > c),
            BinaryOp::GtEq => Box::new(move |v| v >= c),
            BinaryOp::Eq | BinaryOp::Identical => Box::new(move |v| v == c),
            BinaryOp::NotEq | BinaryOp::NotIdentical => Box::new(move |v| v != c),
            _ => return,
        };
        if let Some(values) = out.vars.get(name) {
            let narrowed = values.filter(|v| holds(v) == expect_true);
            out.vars.insert(name.clone(), narrowed);
        }
    }
}

impl FlowResolver<SetSnapshot> for SetFlowResolver {
    fn confirm_assumption(
        &mut self,
        flow: &mut FlowContext<'_, SetSnapshot>,
        condition: &AssumptionCondition,
    ) -> bool {
        let cfg = flow.cfg.expect("assume points carry a source CFG");
        let value = |part: &ExprId| eval_expr(cfg, flow.in_snapshot, *part);
        let confirmed = match condition.form {
            ConditionForm::All => condition.parts.iter().all(|p| value(p).may_true()),
            ConditionForm::Some => condition.parts.iter().any(|p| value(p).may_true()),
            ConditionForm::SomeNot => condition.parts.iter().any(|p| value(p).may_false()),
            ConditionForm::None => condition.parts.iter().all(|p| value(p).may_false()),
            ConditionForm::ExactlyOne | ConditionForm::NotExactlyOne => true,
        };
        if confirmed {
            match condition.form {
                ConditionForm::All => {
                    for part in &condition.parts {
                        Self::refine(cfg, flow.out_snapshot, *part, true);
                    }
                }
                ConditionForm::SomeNot if condition.parts.len() == 1 => {
                    Self::refine(cfg, flow.out_snapshot, condition.parts[0], false);
                }
                _ => {}
            }
        }
        confirmed
    }
}

enum RegistryTarget {
    Native(NativeHook<SetSnapshot>),
    Source(Arc<ControlFlowGraph>),
}

/// Static routine and include registry
pub struct Registry {
    functions: BTreeMap<String, RegistryTarget>,
    includes: BTreeMap<String, Arc<ControlFlowGraph>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            functions: BTreeMap::new(),
            includes: BTreeMap::new(),
        }
    }

    pub fn with_native(mut self, name: &str, hook: NativeHook<SetSnapshot>) -> Self {
        self.functions
            .insert(name.into(), RegistryTarget::Native(hook));
        self
    }

    pub fn with_function(mut self, name: &str, cfg: Arc<ControlFlowGraph>) -> Self {
        self.functions
            .insert(name.into(), RegistryTarget::Source(cfg));
        self
    }

    pub fn with_include(mut self, name: &str, cfg: Arc<ControlFlowGraph>) -> Self {
        self.includes.insert(name.into(), cfg);
        self
    }
}

impl FunctionResolver<SetSnapshot> for Registry {
    fn resolve_call(
        &mut self,
        flow: &mut FlowContext<'_, SetSnapshot>,
        function: &str,
        _arguments: &[ExprId],
    ) -> Vec<CallTarget<SetSnapshot>> {
        match self.functions.get(function) {
            Some(RegistryTarget::Native(hook)) => vec![CallTarget {
                key: BranchKey::Function(function.into()),
                target: BranchTarget::Native(hook.clone()),
            }],
            Some(RegistryTarget::Source(cfg)) => vec![CallTarget {
                key: BranchKey::Function(function.into()),
                target: BranchTarget::Source(Arc::clone(cfg)),
            }],
            None => {
                flow.warn(
                    WarningSeverity::Warning,
                    format!("call to unknown function {function}"),
                );
                Vec::new()
            }
        }
    }

    fn resolve_include(
        &mut self,
        flow: &mut FlowContext<'_, SetSnapshot>,
        target: &str,
    ) -> Vec<CallTarget<SetSnapshot>> {
        match self.includes.get(target) {
            Some(cfg) => vec![CallTarget {
                key: BranchKey::Include(target.into()),
                target: BranchTarget::Source(Arc::clone(cfg)),
            }],
            None => {
                flow.warn(
                    WarningSeverity::Warning,
                    format!("include of unknown script {target}"),
                );
                Vec::new()
            }
        }
    }
}

/// Native body computing `ret = arg0 + c`
pub fn add_const_hook(c: i64) -> NativeHook<SetSnapshot> {
    NativeHook::new(move |flow: &mut FlowContext<'_, SetSnapshot>| {
        let v = flow.in_snapshot.var("arg0").add_const(c);
        flow.out_snapshot.vars.insert("ret".into(), v);
    })
}

/// `if (x > 0) y = 1; else y = 2;` then `z = y`
///
/// With `swap_blocks` the branch blocks are allocated in the opposite
/// order, changing construction and scheduling order without changing
/// meaning.
pub fn if_else_cfg(swap_blocks: bool) -> Arc<ControlFlowGraph> {
    let mut cfg = ControlFlowGraph::new();
    let x = cfg.add_expr(Expr::Variable("x".into()));
    let zero = cfg.add_expr(Expr::Literal(Literal::Int(0)));
    let cond = cfg.add_expr(Expr::Binary {
        op: BinaryOp::Gt,
        left: x,
        right: zero,
    });
    let one = cfg.add_expr(Expr::Literal(Literal::Int(1)));
    let y1 = cfg.add_expr(Expr::Assign {
        target: "y".into(),
        value: one,
    });
    let two = cfg.add_expr(Expr::Literal(Literal::Int(2)));
    let y2 = cfg.add_expr(Expr::Assign {
        target: "y".into(),
        value: two,
    });
    let y = cfg.add_expr(Expr::Variable("y".into()));
    let z = cfg.add_expr(Expr::Assign {
        target: "z".into(),
        value: y,
    });

    let entry = cfg.add_block(BasicBlock::new());
    let (then_block, else_block);
    if swap_blocks {
        else_block = cfg.add_block(BasicBlock {
            statements: vec![y2],
            ..BasicBlock::new()
        });
        then_block = cfg.add_block(BasicBlock {
            statements: vec![y1],
            ..BasicBlock::new()
        });
    } else {
        then_block = cfg.add_block(BasicBlock {
            statements: vec![y1],
            ..BasicBlock::new()
        });
        else_block = cfg.add_block(BasicBlock {
            statements: vec![y2],
            ..BasicBlock::new()
        });
    }
    let merge = cfg.add_block(BasicBlock {
        statements: vec![z],
        ..BasicBlock::new()
    });

    cfg.block_mut(entry)
        .unwrap()
        .conditional_edges
        .push(ConditionalEdge {
            condition: cond,
            target: then_block,
        });
    cfg.block_mut(entry).unwrap().default_branch = Some(else_block);
    cfg.block_mut(then_block).unwrap().successors.push(merge);
    cfg.block_mut(else_block).unwrap().successors.push(merge);
    cfg.entry = entry;
    Arc::new(cfg)
}

/// `r1 = f(1); r2 = f(2);`
pub fn two_call_sites_cfg() -> Arc<ControlFlowGraph> {
    let mut cfg = ControlFlowGraph::new();
    let one = cfg.add_expr(Expr::Literal(Literal::Int(1)));
    let call1 = cfg.add_expr(Expr::Call {
        function: "f".into(),
        arguments: vec![one],
    });
    let r1 = cfg.add_expr(Expr::Assign {
        target: "r1".into(),
        value: call1,
    });
    let two = cfg.add_expr(Expr::Literal(Literal::Int(2)));
    let call2 = cfg.add_expr(Expr::Call {
        function: "f".into(),
        arguments: vec![two],
    });
    let r2 = cfg.add_expr(Expr::Assign {
        target: "r2".into(),
        value: call2,
    });
    let entry = cfg.add_block(BasicBlock {
        statements: vec![r1, r2],
        ..BasicBlock::new()
    });
    cfg.entry = entry;
    Arc::new(cfg)
}

/// `i = 0; while (i < 3) i = i + 1;`
pub fn loop_cfg() -> Arc<ControlFlowGraph> {
    let mut cfg = ControlFlowGraph::new();
    let zero = cfg.add_expr(Expr::Literal(Literal::Int(0)));
    let init = cfg.add_expr(Expr::Assign {
        target: "i".into(),
        value: zero,
    });
    let i = cfg.add_expr(Expr::Variable("i".into()));
    let three = cfg.add_expr(Expr::Literal(Literal::Int(3)));
    let cond = cfg.add_expr(Expr::Binary {
        op: BinaryOp::Lt,
        left: i,
        right: three,
    });
    let i2 = cfg.add_expr(Expr::Variable("i".into()));
    let one = cfg.add_expr(Expr::Literal(Literal::Int(1)));
    let plus = cfg.add_expr(Expr::Binary {
        op: BinaryOp::Add,
        left: i2,
        right: one,
    });
    let step = cfg.add_expr(Expr::Assign {
        target: "i".into(),
        value: plus,
    });

    let entry = cfg.add_block(BasicBlock {
        statements: vec![init],
        ..BasicBlock::new()
    });
    let header = cfg.add_block(BasicBlock::new());
    let body = cfg.add_block(BasicBlock {
        statements: vec![step],
        ..BasicBlock::new()
    });
    let exit = cfg.add_block(BasicBlock::new());

    cfg.block_mut(entry).unwrap().successors.push(header);
    cfg.block_mut(header)
        .unwrap()
        .conditional_edges
        .push(ConditionalEdge {
            condition: cond,
            target: body,
        });
    cfg.block_mut(header).unwrap().default_branch = Some(exit);
    cfg.block_mut(body).unwrap().successors.push(header);
    cfg.entry = entry;
    Arc::new(cfg)
}
