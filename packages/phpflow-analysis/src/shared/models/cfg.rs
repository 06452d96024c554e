//! Control flow graph input model
//!
//! The engine never parses source text; it consumes this pre-built
//! structure. A [`ControlFlowGraph`] owns its basic blocks and one
//! expression arena addressed by [`ExprId`], so that several conditional
//! edges can refer to the same source expression.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Handle of a basic block within its owning [`ControlFlowGraph`]
pub type BlockId = usize;

/// Handle of an expression within its owning [`ControlFlowGraph`]
pub type ExprId = usize;

/// Literal values appearing in expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
    BitNot,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    NotEq,
    Identical,
    NotIdentical,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
}

/// One node of an expression tree
///
/// Children are referred to by [`ExprId`] into the owning graph's arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Binary {
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    },
    Assign {
        target: String,
        value: ExprId,
    },
    Call {
        function: String,
        arguments: Vec<ExprId>,
    },
    Include {
        target: String,
    },
}

/// Conditional outgoing edge of a basic block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalEdge {
    /// Condition gating the edge
    pub condition: ExprId,
    /// Target block when the condition may hold
    pub target: BlockId,
}

/// Catch handler association of a try block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchTarget {
    /// Exception class name handled by this catch
    pub class_name: String,
    /// Variable the caught exception is bound to
    pub variable: String,
    /// First block of the catch handler
    pub target: BlockId,
}

/// One basic block of the input CFG
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicBlock {
    /// Statements in execution order; each is a root into the expression arena
    pub statements: Vec<ExprId>,
    /// Unconditional successors
    pub successors: Vec<BlockId>,
    /// Conditional outgoing edges
    pub conditional_edges: Vec<ConditionalEdge>,
    /// Fallback branch taken when no conditional edge is assumed
    pub default_branch: Option<BlockId>,
    /// Catch handlers whose scope starts with this block (non-empty means
    /// this is a try block)
    pub catch_targets: Vec<CatchTarget>,
    /// Try blocks whose catch scope ends when this block starts
    pub ending_try_blocks: Vec<BlockId>,
}

impl BasicBlock {
    /// Create an empty basic block
    pub fn new() -> Self {
        Self::default()
    }
}

/// Pre-built control flow graph consumed by the engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    exprs: Vec<Expr>,
    blocks: Vec<BasicBlock>,
    /// Entry block of the graph
    pub entry: BlockId,
    /// Script this graph was built from, when known
    pub file: Option<PathBuf>,
    /// Name of the function or method this graph represents; `None` for a
    /// whole script
    pub function_name: Option<String>,
}

impl ControlFlowGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an expression node, returning its handle
    pub fn add_expr(&mut self, expr: Expr) -> ExprId {
        self.exprs.push(expr);
        self.exprs.len() - 1
    }

    /// Add a basic block, returning its handle
    pub fn add_block(&mut self, block: BasicBlock) -> BlockId {
        self.blocks.push(block);
        self.blocks.len() - 1
    }

    /// Look up an expression; `None` for a dangling handle
    pub fn expr(&self, id: ExprId) -> Option<&Expr> {
        self.exprs.get(id)
    }

    /// Look up a block; `None` for a dangling handle
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id)
    }

    /// Mutable access to a block during construction
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id)
    }

    /// Number of blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}
