//! Input data model of the engine

pub mod cfg;

pub use cfg::{
    BasicBlock, BinaryOp, BlockId, CatchTarget, ConditionalEdge, ControlFlowGraph, Expr, ExprId,
    Literal, UnaryOp,
};
