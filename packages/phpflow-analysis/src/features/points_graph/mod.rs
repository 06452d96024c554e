//! Program point graph: nodes, arena and construction from a CFG

pub mod domain;
pub mod infrastructure;
