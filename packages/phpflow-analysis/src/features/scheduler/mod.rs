//! Worklist scheduling of the fixpoint iteration

pub mod domain;
