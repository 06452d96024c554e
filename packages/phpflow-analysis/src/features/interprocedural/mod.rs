//! Interprocedural splicing of call and include branches

pub mod domain;
