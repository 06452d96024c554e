//! Fixpoint drivers and the ports they are parameterized with

pub mod application;
pub mod domain;
pub mod ports;
