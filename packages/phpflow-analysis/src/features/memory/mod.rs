//! Abstract memory: snapshot port and transactional flow sets

pub mod domain;
pub mod ports;
