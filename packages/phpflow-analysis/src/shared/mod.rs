//! Shared data models used across features

pub mod models;
