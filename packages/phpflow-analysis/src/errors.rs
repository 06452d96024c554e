//! Error types for phpflow-analysis
//!
//! Only malformed *input* is reported through [`AnalysisError`]; it is
//! fatal for the run and never retried. Defects inside the engine itself
//! (double initialization, transacting on a frozen snapshot, re-running a
//! finished driver) are contract violations and panic instead, because
//! they can never be a property of the analyzed program.

use thiserror::Error;

/// Main error type for analysis operations
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A malformed control flow graph (dangling block or expression handle)
    #[error("invalid control flow graph: {0}")]
    InvalidCfg(String),
}

impl AnalysisError {
    /// Create an invalid-CFG error
    pub fn invalid_cfg(msg: impl Into<String>) -> Self {
        AnalysisError::InvalidCfg(msg.into())
    }
}

/// Result type alias for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;
