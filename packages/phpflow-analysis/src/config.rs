//! Per-run analysis configuration
//!
//! Configuration is an explicit value threaded from the driver into every
//! component that needs it; there are no process-wide lazily initialized
//! defaults.

/// Configuration for one analysis run
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Number of commits on a single flow set after which commits switch to
    /// widen-then-commit. Widening starts once the per-set commit counter is
    /// strictly greater than this limit.
    pub widening_limit: u32,

    /// Safety limit on the number of node visits in one fixpoint run.
    /// The proper termination mechanism is a finite-height or widened
    /// domain; this limit only guards against runaway domains.
    pub max_visits: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            widening_limit: u32::MAX,
            max_visits: 1_000_000,
        }
    }
}

impl AnalysisConfig {
    /// Create a configuration with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the widening limit
    pub fn with_widening_limit(mut self, limit: u32) -> Self {
        self.widening_limit = limit;
        self
    }

    /// Set the visit safety limit
    pub fn with_max_visits(mut self, max_visits: usize) -> Self {
        self.max_visits = max_visits;
        self
    }
}
