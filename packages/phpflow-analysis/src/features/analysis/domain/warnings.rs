//! Analysis warnings
//!
//! Irregularities in the analyzed program (undefined variables, suspicious
//! casts, unreachable handlers) are reported as warning values and never
//! abort the run.

use serde::{Deserialize, Serialize};

use crate::features::points_graph::domain::PointId;
use crate::shared::models::ExprId;

/// Severity of a reported irregularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningSeverity {
    Notice,
    Warning,
    Error,
}

/// One irregularity found while flowing through a program point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWarning {
    /// Program point the warning was raised at
    pub point: PointId,
    /// Expression under evaluation when the warning was raised, if any
    pub expr: Option<ExprId>,
    pub severity: WarningSeverity,
    pub message: String,
}

impl AnalysisWarning {
    pub fn new(point: PointId, severity: WarningSeverity, message: impl Into<String>) -> Self {
        Self {
            point,
            expr: None,
            severity,
            message: message.into(),
        }
    }
}
