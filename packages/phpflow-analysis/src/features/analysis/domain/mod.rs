pub mod warnings;

pub use warnings::{AnalysisWarning, WarningSeverity};
