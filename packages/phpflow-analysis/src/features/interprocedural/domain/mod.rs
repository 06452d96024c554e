pub mod extension;

pub use extension::{add_branch, remove_branch, Branch, BranchKey, FlowExtension, SpliceKind};
