pub mod worklist;

pub use worklist::WorkList;
