pub mod builder;
pub mod points_block;

pub use builder::GraphBuilder;
pub use points_block::PointsBlock;
