pub mod analysis;
pub mod interprocedural;
pub mod memory;
pub mod points_graph;
pub mod scheduler;
