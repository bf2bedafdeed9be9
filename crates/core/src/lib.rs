pub mod association;
pub mod detection;
pub mod pipeline;
pub mod refresh;
pub mod render;
pub mod resolution;
pub mod shared;
pub mod video;
