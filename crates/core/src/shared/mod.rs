pub mod clock;
pub mod constants;
pub mod errors;
pub mod frame;
pub mod region;
pub mod settings;
pub mod video_metadata;
