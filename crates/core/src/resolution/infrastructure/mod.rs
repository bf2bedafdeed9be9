pub mod channel_queue;
pub mod directory_queue;
pub mod threaded_queue;
