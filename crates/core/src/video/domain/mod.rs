pub mod frame_pacer;
pub mod video_reader;
pub mod video_writer;
