pub mod ffmpeg_capture_reader;
pub mod ffmpeg_sink_writer;
pub mod image_sequence_writer;
