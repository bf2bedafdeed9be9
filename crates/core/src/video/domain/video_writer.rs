use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// The output sink. Sinks own their output geometry and rate; `source`
/// describes the capture side for logging and defaults.
pub trait VideoWriter: Send {
    fn open(
        &mut self,
        target: &Path,
        source: &VideoMetadata,
    ) -> Result<VideoMetadata, Box<dyn std::error::Error>>;

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}
