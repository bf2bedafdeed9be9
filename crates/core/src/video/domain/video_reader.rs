use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// A capture source: camera device, file or network stream.
pub trait VideoReader: Send {
    /// Opens `source` and reports what it delivers.
    fn open(&mut self, source: &str) -> Result<VideoMetadata, Box<dyn std::error::Error>>;

    /// Frames in capture order. The iterator ends at end of stream.
    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_>;

    fn close(&mut self);
}
