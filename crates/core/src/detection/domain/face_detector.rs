use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Black-box face detection capability.
///
/// Returns zero or more regions, each carrying its own confidence. An `Err`
/// means the capability itself is unavailable for this frame; callers
/// continue with an empty region list rather than aborting.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}
