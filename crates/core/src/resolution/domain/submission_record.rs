use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// A sampled frame handed to the resolver, immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmissionRecord {
    /// Monotonically increasing per pipeline run.
    pub id: u64,
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub regions: Vec<Region>,
    pub submitted_at_ms: u64,
    pub capture_wall_clock: SystemTime,
}

impl SubmissionRecord {
    pub fn capture(
        frame: &Frame,
        regions: &[Region],
        submitted_at_ms: u64,
        id: u64,
        jpeg_quality: u8,
    ) -> Result<Self, image::ImageError> {
        Ok(Self {
            id,
            jpeg: frame.encode_jpeg(jpeg_quality)?,
            width: frame.width(),
            height: frame.height(),
            regions: regions.to_vec(),
            submitted_at_ms,
            capture_wall_clock: UNIX_EPOCH + Duration::from_millis(submitted_at_ms),
        })
    }
}
