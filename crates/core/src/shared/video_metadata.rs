/// Properties of an opened capture source or an output sink.
///
/// Live sources usually report `total_frames == 0` (unknown length).
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub codec: String,
    pub source: String,
}

impl VideoMetadata {
    /// Same source description, with dimensions and rate replaced.
    pub fn with_geometry(&self, width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            ..self.clone()
        }
    }

    pub fn is_live(&self) -> bool {
        self.total_frames == 0
    }
}
