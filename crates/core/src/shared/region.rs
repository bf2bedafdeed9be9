use serde::{Deserialize, Serialize};

/// A detected face rectangle in pixel coordinates plus the detector's
/// confidence in `[0, 1]`.
///
/// Produced fresh every frame and never mutated afterwards. Coordinates are
/// trusted as-is: nothing downstream re-validates them against the frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    #[serde(default)]
    pub confidence: f64,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32, confidence: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Euclidean distance between the two rectangle centres, in pixels.
    pub fn center_distance(&self, other: &Region) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Builds a region from float corner coordinates, clamped to the frame.
    pub fn from_corners(
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        confidence: f64,
        frame_w: u32,
        frame_h: u32,
    ) -> Self {
        let fw = frame_w as f64;
        let fh = frame_h as f64;
        let cx1 = x1.clamp(0.0, fw);
        let cy1 = y1.clamp(0.0, fh);
        let cx2 = x2.clamp(0.0, fw);
        let cy2 = y2.clamp(0.0, fh);
        Self {
            x: cx1.round() as i32,
            y: cy1.round() as i32,
            width: (cx2 - cx1).max(0.0).round() as i32,
            height: (cy2 - cy1).max(0.0).round() as i32,
            confidence,
        }
    }
}
