use std::path::Path;
use std::time::Instant;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::association::domain::tracked_identity::LabeledRegion;
use crate::render::domain::frame_annotator::FrameAnnotator;
use crate::shared::constants::DEFAULT_FONT_CANDIDATES;
use crate::shared::frame::Frame;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: i32 = 3;
const LABEL_SCALE: f32 = 28.0;
const LABEL_GAP: i32 = 4;
const FPS_SCALE: f32 = 36.0;
const FPS_ORIGIN: (i32, i32) = (20, 30);

/// Green boxes with the matched label above them, plus an optional FPS
/// counter in the top-left corner.
pub struct BoxLabelAnnotator {
    font: Option<FontVec>,
    show_fps: bool,
    last_frame: Option<Instant>,
}

impl BoxLabelAnnotator {
    pub fn new(font: Option<FontVec>, show_fps: bool) -> Self {
        Self {
            font,
            show_fps,
            last_frame: None,
        }
    }

    /// Loads `font_path` if given, else the first system font that parses.
    /// Without a font boxes are still drawn but text is skipped.
    pub fn with_font_search(font_path: Option<&Path>, show_fps: bool) -> Self {
        let font = match font_path {
            Some(path) => load_font(path),
            None => DEFAULT_FONT_CANDIDATES
                .iter()
                .find_map(|p| load_font(Path::new(p))),
        };
        if font.is_none() {
            log::warn!("No usable label font found; labels will not be drawn");
        }
        Self::new(font, show_fps)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn tick_fps(&mut self) -> Option<f64> {
        let now = Instant::now();
        let fps = self.last_frame.map(|prev| {
            let secs = now.duration_since(prev).as_secs_f64();
            if secs > 0.0 {
                1.0 / secs
            } else {
                0.0
            }
        });
        self.last_frame = Some(now);
        fps
    }
}

fn load_font(path: &Path) -> Option<FontVec> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            log::debug!("Font {} unavailable: {e}", path.display());
            return None;
        }
    };
    match FontVec::try_from_vec(bytes) {
        Ok(font) => {
            log::debug!("Using label font {}", path.display());
            Some(font)
        }
        Err(e) => {
            log::warn!("Font {} is not a usable TrueType font: {e}", path.display());
            None
        }
    }
}

impl FrameAnnotator for BoxLabelAnnotator {
    fn annotate(&mut self, frame: &mut Frame, labelled: &[LabeledRegion]) {
        let fps = if self.show_fps { self.tick_fps() } else { None };
        let font = self.font.as_ref();

        frame.edit_image(|img| {
            for item in labelled {
                draw_box(img, item);
                if let (Some(font), Some(label)) = (font, item.label.as_deref()) {
                    let y = (item.region.y - LABEL_SCALE as i32 - LABEL_GAP).max(0);
                    draw_text_mut(
                        img,
                        BOX_COLOR,
                        item.region.x,
                        y,
                        PxScale::from(LABEL_SCALE),
                        font,
                        label,
                    );
                }
            }
            if let (Some(font), Some(fps)) = (font, fps) {
                draw_text_mut(
                    img,
                    BOX_COLOR,
                    FPS_ORIGIN.0,
                    FPS_ORIGIN.1,
                    PxScale::from(FPS_SCALE),
                    font,
                    &format!("FPS: {}", fps as u32),
                );
            }
        });
    }
}

fn draw_box(img: &mut RgbImage, item: &LabeledRegion) {
    let r = &item.region;
    for inset in 0..BOX_THICKNESS {
        let w = r.width - 2 * inset;
        let h = r.height - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(r.x + inset, r.y + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(img, rect, BOX_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::region::Region;

    fn black(width: u32, height: u32) -> Frame {
        Frame::new(vec![0u8; (width * height * 3) as usize], width, height, 0)
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * frame.width() + x) * 3) as usize;
        [frame.data()[i], frame.data()[i + 1], frame.data()[i + 2]]
    }

    fn labelled(x: i32, y: i32, w: i32, h: i32, label: Option<&str>) -> LabeledRegion {
        LabeledRegion {
            region: Region::new(x, y, w, h, 0.9),
            label: label.map(str::to_string),
        }
    }

    #[test]
    fn test_draws_three_pixel_green_border() {
        let mut frame = black(100, 100);
        let mut annotator = BoxLabelAnnotator::new(None, false);
        annotator.annotate(&mut frame, &[labelled(20, 20, 40, 40, None)]);

        for inset in 0..3 {
            assert_eq!(pixel(&frame, 20 + inset, 40), [0, 255, 0]);
        }
        assert_eq!(pixel(&frame, 23, 40), [0, 0, 0]);
        assert_eq!(pixel(&frame, 40, 40), [0, 0, 0], "interior untouched");
        assert_eq!(pixel(&frame, 10, 10), [0, 0, 0], "outside untouched");
    }

    #[test]
    fn test_no_regions_leaves_frame_unchanged() {
        let mut frame = black(32, 32);
        let mut annotator = BoxLabelAnnotator::new(None, true);
        annotator.annotate(&mut frame, &[]);
        assert!(frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_box_partly_outside_frame_is_clipped() {
        let mut frame = black(50, 50);
        let mut annotator = BoxLabelAnnotator::new(None, false);
        annotator.annotate(&mut frame, &[labelled(30, 30, 40, 40, Some("edge"))]);
        assert_eq!(pixel(&frame, 30, 45), [0, 255, 0]);
    }

    #[test]
    fn test_tiny_region_does_not_panic() {
        let mut frame = black(20, 20);
        let mut annotator = BoxLabelAnnotator::new(None, false);
        annotator.annotate(&mut frame, &[labelled(5, 5, 1, 1, None), labelled(8, 8, 0, 4, None)]);
        assert_eq!(pixel(&frame, 5, 5), [0, 255, 0]);
    }

    #[test]
    fn test_missing_font_path_falls_back_to_boxes_only() {
        let annotator =
            BoxLabelAnnotator::with_font_search(Some(Path::new("/nonexistent/font.ttf")), false);
        assert!(!annotator.has_font());
    }

    #[test]
    fn test_garbage_font_file_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(load_font(&path).is_none());
    }

    #[test]
    fn test_label_drawn_above_box_when_font_available() {
        let Some(font) = DEFAULT_FONT_CANDIDATES
            .iter()
            .find_map(|p| load_font(Path::new(p)))
        else {
            return;
        };
        let mut frame = black(200, 120);
        let mut annotator = BoxLabelAnnotator::new(Some(font), false);
        annotator.annotate(&mut frame, &[labelled(40, 60, 60, 40, Some("WWW"))]);

        let above_box = (0..60u32)
            .flat_map(|y| (40..120u32).map(move |x| (x, y)))
            .any(|(x, y)| pixel(&frame, x, y)[1] > 0);
        assert!(above_box);
    }
}
