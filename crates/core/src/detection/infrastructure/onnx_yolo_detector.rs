use std::path::Path;

use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

const NMS_IOU_THRESH: f64 = 0.45;

/// Letterbox padding value (YOLO convention).
const PAD_GRAY: f32 = 114.0 / 255.0;

/// YOLO face detector using ONNX Runtime via `ort`.
///
/// Letterbox preprocessing, inference, confidence floor and NMS. Regions are
/// returned in source-frame pixels with their detection confidence; no
/// tracking is done here because identity comes from the resolver.
pub struct OnnxYoloDetector {
    session: ort::session::Session,
    min_confidence: f64,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Loads the model; input size comes from its NCHW input shape when static.
    pub fn new(model_path: &Path, min_confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?.commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { ref shape, .. }
                    if shape.len() >= 4 && shape[2] > 0 =>
                {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::info!("Loaded detector {} (input {input_size}px)", model_path.display());

        Ok(Self {
            session,
            min_confidence,
            input_size,
        })
    }
}

impl FaceDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        let (input_tensor, letterbox) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let mut raw = decode_rows(data, &shape, self.min_confidence, &letterbox)?;
        let kept = nms(&mut raw, NMS_IOU_THRESH);

        Ok(kept
            .iter()
            .map(|d| {
                Region::from_corners(
                    d.x1,
                    d.y1,
                    d.x2,
                    d.y2,
                    d.confidence,
                    frame.width(),
                    frame.height(),
                )
            })
            .filter(Region::has_area)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Mapping between letterboxed model space and source-frame pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn to_frame(self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

/// Resizes a frame into a `target_size` square, aspect preserved, padded gray.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let mut tensor = ndarray::Array4::<f32>::from_elem(
        (1, 3, target_size as usize, target_size as usize),
        PAD_GRAY,
    );

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbour sampling is enough for face-sized objects.
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    )
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
}

/// Parses `[1, features, detections]` or `[1, detections, features]` output,
/// where each row starts `[cx, cy, w, h, conf, ...]` in letterbox space.
fn decode_rows(
    data: &[f32],
    shape: &[usize],
    min_confidence: f64,
    letterbox: &Letterbox,
) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 {
        return Ok(Vec::new());
    }
    if data.len() < num_dets * num_feats {
        return Err("YOLO output shorter than its shape".into());
    }

    let feature = |det: usize, f: usize| -> f64 {
        let idx = if transposed {
            f * num_dets + det
        } else {
            det * num_feats + f
        };
        data[idx] as f64
    };

    let mut dets = Vec::new();
    for i in 0..num_dets {
        let conf = feature(i, 4);
        if conf < min_confidence {
            continue;
        }
        let (cx, cy, w, h) = (feature(i, 0), feature(i, 1), feature(i, 2), feature(i, 3));
        let (x1, y1) = letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);
        dets.push(RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence: conf,
        });
    }
    Ok(dets)
}

/// Greedy NMS: highest confidence first, suppress overlaps above `iou_thresh`.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets.iter() {
        let suppressed = keep.iter().any(|k| {
            bbox_iou(
                &[k.x1, k.y1, k.x2, k.y2],
                &[det.x1, det.y1, det.x2, det.y2],
            ) > iou_thresh
        });
        if !suppressed {
            keep.push(det.clone());
        }
    }
    keep
}

fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn raw(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> RawDetection {
        RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    const IDENTITY: Letterbox = Letterbox {
        scale: 1.0,
        pad_x: 0,
        pad_y: 0,
    };

    #[test]
    fn test_letterbox_wide_frame_pads_vertically() {
        // 200x100 -> 640: scale 3.2, content 640x320, pad_y 160
        let frame = Frame::new(vec![128u8; 200 * 100 * 3], 200, 100, 0);
        let (tensor, lb) = letterbox(&frame, 640);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_relative_eq!(lb.scale, 3.2, epsilon = 1e-9);
        assert_eq!((lb.pad_x, lb.pad_y), (0, 160));
    }

    #[test]
    fn test_letterbox_values_normalized_and_padded() {
        let frame = Frame::new(vec![255u8; 100 * 50 * 3], 100, 50, 0);
        let (tensor, lb) = letterbox(&frame, 640);

        let y = lb.pad_y as usize + 1;
        assert!((tensor[[0, 0, y, 1]] - 1.0).abs() < 0.01);
        assert!((tensor[[0, 0, 0, 0]] - PAD_GRAY).abs() < 0.01);
    }

    #[test]
    fn test_letterbox_maps_back_to_frame() {
        let lb = Letterbox {
            scale: 2.0,
            pad_x: 0,
            pad_y: 40,
        };
        assert_eq!(lb.to_frame(100.0, 140.0), (50.0, 50.0));
    }

    #[test]
    fn test_decode_rows_row_major() {
        // [1, 6 detections, 5 features]; rows after the second are all zero
        let mut data = vec![0.0f32; 6 * 5];
        data[..10].copy_from_slice(&[50.0, 60.0, 20.0, 40.0, 0.9, 10.0, 10.0, 4.0, 4.0, 0.1]);
        let dets = decode_rows(&data, &[1, 6, 5], 0.5, &IDENTITY).unwrap();

        assert_eq!(dets.len(), 1);
        assert_relative_eq!(dets[0].x1, 40.0);
        assert_relative_eq!(dets[0].y1, 40.0);
        assert_relative_eq!(dets[0].x2, 60.0);
        assert_relative_eq!(dets[0].y2, 80.0);
        assert_relative_eq!(dets[0].confidence, 0.9, epsilon = 1e-6);
    }

    #[test]
    fn test_decode_rows_transposed() {
        // [1, 5 features, 6 detections]: only detection 2 is confident
        let mut data = vec![0.0f32; 5 * 6];
        let set = |data: &mut Vec<f32>, f: usize, v: f32| data[f * 6 + 2] = v;
        set(&mut data, 0, 100.0);
        set(&mut data, 1, 100.0);
        set(&mut data, 2, 10.0);
        set(&mut data, 3, 10.0);
        set(&mut data, 4, 0.8);

        let dets = decode_rows(&data, &[1, 5, 6], 0.5, &IDENTITY).unwrap();
        assert_eq!(dets.len(), 1);
        assert_relative_eq!(dets[0].x1, 95.0);
        assert_relative_eq!(dets[0].y2, 105.0);
    }

    #[test]
    fn test_decode_rows_rejects_unexpected_rank() {
        assert!(decode_rows(&[0.0; 5], &[5], 0.5, &IDENTITY).is_err());
    }

    #[test]
    fn test_decode_rows_rejects_short_buffer() {
        assert!(decode_rows(&[0.0; 4], &[1, 6, 5], 0.5, &IDENTITY).is_err());
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let mut dets = vec![
            raw(0.0, 0.0, 100.0, 100.0, 0.9),
            raw(5.0, 5.0, 105.0, 105.0, 0.8),
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 1);
        assert_relative_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn test_nms_keeps_non_overlapping() {
        let mut dets = vec![
            raw(0.0, 0.0, 50.0, 50.0, 0.9),
            raw(200.0, 200.0, 250.0, 250.0, 0.8),
        ];
        assert_eq!(nms(&mut dets, 0.3).len(), 2);
    }

    #[test]
    fn test_nms_higher_confidence_wins_regardless_of_order() {
        let mut dets = vec![
            raw(0.0, 0.0, 100.0, 100.0, 0.5),
            raw(2.0, 2.0, 102.0, 102.0, 0.9),
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 1);
        assert_relative_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn test_nms_empty_input() {
        assert!(nms(&mut [], 0.3).is_empty());
    }

    #[test]
    fn test_bbox_iou_bounds() {
        let b = [0.0, 0.0, 10.0, 10.0];
        assert_relative_eq!(bbox_iou(&b, &b), 1.0);
        assert_eq!(bbox_iou(&b, &[20.0, 20.0, 30.0, 30.0]), 0.0);
    }
}
