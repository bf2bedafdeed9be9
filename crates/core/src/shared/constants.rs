pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// Every Kth frame is offered to the resolver.
pub const DEFAULT_SAMPLE_INTERVAL: usize = 7;

/// Minimum detector confidence for a region to be drawn and labelled.
pub const DEFAULT_DETECTION_SCORE: f64 = 0.4;

/// Confidence floor applied inside the detector itself.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;

/// Maximum centre-to-centre distance (pixels) for a label to carry over.
pub const DEFAULT_MATCH_DISTANCE: f64 = 80.0;

/// How long a resolved identity stays eligible, measured from its source timestamp.
pub const DEFAULT_VALIDITY_WINDOW_MS: u64 = 5_000;

/// Frames between checks for newly enrolled identities.
pub const DEFAULT_REFRESH_INTERVAL: usize = 75;

/// An index rebuild still running after this long is killed.
pub const DEFAULT_REBUILD_TIMEOUT_MS: u64 = 300_000;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

pub const DEFAULT_OUTPUT_WIDTH: u32 = 990;
pub const DEFAULT_OUTPUT_HEIGHT: u32 = 540;
pub const DEFAULT_OUTPUT_FPS: u32 = 30;

pub const DEFAULT_QUEUE_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_SUBMIT_MAILBOX: usize = 4;

/// Fonts probed for label text when none is configured.
pub const DEFAULT_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];
