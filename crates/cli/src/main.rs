use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;

use facetag_core::association::domain::track_association_engine::AssociationConfig;
use facetag_core::detection::domain::face_detector::FaceDetector;
use facetag_core::detection::infrastructure::model_resolver;
use facetag_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use facetag_core::pipeline::label_faces_use_case::{LabelFacesConfig, LabelFacesUseCase};
use facetag_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use facetag_core::refresh::domain::identity_index::{DisabledIdentityIndex, IdentityIndex};
use facetag_core::refresh::domain::index_refresh_trigger::IndexRefreshTrigger;
use facetag_core::refresh::infrastructure::flag_file_identity_index::FlagFileIdentityIndex;
use facetag_core::render::infrastructure::box_label_annotator::BoxLabelAnnotator;
use facetag_core::resolution::domain::resolution_queue::ResolutionQueue;
use facetag_core::resolution::infrastructure::directory_queue::DirectoryResolutionQueue;
use facetag_core::resolution::infrastructure::threaded_queue::ThreadedResolutionQueue;
use facetag_core::shared::clock::SystemClock;
use facetag_core::shared::constants::{YOLO_MODEL_NAME, YOLO_MODEL_URL};
use facetag_core::shared::settings::OverlaySettings;
use facetag_core::video::domain::video_writer::VideoWriter;
use facetag_core::video::infrastructure::ffmpeg_capture_reader::FfmpegCaptureReader;
use facetag_core::video::infrastructure::ffmpeg_sink_writer::{FfmpegSinkWriter, SinkConfig};
use facetag_core::video::infrastructure::image_sequence_writer::ImageSequenceWriter;

/// `--output-format` value that writes PNG frames into a directory.
const IMAGE_SEQUENCE_FORMAT: &str = "images";

/// Labels faces in a live video stream with identities from an external resolver.
///
/// Every option can also come from a JSON file given with --config; flags on
/// the command line override the file.
#[derive(Parser, Debug)]
#[command(name = "facetag", version)]
struct Cli {
    /// JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera device, index, file or stream URL.
    #[arg(long)]
    source: Option<String>,

    /// Capture backend to try, in order of preference (repeatable).
    #[arg(long = "backend")]
    backends: Vec<String>,

    /// Requested capture width in pixels.
    #[arg(long)]
    capture_width: Option<u32>,

    /// Requested capture height in pixels.
    #[arg(long)]
    capture_height: Option<u32>,

    /// Debug-level logging unless RUST_LOG says otherwise.
    #[arg(long, short)]
    verbose: bool,

    /// Offer every Kth frame to the resolver.
    #[arg(long)]
    sample_interval: Option<usize>,

    /// Minimum confidence for a face to be drawn and labelled (0.0-1.0).
    #[arg(long)]
    detection_score: Option<f64>,

    /// Confidence floor inside the detector (0.0-1.0).
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Maximum centre distance in pixels for a label to carry over.
    #[arg(long)]
    match_distance: Option<f64>,

    /// How long a resolved label stays valid, from capture time.
    #[arg(long)]
    validity_window_ms: Option<u64>,

    /// Frames between checks for newly enrolled identities.
    #[arg(long)]
    refresh_interval: Option<usize>,

    /// Directory shared with the resolver.
    #[arg(long)]
    queue_dir: Option<PathBuf>,

    /// Longest wait for the resolution queue per frame.
    #[arg(long)]
    queue_timeout_ms: Option<u64>,

    /// Submissions buffered ahead of the queue store before dropping.
    #[arg(long)]
    submit_mailbox: Option<usize>,

    /// JPEG quality of submitted frames (1-100).
    #[arg(long)]
    jpeg_quality: Option<u8>,

    /// Flag file whose presence signals a new enrollment.
    #[arg(long)]
    enrollment_flag: Option<PathBuf>,

    /// Command (and arguments) that rebuilds the identity index.
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    rebuild_command: Option<Vec<String>>,

    /// Kill an index rebuild still running after this long.
    #[arg(long)]
    rebuild_timeout_ms: Option<u64>,

    /// Output file, stream URL or device.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Force the output format (e.g. v4l2), or `images` for a PNG directory.
    #[arg(long)]
    output_format: Option<String>,

    #[arg(long)]
    output_width: Option<u32>,

    #[arg(long)]
    output_height: Option<u32>,

    #[arg(long)]
    output_fps: Option<u32>,

    /// TrueType font for labels.
    #[arg(long)]
    label_font: Option<PathBuf>,

    /// Draw the frame rate in the top-left corner.
    #[arg(long)]
    show_fps: bool,

    /// Use this detector model instead of the cached download.
    #[arg(long)]
    model: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    let settings = match load_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };

    let default_filter = if settings.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run(&settings) {
        log::error!("{e}");
        process::exit(1);
    }
}

fn load_settings(cli: &Cli) -> Result<OverlaySettings, Box<dyn std::error::Error>> {
    let base = match &cli.config {
        Some(path) => OverlaySettings::load(path)?,
        None => OverlaySettings::default(),
    };
    let settings = apply_overrides(base, cli);
    settings.validate()?;
    Ok(settings)
}

/// Flags given on the command line win over the settings file.
fn apply_overrides(mut s: OverlaySettings, cli: &Cli) -> OverlaySettings {
    fn set<T: Clone>(target: &mut T, value: &Option<T>) {
        if let Some(v) = value {
            *target = v.clone();
        }
    }

    set(&mut s.source, &cli.source);
    if !cli.backends.is_empty() {
        s.backends = cli.backends.clone();
    }
    if cli.capture_width.is_some() {
        s.capture_width = cli.capture_width;
    }
    if cli.capture_height.is_some() {
        s.capture_height = cli.capture_height;
    }
    s.verbose |= cli.verbose;
    set(&mut s.sample_interval, &cli.sample_interval);
    set(&mut s.detection_score, &cli.detection_score);
    set(&mut s.min_confidence, &cli.min_confidence);
    set(&mut s.match_distance, &cli.match_distance);
    set(&mut s.validity_window_ms, &cli.validity_window_ms);
    set(&mut s.refresh_interval, &cli.refresh_interval);
    set(&mut s.queue_dir, &cli.queue_dir);
    set(&mut s.queue_timeout_ms, &cli.queue_timeout_ms);
    set(&mut s.submit_mailbox, &cli.submit_mailbox);
    set(&mut s.jpeg_quality, &cli.jpeg_quality);
    if cli.enrollment_flag.is_some() {
        s.enrollment_flag = cli.enrollment_flag.clone();
    }
    set(&mut s.rebuild_command, &cli.rebuild_command);
    set(&mut s.rebuild_timeout_ms, &cli.rebuild_timeout_ms);
    set(&mut s.output, &cli.output);
    if cli.output_format.is_some() {
        s.output_format = cli.output_format.clone();
    }
    set(&mut s.output_width, &cli.output_width);
    set(&mut s.output_height, &cli.output_height);
    set(&mut s.output_fps, &cli.output_fps);
    if cli.label_font.is_some() {
        s.label_font = cli.label_font.clone();
    }
    s.show_fps |= cli.show_fps;
    if cli.model.is_some() {
        s.model = cli.model.clone();
    }
    s
}

fn run(settings: &OverlaySettings) -> Result<(), Box<dyn std::error::Error>> {
    let detector = build_detector(settings)?;
    let queue = build_queue(settings)?;
    let refresh = IndexRefreshTrigger::new(build_index(settings)?, settings.refresh_interval)?;
    let annotator =
        BoxLabelAnnotator::with_font_search(settings.label_font.as_deref(), settings.show_fps);
    let reader = FfmpegCaptureReader::new(settings.backends.clone(), settings.capture_size());

    let config = LabelFacesConfig {
        sample_interval: settings.sample_interval,
        jpeg_quality: settings.jpeg_quality,
        association: AssociationConfig {
            detection_score: settings.detection_score,
            match_distance: settings.match_distance,
            validity_window_ms: settings.validity_window_ms,
        },
    };

    let mut use_case = LabelFacesUseCase::new(
        Box::new(reader),
        build_writer(settings),
        detector,
        queue,
        refresh,
        Box::new(annotator),
        Box::new(SystemClock),
        Box::new(StdoutPipelineLogger::default()),
        config,
        None,
    )?;

    let summary = use_case.execute(&settings.source, &settings.output)?;
    log::info!(
        "Stream ended: {} frames, {} submitted ({} dropped), {} batches, {} labels drawn",
        summary.frames,
        summary.submissions,
        summary.dropped_submissions,
        summary.batches,
        summary.labels_drawn
    );
    Ok(())
}

fn build_detector(
    settings: &OverlaySettings,
) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let model_path = model_resolver::resolve(
        YOLO_MODEL_NAME,
        YOLO_MODEL_URL,
        settings.model.as_deref(),
        Some(Box::new(download_progress)),
    )?;
    Ok(Box::new(OnnxYoloDetector::new(
        &model_path,
        settings.min_confidence,
    )?))
}

fn build_queue(
    settings: &OverlaySettings,
) -> Result<Box<dyn ResolutionQueue>, Box<dyn std::error::Error>> {
    let store = DirectoryResolutionQueue::open(&settings.queue_dir)?;
    log::info!("Resolution queue at {}", settings.queue_dir.display());
    Ok(Box::new(ThreadedResolutionQueue::spawn(
        Box::new(store),
        settings.submit_mailbox,
        Duration::from_millis(settings.queue_timeout_ms),
    )?))
}

fn build_index(
    settings: &OverlaySettings,
) -> Result<Box<dyn IdentityIndex>, Box<dyn std::error::Error>> {
    match &settings.enrollment_flag {
        Some(flag) => {
            log::info!("Watching {} for new enrollments", flag.display());
            Ok(Box::new(FlagFileIdentityIndex::new(
                flag,
                settings.rebuild_command.clone(),
                Duration::from_millis(settings.rebuild_timeout_ms),
            )?))
        }
        None => Ok(Box::new(DisabledIdentityIndex)),
    }
}

fn build_writer(settings: &OverlaySettings) -> Box<dyn VideoWriter> {
    let size = (settings.output_width, settings.output_height);
    match settings.output_format.as_deref() {
        Some(IMAGE_SEQUENCE_FORMAT) => Box::new(ImageSequenceWriter::new(Some(size))),
        format => Box::new(FfmpegSinkWriter::new(SinkConfig {
            format: format.map(str::to_string),
            width: size.0,
            height: size.1,
            fps: settings.output_fps,
            pace: true,
        })),
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
