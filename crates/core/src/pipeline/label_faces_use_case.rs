use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::association::domain::track_association_engine::{
    AssociationConfig, TrackAssociationEngine,
};
use crate::detection::domain::face_detector::FaceDetector;
use crate::refresh::domain::index_refresh_trigger::{IndexRefreshTrigger, RefreshOutcome};
use crate::render::domain::frame_annotator::FrameAnnotator;
use crate::resolution::domain::resolution_queue::ResolutionQueue;
use crate::resolution::domain::resolved_identity::ResolvedBatch;
use crate::resolution::domain::submission_gate::SubmissionGate;
use crate::resolution::domain::submission_record::SubmissionRecord;
use crate::shared::clock::Clock;
use crate::shared::errors::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::region::Region;
use crate::video::domain::video_reader::VideoReader;
use crate::video::domain::video_writer::VideoWriter;

use super::pipeline_logger::PipelineLogger;

#[derive(Debug, Clone, PartialEq)]
pub struct LabelFacesConfig {
    pub sample_interval: usize,
    pub jpeg_quality: u8,
    pub association: AssociationConfig,
}

/// Counters reported when a run ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: usize,
    pub submissions: usize,
    pub dropped_submissions: usize,
    pub batches: usize,
    pub labels_drawn: usize,
    pub index_rebuilds: usize,
}

/// The live labelling loop.
///
/// One thread, one frame at a time: refresh check, detect, maybe submit,
/// take the newest resolution, associate, annotate, output. The identity
/// pool is owned here and never shared. Only capture and output failures
/// end the run; everything else degrades to unlabelled boxes.
pub struct LabelFacesUseCase {
    reader: Box<dyn VideoReader>,
    writer: Box<dyn VideoWriter>,
    stages: FrameStages,
    cancelled: Arc<AtomicBool>,
}

/// Everything the per-frame step touches, kept apart from the reader so the
/// frame iterator can borrow the reader while frames are processed.
struct FrameStages {
    detector: Box<dyn FaceDetector>,
    queue: Box<dyn ResolutionQueue>,
    refresh: IndexRefreshTrigger,
    annotator: Box<dyn FrameAnnotator>,
    clock: Box<dyn Clock>,
    logger: Box<dyn PipelineLogger>,
    gate: SubmissionGate,
    engine: TrackAssociationEngine,
    jpeg_quality: u8,
    next_submission_id: u64,
    summary: RunSummary,
}

impl LabelFacesUseCase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reader: Box<dyn VideoReader>,
        writer: Box<dyn VideoWriter>,
        detector: Box<dyn FaceDetector>,
        queue: Box<dyn ResolutionQueue>,
        refresh: IndexRefreshTrigger,
        annotator: Box<dyn FrameAnnotator>,
        clock: Box<dyn Clock>,
        logger: Box<dyn PipelineLogger>,
        config: LabelFacesConfig,
        cancelled: Option<Arc<AtomicBool>>,
    ) -> Result<Self, PipelineError> {
        let gate = SubmissionGate::new(config.sample_interval)
            .map_err(|e| PipelineError::SubmissionFailure(e.to_string()))?;
        Ok(Self {
            reader,
            writer,
            stages: FrameStages {
                detector,
                queue,
                refresh,
                annotator,
                clock,
                logger,
                gate,
                engine: TrackAssociationEngine::new(config.association),
                jpeg_quality: config.jpeg_quality,
                next_submission_id: 0,
                summary: RunSummary::default(),
            },
            cancelled: cancelled.unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
        })
    }

    /// Runs until end of stream, cancellation, or a fatal failure.
    pub fn execute(&mut self, source: &str, target: &Path) -> Result<RunSummary, PipelineError> {
        let metadata = self
            .reader
            .open(source)
            .map_err(|e| PipelineError::AcquisitionFailure(e.to_string()))?;
        self.stages.logger.info(&format!(
            "Capturing {}x{} @ {:.1} fps from {}",
            metadata.width, metadata.height, metadata.fps, metadata.source
        ));

        if let Err(e) = self.writer.open(target, &metadata) {
            self.reader.close();
            return Err(PipelineError::OutputFailure(e.to_string()));
        }

        let total = metadata.total_frames;
        let mut outcome = Ok(());
        for frame_result in self.reader.frames() {
            if self.cancelled.load(Ordering::Relaxed) {
                log::info!("Stop requested");
                break;
            }
            let frame = match frame_result {
                Ok(frame) => frame,
                Err(e) => {
                    outcome = Err(PipelineError::AcquisitionFailure(e.to_string()));
                    break;
                }
            };
            let step = Instant::now();
            if let Err(e) = self.stages.process_frame(frame, &mut *self.writer) {
                outcome = Err(e);
                break;
            }
            self.stages.logger.timing("frame", elapsed_ms(step));
            self.stages
                .logger
                .progress(self.stages.summary.frames, total);
        }

        self.reader.close();
        let closed = self
            .writer
            .close()
            .map_err(|e| PipelineError::OutputFailure(e.to_string()));
        self.stages.logger.summary();

        outcome?;
        closed?;
        Ok(self.stages.summary.clone())
    }

    pub fn summary(&self) -> &RunSummary {
        &self.stages.summary
    }
}

impl FrameStages {
    fn process_frame(
        &mut self,
        mut frame: Frame,
        writer: &mut dyn VideoWriter,
    ) -> Result<(), PipelineError> {
        self.refresh_index();

        let t = Instant::now();
        let regions = self.detect(&frame);
        self.logger.timing("detect", elapsed_ms(t));
        self.logger.metric("regions", regions.len() as f64);

        let now = self.clock.now_ms();

        let t = Instant::now();
        if self.gate.should_submit(&regions) {
            self.submit(&frame, &regions, now);
        }
        self.logger.timing("submit", elapsed_ms(t));

        let t = Instant::now();
        let batch = self.take_latest();
        self.logger.timing("resolve", elapsed_ms(t));

        let t = Instant::now();
        let labelled = self.engine.associate(now, batch.as_ref(), &regions);
        self.logger.timing("associate", elapsed_ms(t));
        self.logger
            .metric("pool_size", self.engine.pool().len() as f64);
        let drawn = labelled.iter().filter(|l| l.label.is_some()).count();
        self.logger.metric("labelled", drawn as f64);
        self.summary.labels_drawn += drawn;

        let t = Instant::now();
        self.annotator.annotate(&mut frame, &labelled);
        self.logger.timing("render", elapsed_ms(t));

        let t = Instant::now();
        writer
            .write(&frame)
            .map_err(|e| PipelineError::OutputFailure(e.to_string()))?;
        self.logger.timing("output", elapsed_ms(t));

        self.summary.frames += 1;
        Ok(())
    }

    fn refresh_index(&mut self) {
        match self.refresh.on_frame() {
            Ok(RefreshOutcome::RebuildStarted) => {
                self.logger.info("Identity index rebuild started");
            }
            Ok(RefreshOutcome::Rebuilt) => {
                self.summary.index_rebuilds += 1;
                self.logger.info("Identity index rebuilt");
            }
            Ok(_) => {}
            Err(e) => log::warn!("{e}"),
        }
    }

    fn detect(&mut self, frame: &Frame) -> Vec<Region> {
        match self.detector.detect(frame) {
            Ok(regions) => regions,
            Err(e) => {
                log::warn!("{}", PipelineError::DetectionUnavailable(e.to_string()));
                Vec::new()
            }
        }
    }

    fn submit(&mut self, frame: &Frame, regions: &[Region], now: u64) {
        let id = self.next_submission_id;
        self.next_submission_id += 1;

        let result = SubmissionRecord::capture(frame, regions, now, id, self.jpeg_quality)
            .map_err(|e| e.to_string())
            .and_then(|record| self.queue.submit(record).map_err(|e| e.to_string()));
        match result {
            Ok(()) => {
                self.summary.submissions += 1;
                log::debug!(
                    "Submitted frame {} as #{id} with {} regions",
                    frame.index(),
                    regions.len()
                );
            }
            Err(e) => {
                self.summary.dropped_submissions += 1;
                log::warn!("{}", PipelineError::SubmissionFailure(e));
            }
        }
    }

    fn take_latest(&mut self) -> Option<ResolvedBatch> {
        match self.queue.take_latest_resolved() {
            Ok(Some(batch)) => {
                self.summary.batches += 1;
                log::debug!(
                    "Resolved batch {} with {} identities",
                    batch.id,
                    batch.identities.len()
                );
                Some(batch)
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("{}", PipelineError::ResolutionReadFailure(e.to_string()));
                None
            }
        }
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
