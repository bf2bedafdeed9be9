use std::collections::HashMap;
use std::time::Instant;

/// Observer for the per-frame loop: progress, stage timings, metrics.
///
/// Keeps the loop independent of where its telemetry goes.
pub trait PipelineLogger: Send {
    /// `total` is 0 for live sources of unknown length.
    fn progress(&mut self, current: usize, total: usize);

    /// How long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// A point-in-time value such as region count or pool size.
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// End-of-run report. Default: no-op.
    fn summary(&self) {}
}

/// Discards everything. Used in tests.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Aggregates timings and metrics and reports through `log`.
///
/// Progress lines are throttled to one every `throttle_frames` frames.
pub struct StdoutPipelineLogger {
    throttle_frames: usize,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
    frames_seen: usize,
    messages: Vec<String>,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            frames_seen: 0,
            messages: Vec::new(),
        }
    }

    /// Formatted report, `None` when nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let frames = self.frames_seen;
        let mut lines = vec![format!(
            "Pipeline summary ({frames} frames, {:.1}s total):",
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = mean(durations);
            let pct = if elapsed_ms > 0.0 {
                total_ms / elapsed_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "  {stage:10}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms  ({pct:4.1}%)"
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            let values = &self.metrics[name];
            let max = values.iter().copied().fold(0.0_f64, f64::max);
            lines.push(format!("  {name}: avg {:.1}  max {max:.0}", mean(values)));
        }

        if frames > 0 && elapsed_ms > 0.0 {
            let fps = frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(300)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.frames_seen = current;
        if total > 0 {
            if current % self.throttle_frames == 0 || current == total {
                let pct = current as f64 / total as f64 * 100.0;
                log::info!("Processing: {current}/{total} frames ({pct:.1}%)");
            }
        } else if current % self.throttle_frames == 0 {
            let secs = self.start_time.elapsed().as_secs_f64();
            let fps = if secs > 0.0 { current as f64 / secs } else { 0.0 };
            log::info!("Live: {current} frames ({fps:.1} fps)");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        self.messages.push(message.to_string());
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_accepts_everything() {
        let mut logger = NullPipelineLogger;
        logger.progress(1, 0);
        logger.timing("detect", 5.0);
        logger.metric("pool_size", 3.0);
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_timings_are_recorded_per_stage() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("render", 5.0);

        assert_eq!(logger.timings_for("detect").unwrap(), &[20.0, 30.0]);
        assert_eq!(logger.timings_for("render").unwrap(), &[5.0]);
        assert!(logger.timings_for("output").is_none());
    }

    #[test]
    fn test_metrics_average() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.metric("regions", 3.0);
        logger.metric("regions", 4.0);
        assert_relative_eq!(mean(logger.metrics_for("regions").unwrap()), 3.5);
    }

    #[test]
    fn test_summary_lists_stages_metrics_and_throughput() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.progress(12, 0);
        logger.timing("associate", 0.2);
        logger.timing("detect", 20.0);
        logger.metric("pool_size", 2.0);
        logger.metric("pool_size", 6.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("12 frames"));
        assert!(summary.contains("associate"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("pool_size: avg 4.0  max 6"));
        assert!(summary.contains("fps"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(StdoutPipelineLogger::new(10).summary_string().is_none());
    }

    #[test]
    fn test_progress_tracks_live_frame_count() {
        let mut logger = StdoutPipelineLogger::new(10);
        for i in 1..=25 {
            logger.progress(i, 0);
        }
        assert_eq!(logger.frames_seen, 25);
    }

    #[test]
    fn test_info_stores_messages() {
        let mut logger = StdoutPipelineLogger::default();
        logger.info("capture opened");
        assert_eq!(logger.messages, vec!["capture opened".to_string()]);
    }
}
