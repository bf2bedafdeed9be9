use crate::shared::errors::PipelineError;

use super::identity_index::{IdentityIndex, RebuildProgress};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    NotDue,
    UpToDate,
    RebuildStarted,
    RebuildRunning,
    Rebuilt,
}

/// Polls the identity index every `interval` frames, first on frame one.
///
/// A rebuild in progress is polled on every frame so its completion is seen
/// promptly; no new enrollment check happens until it has finished.
pub struct IndexRefreshTrigger {
    index: Box<dyn IdentityIndex>,
    interval: usize,
    frames_seen: usize,
}

impl IndexRefreshTrigger {
    pub fn new(index: Box<dyn IdentityIndex>, interval: usize) -> Result<Self, &'static str> {
        if interval == 0 {
            return Err("refresh interval must be >= 1");
        }
        Ok(Self {
            index,
            interval,
            frames_seen: 0,
        })
    }

    pub fn on_frame(&mut self) -> Result<RefreshOutcome, PipelineError> {
        let due = self.frames_seen % self.interval == 0;
        self.frames_seen += 1;

        match self.index.poll_rebuild().map_err(refresh_failure)? {
            RebuildProgress::Completed => return Ok(RefreshOutcome::Rebuilt),
            RebuildProgress::Running => return Ok(RefreshOutcome::RebuildRunning),
            RebuildProgress::Idle => {}
        }
        if !due {
            return Ok(RefreshOutcome::NotDue);
        }

        let enrolled = self.index.has_new_enrollment().map_err(refresh_failure)?;
        if !enrolled {
            return Ok(RefreshOutcome::UpToDate);
        }
        log::info!("New enrollment detected, rebuilding identity index");
        self.index.start_rebuild().map_err(refresh_failure)?;
        Ok(RefreshOutcome::RebuildStarted)
    }
}

fn refresh_failure(e: Box<dyn std::error::Error>) -> PipelineError {
    PipelineError::IndexRefreshFailure(e.to_string())
}
