use thiserror::Error;

/// Failure taxonomy of the per-frame loop.
///
/// Only `AcquisitionFailure` and `OutputFailure` end the loop; every other
/// variant is logged and the frame continues in a degraded form.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("capture source unavailable: {0}")]
    AcquisitionFailure(String),
    #[error("face detection unavailable: {0}")]
    DetectionUnavailable(String),
    #[error("frame submission failed: {0}")]
    SubmissionFailure(String),
    #[error("reading resolved identities failed: {0}")]
    ResolutionReadFailure(String),
    #[error("identity index refresh failed: {0}")]
    IndexRefreshFailure(String),
    #[error("output sink failed: {0}")]
    OutputFailure(String),
}

impl PipelineError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::AcquisitionFailure(_) | PipelineError::OutputFailure(_)
        )
    }
}
