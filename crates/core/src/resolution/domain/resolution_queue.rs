use super::resolved_identity::ResolvedBatch;
use super::submission_record::SubmissionRecord;

/// Single-producer/single-consumer mailbox between the live loop and the
/// external resolver.
///
/// The two operations are deliberately asymmetric: `submit` is fire-and-forget
/// (at-most-once, a lost record only costs a missed label), while
/// `take_latest_resolved` is a destructive read of the newest pending batch
/// that also discards every older pending batch.
pub trait ResolutionQueue: Send {
    fn submit(&mut self, record: SubmissionRecord) -> Result<(), Box<dyn std::error::Error>>;

    /// Returns the newest pending batch, removing it and all older ones.
    /// `Ok(None)` when nothing is pending.
    fn take_latest_resolved(
        &mut self,
    ) -> Result<Option<ResolvedBatch>, Box<dyn std::error::Error>>;
}
