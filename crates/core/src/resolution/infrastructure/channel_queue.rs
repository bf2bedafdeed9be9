use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use thiserror::Error;

use crate::resolution::domain::resolution_queue::ResolutionQueue;
use crate::resolution::domain::resolved_identity::ResolvedBatch;
use crate::resolution::domain::submission_record::SubmissionRecord;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelQueueError {
    #[error("submission mailbox full, record {0} dropped")]
    Full(u64),
    #[error("resolver endpoint disconnected")]
    Disconnected,
}

/// Builds an in-process queue and the endpoint an in-process resolver uses.
///
/// Submissions travel through a channel bounded to `capacity`; results
/// travel through an unbounded channel that the pipeline drains every take.
pub fn channel_resolution_queue(capacity: usize) -> (ChannelResolutionQueue, ResolverEndpoint) {
    let (submission_tx, submission_rx) = crossbeam_channel::bounded(capacity.max(1));
    let (result_tx, result_rx) = crossbeam_channel::unbounded();
    (
        ChannelResolutionQueue {
            submissions: submission_tx,
            results: result_rx,
        },
        ResolverEndpoint {
            submissions: submission_rx,
            results: result_tx,
        },
    )
}

pub struct ChannelResolutionQueue {
    submissions: Sender<SubmissionRecord>,
    results: Receiver<ResolvedBatch>,
}

impl ResolutionQueue for ChannelResolutionQueue {
    fn submit(&mut self, record: SubmissionRecord) -> Result<(), Box<dyn std::error::Error>> {
        match self.submissions.try_send(record) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(record)) => Err(ChannelQueueError::Full(record.id).into()),
            Err(TrySendError::Disconnected(_)) => Err(ChannelQueueError::Disconnected.into()),
        }
    }

    fn take_latest_resolved(
        &mut self,
    ) -> Result<Option<ResolvedBatch>, Box<dyn std::error::Error>> {
        let pending: Vec<ResolvedBatch> = self.results.try_iter().collect();
        if pending.len() > 1 {
            log::debug!("Discarding {} stale resolved batches", pending.len() - 1);
        }
        Ok(pending.into_iter().max_by_key(|b| b.resolved_at_ms))
    }
}

/// Resolver side of a [`ChannelResolutionQueue`].
pub struct ResolverEndpoint {
    submissions: Receiver<SubmissionRecord>,
    results: Sender<ResolvedBatch>,
}

impl ResolverEndpoint {
    /// Waits up to `timeout` for the next submission. `None` on timeout or
    /// once the pipeline side is gone.
    pub fn next_submission(&self, timeout: Duration) -> Option<SubmissionRecord> {
        match self.submissions.recv_timeout(timeout) {
            Ok(record) => Some(record),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Blocking iterator over submissions, ends when the pipeline side drops.
    pub fn submissions(&self) -> impl Iterator<Item = SubmissionRecord> + '_ {
        self.submissions.iter()
    }

    pub fn publish(&self, batch: ResolvedBatch) -> Result<(), ChannelQueueError> {
        self.results
            .send(batch)
            .map_err(|_| ChannelQueueError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::domain::resolved_identity::ResolvedIdentity;
    use crate::shared::region::Region;
    use std::time::UNIX_EPOCH;

    fn record(id: u64) -> SubmissionRecord {
        SubmissionRecord {
            id,
            jpeg: vec![0xFF, 0xD8],
            width: 4,
            height: 4,
            regions: vec![Region::new(0, 0, 2, 2, 0.9)],
            submitted_at_ms: 1_000 + id,
            capture_wall_clock: UNIX_EPOCH,
        }
    }

    fn batch(id: u64, resolved_at_ms: u64, label: &str) -> ResolvedBatch {
        ResolvedBatch {
            id,
            identities: vec![ResolvedIdentity {
                label: label.to_string(),
                region: Region::new(10, 10, 40, 40, 0.0),
                source_timestamp_ms: resolved_at_ms - 10,
            }],
            resolved_at_ms,
        }
    }

    #[test]
    fn test_submissions_reach_resolver() {
        let (mut queue, endpoint) = channel_resolution_queue(4);
        queue.submit(record(1)).unwrap();
        queue.submit(record(2)).unwrap();

        let ids: Vec<u64> = (0..2)
            .filter_map(|_| endpoint.next_submission(Duration::from_millis(10)))
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_full_mailbox_drops_record_without_blocking() {
        let (mut queue, endpoint) = channel_resolution_queue(1);
        queue.submit(record(1)).unwrap();

        let err = queue.submit(record(2)).unwrap_err();
        assert!(err.to_string().contains("record 2 dropped"));
        assert_eq!(endpoint.next_submission(Duration::ZERO).map(|r| r.id), Some(1));
    }

    #[test]
    fn test_submit_after_resolver_gone_is_error() {
        let (mut queue, endpoint) = channel_resolution_queue(2);
        drop(endpoint);
        assert!(queue.submit(record(1)).is_err());
    }

    #[test]
    fn test_take_is_destructive() {
        let (mut queue, endpoint) = channel_resolution_queue(1);
        endpoint.publish(batch(1, 2_000, "alice")).unwrap();

        assert_eq!(queue.take_latest_resolved().unwrap().map(|b| b.id), Some(1));
        assert_eq!(queue.take_latest_resolved().unwrap(), None);
    }

    #[test]
    fn test_take_returns_newest_and_discards_older() {
        let (mut queue, endpoint) = channel_resolution_queue(1);
        endpoint.publish(batch(2, 2_000, "t2")).unwrap();
        endpoint.publish(batch(3, 3_000, "t3")).unwrap();
        endpoint.publish(batch(1, 1_000, "t1")).unwrap();

        let latest = queue.take_latest_resolved().unwrap().unwrap();
        assert_eq!(latest.identities[0].label, "t3");
        assert_eq!(queue.take_latest_resolved().unwrap(), None);
    }

    #[test]
    fn test_take_when_nothing_pending_is_empty() {
        let (mut queue, _endpoint) = channel_resolution_queue(1);
        assert_eq!(queue.take_latest_resolved().unwrap(), None);
    }
}
