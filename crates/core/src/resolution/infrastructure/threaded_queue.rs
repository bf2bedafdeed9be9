use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{select, Receiver, RecvTimeoutError, SendError, Sender, TrySendError};
use thiserror::Error;

use crate::resolution::domain::resolution_queue::ResolutionQueue;
use crate::resolution::domain::resolved_identity::ResolvedBatch;
use crate::resolution::domain::submission_record::SubmissionRecord;

type TakeReply = Result<Option<ResolvedBatch>, String>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThreadedQueueError {
    #[error("submit mailbox full, record {0} dropped")]
    MailboxFull(u64),
    #[error("resolution queue worker has stopped")]
    WorkerStopped,
    #[error("no resolution reply within {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Inner(String),
}

/// Runs another [`ResolutionQueue`] on a dedicated worker thread.
///
/// `submit` only enqueues into a bounded mailbox and never waits on storage.
/// `take_latest_resolved` still answers in the caller's frame but gives up
/// after `timeout`. At most one take is outstanding: a reply that misses the
/// deadline is kept and collected by the next take rather than asking the
/// worker again.
pub struct ThreadedResolutionQueue {
    submit_tx: Option<Sender<SubmissionRecord>>,
    take_tx: Option<Sender<Sender<TakeReply>>>,
    in_flight: Option<Receiver<TakeReply>>,
    timeout: Duration,
    worker: Option<JoinHandle<()>>,
}

impl ThreadedResolutionQueue {
    pub fn spawn(
        inner: Box<dyn ResolutionQueue>,
        mailbox: usize,
        timeout: Duration,
    ) -> Result<Self, std::io::Error> {
        let (submit_tx, submit_rx) = crossbeam_channel::bounded(mailbox.max(1));
        let (take_tx, take_rx) = crossbeam_channel::bounded(1);
        let worker = std::thread::Builder::new()
            .name("resolution-queue".into())
            .spawn(move || Worker::new(inner).run(submit_rx, take_rx))?;
        Ok(Self {
            submit_tx: Some(submit_tx),
            take_tx: Some(take_tx),
            in_flight: None,
            timeout,
            worker: Some(worker),
        })
    }

    /// Receiver for the current take: the one still pending, or a new request.
    fn take_request(&mut self) -> Result<Receiver<TakeReply>, ThreadedQueueError> {
        if let Some(pending) = self.in_flight.take() {
            return Ok(pending);
        }
        let tx = self.take_tx.as_ref().ok_or(ThreadedQueueError::WorkerStopped)?;
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        match tx.try_send(reply_tx) {
            Ok(()) => Ok(reply_rx),
            Err(TrySendError::Full(_)) => Err(ThreadedQueueError::Timeout(self.timeout)),
            Err(TrySendError::Disconnected(_)) => Err(ThreadedQueueError::WorkerStopped),
        }
    }
}

struct Worker {
    inner: Box<dyn ResolutionQueue>,
    /// Batch taken from the store whose reply could not be delivered.
    held: Option<ResolvedBatch>,
}

impl Worker {
    fn new(inner: Box<dyn ResolutionQueue>) -> Self {
        Self { inner, held: None }
    }

    fn run(mut self, submit_rx: Receiver<SubmissionRecord>, take_rx: Receiver<Sender<TakeReply>>) {
        loop {
            select! {
                recv(submit_rx) -> msg => match msg {
                    Ok(record) => self.submit(record),
                    Err(_) => break,
                },
                recv(take_rx) -> msg => match msg {
                    Ok(reply) => self.take(reply),
                    Err(_) => break,
                },
            }
        }
        // Both senders are gone by now; hand over whatever is still buffered.
        for record in submit_rx.try_iter() {
            self.submit(record);
        }
        if let Some(batch) = self.held.take() {
            log::debug!("Resolved batch {} undelivered at shutdown", batch.id);
        }
        log::debug!("Resolution queue worker stopped");
    }

    fn submit(&mut self, record: SubmissionRecord) {
        let id = record.id;
        if let Err(e) = self.inner.submit(record) {
            log::warn!("Submission {id} dropped: {e}");
        }
    }

    fn take(&mut self, reply: Sender<TakeReply>) {
        let result = match self.inner.take_latest_resolved() {
            Ok(taken) => Ok(newest(self.held.take(), taken)),
            Err(e) if self.held.is_some() => {
                log::warn!("Reading resolved batches failed: {e}");
                Ok(self.held.take())
            }
            Err(e) => Err(e.to_string()),
        };
        if let Err(SendError(Ok(Some(batch)))) = reply.send(result) {
            self.held = Some(batch);
        }
    }
}

fn newest(a: Option<ResolvedBatch>, b: Option<ResolvedBatch>) -> Option<ResolvedBatch> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.resolved_at_ms >= a.resolved_at_ms { b } else { a }),
        (a, b) => a.or(b),
    }
}

impl ResolutionQueue for ThreadedResolutionQueue {
    fn submit(&mut self, record: SubmissionRecord) -> Result<(), Box<dyn std::error::Error>> {
        let tx = self
            .submit_tx
            .as_ref()
            .ok_or(ThreadedQueueError::WorkerStopped)?;
        match tx.try_send(record) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(record)) => {
                Err(ThreadedQueueError::MailboxFull(record.id).into())
            }
            Err(TrySendError::Disconnected(_)) => Err(ThreadedQueueError::WorkerStopped.into()),
        }
    }

    fn take_latest_resolved(
        &mut self,
    ) -> Result<Option<ResolvedBatch>, Box<dyn std::error::Error>> {
        let reply_rx = self.take_request()?;
        match reply_rx.recv_timeout(self.timeout) {
            Ok(reply) => reply.map_err(|e| ThreadedQueueError::Inner(e).into()),
            Err(RecvTimeoutError::Timeout) => {
                self.in_flight = Some(reply_rx);
                Err(ThreadedQueueError::Timeout(self.timeout).into())
            }
            Err(RecvTimeoutError::Disconnected) => Err(ThreadedQueueError::WorkerStopped.into()),
        }
    }
}

impl Drop for ThreadedResolutionQueue {
    fn drop(&mut self) {
        self.submit_tx.take();
        self.take_tx.take();
        self.in_flight.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Resolution queue worker panicked");
            }
        }
    }
}
