use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resolution::domain::resolution_queue::ResolutionQueue;
use crate::resolution::domain::resolved_identity::ResolvedBatch;
use crate::resolution::domain::submission_record::SubmissionRecord;
use crate::shared::region::Region;

const SUBMISSIONS_DIR: &str = "submissions";
const RESOLVED_DIR: &str = "resolved";
const TEMP_EXTENSION: &str = "tmp";

#[derive(Error, Debug)]
pub enum QueueStoreError {
    #[error("queue I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode queue entry {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed queue entry {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> QueueStoreError + '_ {
    move |source| QueueStoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Metadata written next to each submitted JPEG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionManifest {
    pub id: u64,
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub regions: Vec<Region>,
    pub submitted_at_ms: u64,
}

/// Durable queue on a directory shared with an out-of-process resolver.
///
/// ```text
/// <root>/submissions/<submitted_at_ms>-<id>.jpg
/// <root>/submissions/<submitted_at_ms>-<id>.json
/// <root>/resolved/<anything>.json        one ResolvedBatch per file
/// ```
///
/// Every file is written under a `.tmp` name and renamed into place, so
/// readers on either side only ever see complete files.
pub struct DirectoryResolutionQueue {
    submissions: PathBuf,
    resolved: PathBuf,
}

impl DirectoryResolutionQueue {
    pub fn open(root: &Path) -> Result<Self, QueueStoreError> {
        let submissions = root.join(SUBMISSIONS_DIR);
        let resolved = root.join(RESOLVED_DIR);
        fs::create_dir_all(&submissions).map_err(io_err(&submissions))?;
        fs::create_dir_all(&resolved).map_err(io_err(&resolved))?;
        log::debug!("Opened resolution queue at {}", root.display());
        Ok(Self {
            submissions,
            resolved,
        })
    }

    pub fn submissions_dir(&self) -> &Path {
        &self.submissions
    }

    pub fn resolved_dir(&self) -> &Path {
        &self.resolved
    }

    pub fn write_submission(&self, record: &SubmissionRecord) -> Result<PathBuf, QueueStoreError> {
        let stem = format!("{}-{}", record.submitted_at_ms, record.id);
        let image_name = format!("{stem}.jpg");
        let manifest_path = self.submissions.join(format!("{stem}.json"));

        write_atomically(&self.submissions.join(&image_name), &record.jpeg)?;

        let manifest = SubmissionManifest {
            id: record.id,
            image: image_name,
            width: record.width,
            height: record.height,
            regions: record.regions.clone(),
            submitted_at_ms: record.submitted_at_ms,
        };
        let json = serde_json::to_vec_pretty(&manifest).map_err(|e| QueueStoreError::Encode {
            path: manifest_path.clone(),
            source: e,
        })?;
        // Manifest last: its presence tells the resolver the image is complete.
        write_atomically(&manifest_path, &json)?;
        Ok(manifest_path)
    }

    /// Pending submission manifests, oldest first. Resolver-side helper.
    pub fn pending_submissions(&self) -> Result<Vec<SubmissionManifest>, QueueStoreError> {
        let mut manifests = Vec::new();
        for path in list_json(&self.submissions)? {
            match read_json::<SubmissionManifest>(&path) {
                Ok(m) => manifests.push(m),
                Err(e) => log::warn!("Skipping submission: {e}"),
            }
        }
        manifests.sort_by_key(|m| (m.submitted_at_ms, m.id));
        Ok(manifests)
    }

    /// Resolver-side helper: publishes one result row.
    pub fn publish_resolved(&self, batch: &ResolvedBatch) -> Result<PathBuf, QueueStoreError> {
        let path = self
            .resolved
            .join(format!("{}-{}.json", batch.resolved_at_ms, batch.id));
        let json = serde_json::to_vec_pretty(batch).map_err(|e| QueueStoreError::Encode {
            path: path.clone(),
            source: e,
        })?;
        write_atomically(&path, &json)?;
        Ok(path)
    }

    /// Reads every resolved row present now, deletes them all and returns the
    /// newest. Rows that arrive while this runs are left for the next take.
    pub fn take_latest(&self) -> Result<Option<ResolvedBatch>, QueueStoreError> {
        let rows = list_json(&self.resolved)?;
        let mut latest: Option<ResolvedBatch> = None;
        for path in &rows {
            match read_json::<ResolvedBatch>(path) {
                Ok(batch) => {
                    if latest
                        .as_ref()
                        .map_or(true, |l| batch.resolved_at_ms > l.resolved_at_ms)
                    {
                        latest = Some(batch);
                    }
                }
                Err(e) => log::warn!("Dropping resolved row: {e}"),
            }
        }
        for path in &rows {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(io_err(path)(e));
                }
            }
        }
        if rows.len() > 1 {
            log::debug!("Consumed {} resolved rows, kept newest", rows.len());
        }
        Ok(latest)
    }
}

impl ResolutionQueue for DirectoryResolutionQueue {
    fn submit(&mut self, record: SubmissionRecord) -> Result<(), Box<dyn std::error::Error>> {
        self.write_submission(&record)?;
        Ok(())
    }

    fn take_latest_resolved(
        &mut self,
    ) -> Result<Option<ResolvedBatch>, Box<dyn std::error::Error>> {
        Ok(self.take_latest()?)
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), QueueStoreError> {
    let temp = path.with_extension(TEMP_EXTENSION);
    fs::write(&temp, bytes).map_err(io_err(&temp))?;
    fs::rename(&temp, path).map_err(|e| {
        let _ = fs::remove_file(&temp);
        io_err(path)(e)
    })
}

fn list_json(dir: &Path) -> Result<Vec<PathBuf>, QueueStoreError> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err(dir))? {
        let path = entry.map_err(io_err(dir))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, QueueStoreError> {
    let bytes = fs::read(path).map_err(io_err(path))?;
    serde_json::from_slice(&bytes).map_err(|e| QueueStoreError::Decode {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::domain::resolved_identity::ResolvedIdentity;
    use std::time::UNIX_EPOCH;
    use tempfile::TempDir;

    fn record(id: u64, submitted_at_ms: u64) -> SubmissionRecord {
        SubmissionRecord {
            id,
            jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width: 64,
            height: 48,
            regions: vec![Region::new(4, 4, 20, 20, 0.8)],
            submitted_at_ms,
            capture_wall_clock: UNIX_EPOCH,
        }
    }

    fn batch(id: u64, resolved_at_ms: u64, label: &str) -> ResolvedBatch {
        ResolvedBatch {
            id,
            identities: vec![ResolvedIdentity {
                label: label.to_string(),
                region: Region::new(4, 4, 20, 20, 0.0),
                source_timestamp_ms: resolved_at_ms - 50,
            }],
            resolved_at_ms,
        }
    }

    fn file_count(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_open_creates_layout() {
        let tmp = TempDir::new().unwrap();
        let queue = DirectoryResolutionQueue::open(&tmp.path().join("q")).unwrap();
        assert!(queue.submissions_dir().is_dir());
        assert!(queue.resolved_dir().is_dir());
    }

    #[test]
    fn test_submit_writes_image_and_manifest() {
        let tmp = TempDir::new().unwrap();
        let mut queue = DirectoryResolutionQueue::open(tmp.path()).unwrap();
        queue.submit(record(3, 1_700)).unwrap();

        let dir = queue.submissions_dir();
        assert_eq!(
            fs::read(dir.join("1700-3.jpg")).unwrap(),
            vec![0xFF, 0xD8, 0xFF, 0xD9]
        );
        let manifests = queue.pending_submissions().unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].image, "1700-3.jpg");
        assert_eq!(manifests[0].regions.len(), 1);
        assert_eq!(file_count(dir), 2, "no temp files left behind");
    }

    #[test]
    fn test_pending_submissions_are_oldest_first() {
        let tmp = TempDir::new().unwrap();
        let mut queue = DirectoryResolutionQueue::open(tmp.path()).unwrap();
        queue.submit(record(2, 20_000)).unwrap();
        queue.submit(record(1, 9_000)).unwrap();

        let ids: Vec<u64> = queue
            .pending_submissions()
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_take_with_nothing_pending_is_empty() {
        let tmp = TempDir::new().unwrap();
        let mut queue = DirectoryResolutionQueue::open(tmp.path()).unwrap();
        assert_eq!(queue.take_latest_resolved().unwrap(), None);
    }

    #[test]
    fn test_take_is_destructive() {
        let tmp = TempDir::new().unwrap();
        let mut queue = DirectoryResolutionQueue::open(tmp.path()).unwrap();
        queue.publish_resolved(&batch(1, 5_000, "alice")).unwrap();

        let first = queue.take_latest_resolved().unwrap().unwrap();
        assert_eq!(first.identities[0].label, "alice");
        assert_eq!(queue.take_latest_resolved().unwrap(), None);
        assert_eq!(file_count(queue.resolved_dir()), 0);
    }

    #[test]
    fn test_take_keeps_newest_and_discards_older() {
        let tmp = TempDir::new().unwrap();
        let mut queue = DirectoryResolutionQueue::open(tmp.path()).unwrap();
        queue.publish_resolved(&batch(1, 1_000, "t1")).unwrap();
        queue.publish_resolved(&batch(3, 3_000, "t3")).unwrap();
        queue.publish_resolved(&batch(2, 2_000, "t2")).unwrap();

        let latest = queue.take_latest_resolved().unwrap().unwrap();
        assert_eq!(latest.identities[0].label, "t3");
        assert_eq!(queue.take_latest_resolved().unwrap(), None);
    }

    #[test]
    fn test_malformed_rows_are_consumed_not_raised() {
        let tmp = TempDir::new().unwrap();
        let mut queue = DirectoryResolutionQueue::open(tmp.path()).unwrap();
        fs::write(queue.resolved_dir().join("junk.json"), "\"[{'label': 'x'}]\"").unwrap();
        queue.publish_resolved(&batch(7, 4_000, "bob")).unwrap();

        let latest = queue.take_latest_resolved().unwrap().unwrap();
        assert_eq!(latest.id, 7);
        assert_eq!(file_count(queue.resolved_dir()), 0);
    }

    #[test]
    fn test_only_malformed_rows_yield_empty() {
        let tmp = TempDir::new().unwrap();
        let mut queue = DirectoryResolutionQueue::open(tmp.path()).unwrap();
        fs::write(queue.resolved_dir().join("bad.json"), "{").unwrap();
        assert_eq!(queue.take_latest_resolved().unwrap(), None);
        assert_eq!(file_count(queue.resolved_dir()), 0);
    }

    #[test]
    fn test_in_flight_temp_files_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let mut queue = DirectoryResolutionQueue::open(tmp.path()).unwrap();
        let partial = queue.resolved_dir().join("9-9.tmp");
        fs::write(&partial, "{\"id\":").unwrap();

        assert_eq!(queue.take_latest_resolved().unwrap(), None);
        assert!(partial.exists());
    }
}
