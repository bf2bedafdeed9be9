use crate::resolution::domain::resolved_identity::ResolvedBatch;
use crate::shared::constants::{
    DEFAULT_DETECTION_SCORE, DEFAULT_MATCH_DISTANCE, DEFAULT_VALIDITY_WINDOW_MS,
};
use crate::shared::region::Region;

use super::tracked_identity::{LabeledRegion, TrackedIdentity};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssociationConfig {
    /// Regions below this confidence are neither labelled nor drawn.
    pub detection_score: f64,
    /// A label is accepted only when the nearest centre is strictly closer.
    pub match_distance: f64,
    pub validity_window_ms: u64,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            detection_score: DEFAULT_DETECTION_SCORE,
            match_distance: DEFAULT_MATCH_DISTANCE,
            validity_window_ms: DEFAULT_VALIDITY_WINDOW_MS,
        }
    }
}

/// Carries resolved labels forward onto fresh detections by centre proximity.
///
/// The engine owns the pool outright; it is driven from the single per-frame
/// loop and holds no locks. Per frame: expire, ingest, match.
pub struct TrackAssociationEngine {
    config: AssociationConfig,
    pool: Vec<TrackedIdentity>,
}

impl TrackAssociationEngine {
    pub fn new(config: AssociationConfig) -> Self {
        Self {
            config,
            pool: Vec::new(),
        }
    }

    pub fn config(&self) -> &AssociationConfig {
        &self.config
    }

    /// Pool entries in insertion order.
    pub fn pool(&self) -> &[TrackedIdentity] {
        &self.pool
    }

    /// Drops every entry whose source timestamp lies outside the window.
    pub fn expire(&mut self, now_ms: u64) -> usize {
        let window = self.config.validity_window_ms;
        let before = self.pool.len();
        self.pool.retain(|t| !t.is_expired(now_ms, window));
        before - self.pool.len()
    }

    /// Appends the batch's identities that are well formed and still inside
    /// the window. Returns how many were inserted.
    pub fn ingest(&mut self, now_ms: u64, batch: &ResolvedBatch) -> usize {
        let window = self.config.validity_window_ms;
        let mut inserted = 0;
        for identity in &batch.identities {
            if !identity.is_well_formed() {
                log::warn!(
                    "Discarding malformed identity in batch {}: label {:?}, region {:?}",
                    batch.id,
                    identity.label,
                    identity.region
                );
                continue;
            }
            let tracked = TrackedIdentity::from_resolved(identity.clone(), now_ms);
            if tracked.is_expired(now_ms, window) {
                log::debug!(
                    "Late identity {:?} from {} ms ignored",
                    tracked.label,
                    tracked.source_timestamp_ms
                );
                continue;
            }
            self.pool.push(tracked);
            inserted += 1;
        }
        inserted
    }

    /// Labels every qualifying region with its nearest pool entry, if close
    /// enough. Regions under the detection score are left out entirely.
    pub fn match_regions(&self, regions: &[Region]) -> Vec<LabeledRegion> {
        regions
            .iter()
            .filter(|r| r.confidence >= self.config.detection_score)
            .map(|region| LabeledRegion {
                region: region.clone(),
                label: self.nearest_label(region),
            })
            .collect()
    }

    /// One association cycle: expire, then ingest `batch`, then match.
    pub fn associate(
        &mut self,
        now_ms: u64,
        batch: Option<&ResolvedBatch>,
        regions: &[Region],
    ) -> Vec<LabeledRegion> {
        let expired = self.expire(now_ms);
        if expired > 0 {
            log::debug!("Expired {expired} tracked identities");
        }
        if let Some(batch) = batch {
            self.ingest(now_ms, batch);
        }
        self.match_regions(regions)
    }

    // Ties keep the earliest-inserted entry.
    fn nearest_label(&self, region: &Region) -> Option<String> {
        let mut best: Option<(&TrackedIdentity, f64)> = None;
        for entry in &self.pool {
            let d = entry.region.center_distance(region);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((entry, d));
            }
        }
        best.filter(|(_, d)| *d < self.config.match_distance)
            .map(|(entry, _)| entry.label.clone())
    }
}
