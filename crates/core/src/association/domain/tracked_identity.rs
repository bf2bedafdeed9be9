use crate::resolution::domain::resolved_identity::ResolvedIdentity;
use crate::shared::region::Region;

/// A resolved label held in the pool until its validity window lapses.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedIdentity {
    pub label: String,
    pub region: Region,
    /// When the submitted frame was captured. Expiry is measured from here.
    pub source_timestamp_ms: u64,
    /// When the pipeline received the resolution. Informational only.
    pub arrival_ms: u64,
}

impl TrackedIdentity {
    pub fn from_resolved(identity: ResolvedIdentity, arrival_ms: u64) -> Self {
        Self {
            label: identity.label,
            region: identity.region,
            source_timestamp_ms: identity.source_timestamp_ms,
            arrival_ms,
        }
    }

    pub fn is_expired(&self, now_ms: u64, validity_window_ms: u64) -> bool {
        now_ms.abs_diff(self.source_timestamp_ms) > validity_window_ms
    }
}

/// A region that passed the drawing threshold, with its label if one matched.
#[derive(Clone, Debug, PartialEq)]
pub struct LabeledRegion {
    pub region: Region,
    pub label: Option<String>,
}

impl LabeledRegion {
    /// Text drawn above the box; empty when unlabelled.
    pub fn label_text(&self) -> &str {
        self.label.as_deref().unwrap_or("")
    }
}
