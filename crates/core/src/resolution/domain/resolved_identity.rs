use serde::{Deserialize, Serialize};

use crate::shared::region::Region;

/// One label the resolver attached to a region of a submitted frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub label: String,
    pub region: Region,
    /// Timestamp of the submission this identity was resolved from.
    pub source_timestamp_ms: u64,
}

impl ResolvedIdentity {
    /// Identities with a blank label or a degenerate region cannot be matched
    /// meaningfully and are discarded before they reach the pool.
    pub fn is_well_formed(&self) -> bool {
        !self.label.trim().is_empty() && self.region.has_area()
    }
}

/// One row of resolver output, consumed at most once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedBatch {
    pub id: u64,
    #[serde(rename = "payload")]
    pub identities: Vec<ResolvedIdentity>,
    pub resolved_at_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn identity(label: &str, w: i32, h: i32) -> ResolvedIdentity {
        ResolvedIdentity {
            label: label.to_string(),
            region: Region::new(10, 10, w, h, 0.0),
            source_timestamp_ms: 1_000,
        }
    }

    #[rstest]
    #[case(identity("alice", 40, 40), true)]
    #[case(identity("", 40, 40), false)]
    #[case(identity("   ", 40, 40), false)]
    #[case(identity("bob", 0, 40), false)]
    #[case(identity("bob", 40, -3), false)]
    fn test_is_well_formed(#[case] id: ResolvedIdentity, #[case] expected: bool) {
        assert_eq!(id.is_well_formed(), expected);
    }

    #[test]
    fn test_batch_wire_format_uses_payload_field() {
        let json = r#"{
            "id": 7,
            "payload": [
                {"label": "alice", "region": {"x": 1, "y": 2, "width": 30, "height": 40},
                 "source_timestamp_ms": 1500}
            ],
            "resolved_at_ms": 1600
        }"#;
        let batch: ResolvedBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.id, 7);
        assert_eq!(batch.resolved_at_ms, 1600);
        assert_eq!(batch.identities.len(), 1);
        assert_eq!(batch.identities[0].label, "alice");
        assert_eq!(batch.identities[0].source_timestamp_ms, 1500);
    }

    #[test]
    fn test_batch_missing_timestamp_is_rejected() {
        let json = r#"{"id": 1, "payload": [{"label": "a", "region": {"x":0,"y":0,"width":1,"height":1}}], "resolved_at_ms": 2}"#;
        assert!(serde_json::from_str::<ResolvedBatch>(json).is_err());
    }
}
