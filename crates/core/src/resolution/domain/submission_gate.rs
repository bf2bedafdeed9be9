use crate::shared::region::Region;

/// Decides which frames are sampled for resolution.
///
/// Every frame advances the counter. When it reaches the interval the frame
/// is submitted if it has regions, and the counter restarts. A sampled frame
/// with no regions is not submitted and the counter is held one short of the
/// interval, so the very next frame is evaluated again.
#[derive(Debug, Clone)]
pub struct SubmissionGate {
    interval: usize,
    counter: usize,
}

impl SubmissionGate {
    pub fn new(interval: usize) -> Result<Self, &'static str> {
        if interval == 0 {
            return Err("sample interval must be >= 1");
        }
        Ok(Self {
            interval,
            counter: 0,
        })
    }

    pub fn interval(&self) -> usize {
        self.interval
    }

    pub fn should_submit(&mut self, regions: &[Region]) -> bool {
        self.counter += 1;
        if self.counter < self.interval {
            return false;
        }
        if regions.is_empty() {
            self.counter = self.interval - 1;
            return false;
        }
        self.counter = 0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn face() -> Vec<Region> {
        vec![Region::new(10, 10, 50, 50, 0.9)]
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        assert!(SubmissionGate::new(0).is_err());
    }

    #[test]
    fn test_first_submission_is_on_seventh_frame() {
        let mut gate = SubmissionGate::new(7).unwrap();
        let regions = face();
        let decisions: Vec<bool> = (0..14).map(|_| gate.should_submit(&regions)).collect();
        let submitted: Vec<usize> = decisions
            .iter()
            .enumerate()
            .filter(|(_, &d)| d)
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(submitted, vec![7, 14]);
    }

    #[test]
    fn test_empty_sampled_frame_retries_next_frame() {
        let mut gate = SubmissionGate::new(7).unwrap();
        for _ in 0..6 {
            assert!(!gate.should_submit(&face()));
        }
        assert!(!gate.should_submit(&[]));
        assert!(!gate.should_submit(&[]));
        assert!(gate.should_submit(&face()));
        // Counter restarted after the submission.
        for _ in 0..6 {
            assert!(!gate.should_submit(&face()));
        }
        assert!(gate.should_submit(&face()));
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(7)]
    fn test_at_most_one_submission_per_interval(#[case] interval: usize) {
        let mut gate = SubmissionGate::new(interval).unwrap();
        let regions = face();
        let total = (0..interval * 10)
            .filter(|_| gate.should_submit(&regions))
            .count();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_never_submits_without_regions() {
        let mut gate = SubmissionGate::new(2).unwrap();
        assert!((0..50).all(|_| !gate.should_submit(&[])));
    }
}
