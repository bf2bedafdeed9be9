use std::time::{Duration, Instant};

/// Holds an output stream to a fixed frame rate by sleeping between frames.
///
/// A writer that falls more than one interval behind re-anchors instead of
/// bursting to catch up.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl FramePacer {
    pub fn new(fps: u32) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            next_due: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// How long to wait before emitting the frame due at `now`, advancing the
    /// schedule.
    pub fn delay_at(&mut self, now: Instant) -> Duration {
        let due = match self.next_due {
            Some(due) if now <= due + self.interval => due,
            _ => now,
        };
        self.next_due = Some(due + self.interval);
        due.saturating_duration_since(now)
    }

    pub fn sleep_until_next_frame(&mut self) {
        let delay = self.delay_at(Instant::now());
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_is_immediate() {
        let mut pacer = FramePacer::new(30);
        assert_eq!(pacer.delay_at(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn test_back_to_back_frames_wait_one_interval() {
        let mut pacer = FramePacer::new(25);
        let t0 = Instant::now();
        pacer.delay_at(t0);
        assert_eq!(pacer.delay_at(t0), Duration::from_millis(40));
    }

    #[test]
    fn test_partial_wait_when_work_took_time() {
        let mut pacer = FramePacer::new(10);
        let t0 = Instant::now();
        pacer.delay_at(t0);
        let delay = pacer.delay_at(t0 + Duration::from_millis(30));
        assert_eq!(delay, Duration::from_millis(70));
    }

    #[test]
    fn test_far_behind_reanchors() {
        let mut pacer = FramePacer::new(10);
        let t0 = Instant::now();
        pacer.delay_at(t0);
        let late = t0 + Duration::from_secs(2);
        assert_eq!(pacer.delay_at(late), Duration::ZERO);
        assert_eq!(pacer.delay_at(late), Duration::from_millis(100));
    }

    #[test]
    fn test_zero_fps_is_treated_as_one() {
        assert_eq!(FramePacer::new(0).interval(), Duration::from_secs(1));
    }
}
