use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock source in milliseconds since the Unix epoch.
///
/// The association window is defined against wall-clock time because
/// resolver timestamps come from another process.
pub trait Clock: Send {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        unix_millis(SystemTime::now())
    }
}

pub fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Settable clock for driving time windows deterministically.
///
/// Clones share the same instant, so a test can keep a handle while the
/// pipeline owns another.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_unix_millis_of_epoch_offset() {
        let t = UNIX_EPOCH + Duration::from_millis(1_234);
        assert_eq!(unix_millis(t), 1_234);
    }

    #[test]
    fn test_unix_millis_before_epoch_is_zero() {
        let t = UNIX_EPOCH - Duration::from_secs(5);
        assert_eq!(unix_millis(t), 0);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(100);
        let handle = clock.clone();
        handle.advance(50);
        assert_eq!(clock.now_ms(), 150);
        handle.set(10);
        assert_eq!(clock.now_ms(), 10);
    }
}
