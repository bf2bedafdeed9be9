/// State of an index rebuild, as seen by one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildProgress {
    Idle,
    Running,
    Completed,
}

/// The resolver's lookup index, as far as the live loop is concerned: it can
/// be asked whether someone new was enrolled and told to rebuild.
///
/// Rebuilds run out of band. `start_rebuild` returns as soon as the work is
/// launched and `poll_rebuild` reports on it without waiting.
pub trait IdentityIndex: Send {
    fn has_new_enrollment(&mut self) -> Result<bool, Box<dyn std::error::Error>>;
    fn start_rebuild(&mut self) -> Result<(), Box<dyn std::error::Error>>;
    /// `Completed` is reported once per finished rebuild, then `Idle`.
    /// A failed or abandoned rebuild is an error and leaves the index `Idle`.
    fn poll_rebuild(&mut self) -> Result<RebuildProgress, Box<dyn std::error::Error>>;
}

/// Index with no enrollment source; never reports anything new.
pub struct DisabledIdentityIndex;

impl IdentityIndex for DisabledIdentityIndex {
    fn has_new_enrollment(&mut self) -> Result<bool, Box<dyn std::error::Error>> {
        Ok(false)
    }

    fn start_rebuild(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }

    fn poll_rebuild(&mut self) -> Result<RebuildProgress, Box<dyn std::error::Error>> {
        Ok(RebuildProgress::Idle)
    }
}
