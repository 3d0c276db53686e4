use std::time::Duration;

/// Polling reconciler settings. Hot-reloadable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// Maximum orders examined per sweep.
    pub batch_size: i64,
    /// Pause between two provider lookups within a sweep.
    pub request_delay: Duration,
    /// How long a `processing` order may sit without a provider order id
    /// before it is parked for manual review.
    pub orphan_grace: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            batch_size: 50,
            request_delay: Duration::from_millis(500),
            orphan_grace: Duration::from_secs(600),
        }
    }
}
