use std::time::Duration;

/// Tunable limits for a store. All values have workable defaults; the
/// surface that would load these from a file or the environment lives
/// outside this crate.
#[derive(Clone, Copy, Debug)]
pub struct StoreConfig {
    /// The number of numbered databases created at startup.
    pub databases: usize,

    /// How long a pub/sub delivery may take before the subscriber is
    /// considered dead and removed.
    pub delivery_deadline: Duration,

    /// The fraction of extra entries removed by approximate stream
    /// trimming, so repeated XADDs don't trim on every call.
    pub trim_slack: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            databases: 16,
            delivery_deadline: Duration::from_secs(5),
            trim_slack: 0.10,
        }
    }
}
