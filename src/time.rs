use std::time::{Duration, UNIX_EPOCH};

pub fn epoch() -> Duration {
    UNIX_EPOCH
        .elapsed()
        .expect("current time is before unix epoch")
}

/// The current time in milliseconds since the unix epoch.
pub fn now_ms() -> u64 {
    u64::try_from(epoch().as_millis()).unwrap_or(u64::MAX)
}
