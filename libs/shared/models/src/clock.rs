use chrono::{DateTime, Utc};

/// Source of "now" for every time-dependent rule (presence TTL, upcoming checks,
/// request timestamps). Injected so expiry can be exercised without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
