use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub const MILLIS_PER_DAY: i64 = 86_400_000;

pub trait TimeSource {
    // Milliseconds since the unix epoch
    fn now_millis(&self) -> i64;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn now_millis(&self) -> i64 {
        let now = time::OffsetDateTime::now_utc();
        (now.unix_timestamp_nanos() / 1_000_000) as i64
    }
}

/// A clock that only moves when told to, shared between clones.
#[derive(Clone, Default)]
pub struct ManualTime {
    millis: Arc<AtomicI64>,
}

impl ManualTime {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(millis)),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTime {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Index of the UTC calendar day containing `millis`.
pub fn day_bucket(millis: i64) -> i64 {
    millis.div_euclid(MILLIS_PER_DAY)
}

/// Whole seconds left until the end of the UTC day containing `millis`, at least one.
pub fn seconds_until_end_of_day(millis: i64) -> u64 {
    let next_day = (day_bucket(millis) + 1) * MILLIS_PER_DAY;
    let remaining = (next_day - millis + 999) / 1000;
    remaining.max(1) as u64
}
