use std::sync::Arc;

use metrics::counter;
use tracing::warn;

use crate::storage::CacheProvider;

pub const DEDUP_TTL_SECONDS: u64 = 86_400;
pub const EXIT_DEDUP_TTL_SECONDS: u64 = 172_800;

/// Event ids carrying this prefix come from page-exit beacons, which may be
/// delivered late and get a longer window.
// TODO: replace the prefix sniff with an explicit exit flag on the wire format
pub const EXIT_EVENT_PREFIX: &str = "exit_";

/// Idempotency boundary for client retries and double-fired beacons.
pub struct DedupGate {
    cache: Arc<dyn CacheProvider>,
}

impl DedupGate {
    pub fn new(cache: Arc<dyn CacheProvider>) -> Self {
        Self { cache }
    }

    pub fn key(event_type: &str, event_id: &str) -> String {
        format!("dedup:{}:{}", event_type, event_id)
    }

    pub fn ttl_for(event_id: &str) -> u64 {
        if event_id.starts_with(EXIT_EVENT_PREFIX) {
            EXIT_DEDUP_TTL_SECONDS
        } else {
            DEDUP_TTL_SECONDS
        }
    }

    /// Marks the event as seen and reports whether it already was. The mark
    /// is a single set-if-absent, so of several concurrent deliveries exactly
    /// one gets `false`.
    ///
    /// A cache failure lets the event through: a possible duplicate row is
    /// preferred over a lost event.
    pub async fn check_duplicate(&self, event_id: &str, event_type: &str) -> bool {
        let key = Self::key(event_type, event_id);
        match self.cache.set_nx(&key, "1", Self::ttl_for(event_id)).await {
            Ok(inserted) => !inserted,
            Err(err) => {
                warn!(event_id, event_type, "dedup check failed, letting event through: {}", err);
                counter!("basket_dedup_cache_errors_total").increment(1);
                false
            }
        }
    }

    /// Forgets the mark, so that a retry of an event that failed to store is
    /// not mistaken for a duplicate.
    pub async fn release(&self, event_id: &str, event_type: &str) {
        if let Err(err) = self.cache.del(&Self::key(event_type, event_id)).await {
            warn!(event_id, event_type, "failed to release dedup mark: {}", err);
            counter!("basket_dedup_cache_errors_total").increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryCache;
    use crate::time::ManualTime;

    const HOUR_MILLIS: i64 = 3_600_000;

    #[tokio::test]
    async fn second_delivery_is_a_duplicate() {
        let gate = DedupGate::new(Arc::new(MemoryCache::default()));
        assert!(!gate.check_duplicate("e1", "track").await);
        assert!(gate.check_duplicate("e1", "track").await);
        // same id under another type is a different event
        assert!(!gate.check_duplicate("e1", "error").await);
    }

    #[tokio::test]
    async fn exit_beacons_are_remembered_longer() {
        let clock = ManualTime::new(0);
        let cache = MemoryCache::with_clock(clock.clone());
        let gate = DedupGate::new(Arc::new(cache.clone()));

        assert!(!gate.check_duplicate("exit_abc", "track").await);
        assert!(!gate.check_duplicate("abc", "track").await);

        clock.advance(36 * HOUR_MILLIS);
        assert!(cache.exists(&DedupGate::key("track", "exit_abc")).await.unwrap());
        assert!(!cache.exists(&DedupGate::key("track", "abc")).await.unwrap());

        assert!(gate.check_duplicate("exit_abc", "track").await);
        assert!(!gate.check_duplicate("abc", "track").await);
    }

    #[tokio::test]
    async fn parallel_deliveries_mark_once() {
        let gate = Arc::new(DedupGate::new(Arc::new(MemoryCache::default())));
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.check_duplicate("e1", "track").await })
            })
            .collect();

        let mut fresh = 0;
        for handle in handles {
            if !handle.await.unwrap() {
                fresh += 1;
            }
        }
        assert_eq!(fresh, 1);
    }

    #[tokio::test]
    async fn released_marks_can_be_claimed_again() {
        let gate = DedupGate::new(Arc::new(MemoryCache::default()));
        assert!(!gate.check_duplicate("e1", "track").await);
        gate.release("e1", "track").await;
        assert!(!gate.check_duplicate("e1", "track").await);
    }

    #[tokio::test]
    async fn cache_errors_fail_open() {
        let cache = MemoryCache::default();
        cache.set_failing(true);
        let gate = DedupGate::new(Arc::new(cache));
        assert!(!gate.check_duplicate("e1", "track").await);
        assert!(!gate.check_duplicate("e1", "track").await);
    }
}
