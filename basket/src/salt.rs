use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use moka::sync::Cache;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::storage::{CacheError, CacheProvider};
use crate::time::{day_bucket, seconds_until_end_of_day, TimeSource};

const SALT_LENGTH: usize = 32;

#[derive(Debug, Error, PartialEq)]
pub enum SaltError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("salt for day {0} vanished after losing the race to set it")]
    Vanished(i64),
}

/// Hex-encoded sha256 of the identifier followed by the salt.
pub fn hash_anonymous_id(anonymous_id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(anonymous_id.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

fn random_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect()
}

/// Hands out one salt per UTC day, shared by every instance through the cache.
///
/// The first instance to need a day's salt claims the cache key with an
/// atomic set-if-absent; everyone else reads the winner's value. Each
/// instance also keeps its own candidate for the day, which is what gets
/// offered in the claim and what is used if the cache is unreachable.
pub struct SaltManager {
    cache: Arc<dyn CacheProvider>,
    clock: Arc<dyn TimeSource + Send + Sync>,
    /// Salts confirmed through the cache, keyed by day bucket
    salts: Cache<i64, String>,
    /// This instance's own candidate for each day
    candidates: Cache<i64, String>,
}

impl SaltManager {
    pub fn new(cache: Arc<dyn CacheProvider>, clock: Arc<dyn TimeSource + Send + Sync>) -> Self {
        let ttl = Duration::from_secs(2 * 86_400);
        SaltManager {
            cache,
            clock,
            salts: Cache::builder().time_to_live(ttl).max_capacity(4).build(),
            candidates: Cache::builder().time_to_live(ttl).max_capacity(4).build(),
        }
    }

    pub fn key_for_day(day: i64) -> String {
        format!("salt:{}", day)
    }

    pub async fn get_daily_salt(&self) -> String {
        let now = self.clock.now_millis();
        let day = day_bucket(now);

        if let Some(salt) = self.salts.get(&day) {
            return salt;
        }

        let candidate = self.candidates.get_with(day, random_salt);
        match self.fetch_or_claim(day, &candidate, seconds_until_end_of_day(now)).await {
            Ok(salt) => {
                self.salts.insert(day, salt.clone());
                salt
            }
            Err(err) => {
                warn!("falling back to a local salt for day {}: {}", day, err);
                counter!("basket_salt_fallback_total").increment(1);
                candidate
            }
        }
    }

    async fn fetch_or_claim(&self, day: i64, candidate: &str, ttl: u64) -> Result<String, SaltError> {
        let key = Self::key_for_day(day);

        if let Some(salt) = self.cache.get(&key).await? {
            return Ok(salt);
        }

        if self.cache.set_nx(&key, candidate, ttl).await? {
            debug!("generated salt for day {}", day);
            counter!("basket_salt_generated_total").increment(1);
            return Ok(candidate.to_owned());
        }

        // Another instance won the race, use its value
        self.cache.get(&key).await?.ok_or(SaltError::Vanished(day))
    }
}
