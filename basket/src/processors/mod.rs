use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::error;

use crate::dedup::DedupGate;
use crate::event::{EventContext, IncomingEvent};
use crate::records::CanonicalRecord;
use crate::salt::hash_anonymous_id;
use crate::sanitize::{sanitize_string, whole_number, SHORT_STRING_MAX_LENGTH};
use crate::storage::StorageProvider;
use crate::time::TimeSource;

pub mod error;
pub mod track;
pub mod web_vitals;

pub use error::ErrorProcessor;
pub use track::TrackProcessor;
pub use web_vitals::WebVitalsProcessor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Stored,
    /// Already seen within the dedup window; nothing was written.
    Duplicate,
    StoreFailed,
}

impl ProcessOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::Duplicate => "duplicate",
            Self::StoreFailed => "store_failed",
        }
    }
}

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("malformed {event_type} event: {source}")]
    Malformed {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// One kind of event: how to recognise a well-formed one, and how to turn it
/// into a stored row.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    fn event_type(&self) -> &'static str;

    /// Structural check only, no side effects.
    fn validate(&self, event: &IncomingEvent) -> bool;

    async fn process(
        &self,
        event: &IncomingEvent,
        context: &EventContext,
    ) -> Result<ProcessOutcome, ProcessorError>;
}

/// What every processor shares: the dedup gate, the store and a clock.
#[derive(Clone)]
pub struct ProcessorDeps {
    pub dedup: Arc<DedupGate>,
    pub storage: Arc<dyn StorageProvider>,
    pub clock: Arc<dyn TimeSource + Send + Sync>,
}

impl ProcessorDeps {
    /// True when the event was already handled and must not be stored again.
    pub async fn is_duplicate(&self, event_id: Option<&str>, event_type: &str) -> bool {
        match event_id {
            Some(id) => self.dedup.check_duplicate(id, event_type).await,
            None => false,
        }
    }

    pub async fn store(
        &self,
        table: &str,
        record: CanonicalRecord,
        event_type: &str,
        event_id: Option<&str>,
    ) -> ProcessOutcome {
        match self.storage.insert(table, &record).await {
            Ok(()) => ProcessOutcome::Stored,
            Err(err) => {
                error!(table, event_id, "failed to store event: {}", err);
                if let Some(id) = event_id {
                    self.dedup.release(id, event_type).await;
                }
                ProcessOutcome::StoreFailed
            }
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }
}

/// The envelope checks every event kind shares.
pub(crate) fn has_valid_envelope(event: &IncomingEvent, tag: &str) -> bool {
    event.has_type(tag) && event.has_numeric_timestamp() && event.has_client_id()
}

/// `anonymousId` wins over `anonymous_id`, and the envelope over the
/// payload. Blank values are skipped.
pub(crate) fn first_non_empty<const N: usize>(values: [Option<String>; N]) -> Option<String> {
    values.into_iter().flatten().find(|v| !v.trim().is_empty())
}

pub(crate) fn hashed_anonymous_id(raw: Option<&str>, salt: &str) -> Option<String> {
    sanitize_string(raw, SHORT_STRING_MAX_LENGTH).map(|id| hash_anonymous_id(&id, salt))
}

pub(crate) fn timestamp_or(value: Option<f64>, now: i64) -> i64 {
    whole_number(value).unwrap_or(now)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::storage::memory::{MemoryCache, MemoryStorage};
    use crate::time::ManualTime;

    pub const NOW: i64 = 1_700_000_000_000;

    pub fn deps() -> (ProcessorDeps, MemoryStorage) {
        let storage = MemoryStorage::default();
        let deps = ProcessorDeps {
            dedup: Arc::new(DedupGate::new(Arc::new(MemoryCache::default()))),
            storage: Arc::new(storage.clone()),
            clock: Arc::new(ManualTime::new(NOW)),
        };
        (deps, storage)
    }

    pub fn context() -> EventContext {
        EventContext {
            ip: "203.0.113.77".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0"
                .to_string(),
            client_id: "site".to_string(),
            owner_id: None,
            salt: "daily-salt".to_string(),
        }
    }
}
