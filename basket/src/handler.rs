use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{instrument, warn};

use crate::api::{IngestResponse, ResponseStatus};
use crate::event::{EventContext, IncomingEvent};
use crate::prometheus::report_batch_size;
use crate::registry::EventRegistry;
use crate::salt::SaltManager;
use crate::time::TimeSource;
use crate::validation::{AuthContext, IngestRequest, ValidationService};

pub const INVALID_JSON: &str = "Invalid JSON body";
pub const NOT_AN_ARRAY: &str = "Batch endpoint expects array of events";
pub const BATCH_TOO_LARGE: &str = "Batch too large";
pub const REQUEST_TIMED_OUT: &str = "Request timed out";
pub const PROCESSING_FAILED: &str = "Processing failed";

/// Runs a request end to end: validation, salt, dispatch. This is the only
/// component the HTTP layer talks to.
pub struct IngestionHandler {
    validation: ValidationService,
    registry: EventRegistry,
    salts: SaltManager,
    clock: Arc<dyn TimeSource + Send + Sync>,
    batch_max_size: usize,
    request_timeout: Duration,
}

impl IngestionHandler {
    pub fn new(
        validation: ValidationService,
        registry: EventRegistry,
        salts: SaltManager,
        clock: Arc<dyn TimeSource + Send + Sync>,
        batch_max_size: usize,
        request_timeout: Duration,
    ) -> Self {
        Self {
            validation,
            registry,
            salts,
            clock,
            batch_max_size,
            request_timeout,
        }
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.registry.registered_types()
    }

    #[instrument(skip_all, fields(client_id = request.client_id.as_deref()))]
    pub async fn single(&self, request: IngestRequest, body: &[u8]) -> IngestResponse {
        self.with_deadline(self.handle_single(request, body))
            .await
            .unwrap_or_else(|| IngestResponse::failure(ResponseStatus::Error, REQUEST_TIMED_OUT))
    }

    #[instrument(skip_all, fields(client_id = request.client_id.as_deref()))]
    pub async fn batch(&self, request: IngestRequest, body: &[u8]) -> IngestResponse {
        self.with_deadline(self.handle_batch(request, body))
            .await
            .unwrap_or_else(|| {
                IngestResponse::failure(ResponseStatus::Error, REQUEST_TIMED_OUT).in_batch()
            })
    }

    /// Dropping the inner future on expiry cancels every cache and storage
    /// call still in flight.
    async fn with_deadline<F>(&self, work: F) -> Option<IngestResponse>
    where
        F: Future<Output = IngestResponse>,
    {
        match tokio::time::timeout(self.request_timeout, work).await {
            Ok(response) => Some(response),
            Err(_) => {
                warn!(timeout_ms = self.request_timeout.as_millis() as u64, "request timed out");
                None
            }
        }
    }

    async fn handle_single(&self, request: IngestRequest, body: &[u8]) -> IngestResponse {
        let Ok(value) = serde_json::from_slice::<Value>(body) else {
            return IngestResponse::failure(ResponseStatus::Error, INVALID_JSON);
        };

        let auth = match self.validation.validate(&request).await {
            Ok(auth) => auth,
            Err(rejection) => return rejection.into(),
        };
        let context = self.context(auth).await;

        let event = IncomingEvent::new(value).with_defaults(&context.client_id, self.clock.now_millis());
        let result = self.registry.process(&event, &context).await;

        if result.success {
            IngestResponse::success(&result.event_type)
        } else {
            IngestResponse::failure(
                ResponseStatus::Error,
                result.error.unwrap_or_else(|| PROCESSING_FAILED.to_owned()),
            )
        }
    }

    async fn handle_batch(&self, request: IngestRequest, body: &[u8]) -> IngestResponse {
        let events = match serde_json::from_slice::<Value>(body) {
            Ok(Value::Array(events)) => events,
            Ok(_) => return IngestResponse::failure(ResponseStatus::Error, NOT_AN_ARRAY).in_batch(),
            Err(_) => return IngestResponse::failure(ResponseStatus::Error, INVALID_JSON).in_batch(),
        };

        report_batch_size(events.len());
        if events.len() > self.batch_max_size {
            return IngestResponse::failure(ResponseStatus::Error, BATCH_TOO_LARGE);
        }

        let auth = match self.validation.validate(&request).await {
            Ok(auth) => auth,
            Err(rejection) => return IngestResponse::from(rejection).in_batch(),
        };
        let context = self.context(auth).await;

        let now = self.clock.now_millis();
        let events: Vec<IncomingEvent> = events
            .into_iter()
            .map(|event| IncomingEvent::new(event).with_defaults(&context.client_id, now))
            .collect();

        IngestResponse::batch(self.registry.process_batch(&events, &context).await)
    }

    async fn context(&self, auth: AuthContext) -> EventContext {
        EventContext {
            salt: self.salts.get_daily_salt().await,
            ip: auth.ip,
            user_agent: auth.user_agent,
            client_id: auth.client_id,
            owner_id: auth.owner_id,
        }
    }
}
