use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::event::{EventContext, IncomingEvent};
use crate::processors::{
    first_non_empty, has_valid_envelope, hashed_anonymous_id, timestamp_or, EventProcessor,
    ProcessOutcome, ProcessorDeps, ProcessorError,
};
use crate::records::{ErrorRecord, ERRORS_TABLE};
use crate::sanitize::{
    lenient, sanitize_string, validate_session_id, whole_number, SHORT_STRING_MAX_LENGTH,
    STRING_MAX_LENGTH,
};

pub const ERROR_EVENT: &str = "error";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorPayload {
    #[serde(deserialize_with = "lenient::string")]
    path: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    message: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    filename: Option<String>,
    #[serde(deserialize_with = "lenient::number")]
    lineno: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    colno: Option<f64>,
    #[serde(deserialize_with = "lenient::string")]
    stack: Option<String>,
    #[serde(rename = "errorType", deserialize_with = "lenient::string")]
    error_type: Option<String>,
    #[serde(rename = "anonymousId", deserialize_with = "lenient::string")]
    anonymous_id: Option<String>,
    #[serde(rename = "anonymous_id", deserialize_with = "lenient::string")]
    anonymous_id_snake: Option<String>,
    #[serde(rename = "sessionId", deserialize_with = "lenient::string")]
    session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorEvent {
    #[serde(deserialize_with = "lenient::number")]
    timestamp: Option<f64>,
    #[serde(rename = "sessionId", deserialize_with = "lenient::string")]
    session_id: Option<String>,
    #[serde(rename = "anonymousId", deserialize_with = "lenient::string")]
    anonymous_id: Option<String>,
    #[serde(rename = "anonymous_id", deserialize_with = "lenient::string")]
    anonymous_id_snake: Option<String>,
    payload: ErrorPayload,
}

/// Uncaught exceptions reported by the browser.
pub struct ErrorProcessor {
    deps: ProcessorDeps,
}

impl ErrorProcessor {
    pub fn new(deps: ProcessorDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl EventProcessor for ErrorProcessor {
    fn event_type(&self) -> &'static str {
        ERROR_EVENT
    }

    fn validate(&self, event: &IncomingEvent) -> bool {
        has_valid_envelope(event, ERROR_EVENT) && event.has_payload()
    }

    async fn process(
        &self,
        event: &IncomingEvent,
        context: &EventContext,
    ) -> Result<ProcessOutcome, ProcessorError> {
        let parsed: ErrorEvent = event.parse().map_err(|source| ProcessorError::Malformed {
            event_type: ERROR_EVENT,
            source,
        })?;
        let event_id = event.event_id();
        if self.deps.is_duplicate(event_id.as_deref(), ERROR_EVENT).await {
            return Ok(ProcessOutcome::Duplicate);
        }

        let payload = parsed.payload;
        let now = self.deps.now();

        let anonymous_id = first_non_empty([
            parsed.anonymous_id,
            parsed.anonymous_id_snake,
            payload.anonymous_id,
            payload.anonymous_id_snake,
        ]);
        let session_id = first_non_empty([parsed.session_id, payload.session_id]);

        let record = ErrorRecord {
            id: Uuid::now_v7(),
            client_id: context.client_id.clone(),
            event_id: event_id.clone(),
            anonymous_id: hashed_anonymous_id(anonymous_id.as_deref(), &context.salt),
            session_id: validate_session_id(session_id.as_deref()),
            timestamp: timestamp_or(parsed.timestamp, now),
            path: sanitize_string(payload.path.as_deref(), STRING_MAX_LENGTH),
            message: sanitize_string(payload.message.as_deref(), STRING_MAX_LENGTH),
            filename: sanitize_string(payload.filename.as_deref(), STRING_MAX_LENGTH),
            lineno: whole_number(payload.lineno),
            colno: whole_number(payload.colno),
            stack: sanitize_string(payload.stack.as_deref(), STRING_MAX_LENGTH),
            error_type: sanitize_string(payload.error_type.as_deref(), SHORT_STRING_MAX_LENGTH),
            created_at: now,
        };

        Ok(self
            .deps
            .store(ERRORS_TABLE, record.into(), ERROR_EVENT, event_id.as_deref())
            .await)
    }
}
