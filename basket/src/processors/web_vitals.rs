use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::event::{EventContext, IncomingEvent};
use crate::processors::{
    first_non_empty, has_valid_envelope, hashed_anonymous_id, timestamp_or, EventProcessor,
    ProcessOutcome, ProcessorDeps, ProcessorError,
};
use crate::records::{WebVitalsRecord, WEB_VITALS_TABLE};
use crate::sanitize::{
    clamp_metric, clamp_timing_metric, lenient, sanitize_string, validate_session_id,
    STRING_MAX_LENGTH,
};

pub const WEB_VITALS_EVENT: &str = "web_vitals";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VitalsPayload {
    #[serde(deserialize_with = "lenient::string")]
    path: Option<String>,
    #[serde(deserialize_with = "lenient::number")]
    fcp: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    lcp: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    cls: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    fid: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    inp: Option<f64>,
    #[serde(rename = "anonymousId", deserialize_with = "lenient::string")]
    anonymous_id: Option<String>,
    #[serde(rename = "anonymous_id", deserialize_with = "lenient::string")]
    anonymous_id_snake: Option<String>,
    #[serde(rename = "sessionId", deserialize_with = "lenient::string")]
    session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VitalsEvent {
    #[serde(deserialize_with = "lenient::number")]
    timestamp: Option<f64>,
    #[serde(rename = "sessionId", deserialize_with = "lenient::string")]
    session_id: Option<String>,
    #[serde(rename = "anonymousId", deserialize_with = "lenient::string")]
    anonymous_id: Option<String>,
    #[serde(rename = "anonymous_id", deserialize_with = "lenient::string")]
    anonymous_id_snake: Option<String>,
    payload: VitalsPayload,
}

pub struct WebVitalsProcessor {
    deps: ProcessorDeps,
}

impl WebVitalsProcessor {
    pub fn new(deps: ProcessorDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl EventProcessor for WebVitalsProcessor {
    fn event_type(&self) -> &'static str {
        WEB_VITALS_EVENT
    }

    fn validate(&self, event: &IncomingEvent) -> bool {
        has_valid_envelope(event, WEB_VITALS_EVENT) && event.has_payload()
    }

    async fn process(
        &self,
        event: &IncomingEvent,
        context: &EventContext,
    ) -> Result<ProcessOutcome, ProcessorError> {
        let parsed: VitalsEvent = event.parse().map_err(|source| ProcessorError::Malformed {
            event_type: WEB_VITALS_EVENT,
            source,
        })?;
        let event_id = event.event_id();
        if self.deps.is_duplicate(event_id.as_deref(), WEB_VITALS_EVENT).await {
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

        let record = WebVitalsRecord {
            id: Uuid::now_v7(),
            client_id: context.client_id.clone(),
            event_id: event_id.clone(),
            anonymous_id: hashed_anonymous_id(anonymous_id.as_deref(), &context.salt),
            session_id: validate_session_id(session_id.as_deref()),
            timestamp: timestamp_or(parsed.timestamp, now),
            path: sanitize_string(payload.path.as_deref(), STRING_MAX_LENGTH),
            fcp: clamp_timing_metric(payload.fcp),
            lcp: clamp_timing_metric(payload.lcp),
            cls: clamp_metric(payload.cls),
            fid: clamp_timing_metric(payload.fid),
            inp: clamp_timing_metric(payload.inp),
            created_at: now,
        };

        Ok(self
            .deps
            .store(
                WEB_VITALS_TABLE,
                record.into(),
                WEB_VITALS_EVENT,
                event_id.as_deref(),
            )
            .await)
    }
}
