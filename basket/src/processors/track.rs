use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::enrichment::{parse_user_agent, GeoResolver};
use crate::event::{EventContext, IncomingEvent};
use crate::processors::{
    first_non_empty, has_valid_envelope, hashed_anonymous_id, timestamp_or, EventProcessor,
    ProcessOutcome, ProcessorDeps, ProcessorError,
};
use crate::records::{TrackRecord, EVENTS_TABLE};
use crate::sanitize::{
    clamp_metric, clamp_timing_metric, lenient, sanitize_string, validate_session_id,
    whole_number, SHORT_STRING_MAX_LENGTH, STRING_MAX_LENGTH,
};

pub const TRACK_EVENT: &str = "track";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TrackEvent {
    #[serde(deserialize_with = "lenient::number")]
    timestamp: Option<f64>,
    #[serde(rename = "sessionId", deserialize_with = "lenient::string")]
    session_id: Option<String>,
    #[serde(rename = "anonymousId", deserialize_with = "lenient::string")]
    anonymous_id: Option<String>,
    #[serde(rename = "anonymous_id", deserialize_with = "lenient::string")]
    anonymous_id_snake: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    name: Option<String>,
    #[serde(rename = "sessionStartTime", deserialize_with = "lenient::number")]
    session_start_time: Option<f64>,
    #[serde(deserialize_with = "lenient::string")]
    path: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    title: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    referrer: Option<String>,

    #[serde(deserialize_with = "lenient::string")]
    screen_resolution: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    viewport_size: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    language: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    timezone: Option<String>,

    #[serde(deserialize_with = "lenient::string")]
    connection_type: Option<String>,
    #[serde(deserialize_with = "lenient::number")]
    rtt: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    downlink: Option<f64>,

    #[serde(deserialize_with = "lenient::string")]
    utm_source: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    utm_medium: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    utm_campaign: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    utm_term: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    utm_content: Option<String>,

    #[serde(deserialize_with = "lenient::number")]
    load_time: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    dom_ready_time: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    dom_interactive: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    ttfb: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    connection_time: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    request_time: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    render_time: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    redirect_time: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    domain_lookup_time: Option<f64>,

    #[serde(deserialize_with = "lenient::number")]
    time_on_page: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    scroll_depth: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    interaction_count: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    exit_intent: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    page_count: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    is_bounce: Option<f64>,
    #[serde(deserialize_with = "lenient::boolean")]
    has_exit_intent: Option<bool>,
    #[serde(deserialize_with = "lenient::number")]
    page_size: Option<f64>,

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

    #[serde(deserialize_with = "lenient::string")]
    href: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    text: Option<String>,
    #[serde(deserialize_with = "lenient::scalar")]
    value: Option<String>,
}

fn long(value: Option<String>) -> Option<String> {
    sanitize_string(value.as_deref(), STRING_MAX_LENGTH)
}

fn short(value: Option<String>) -> Option<String> {
    sanitize_string(value.as_deref(), SHORT_STRING_MAX_LENGTH)
}

/// Finite, non-negative numbers only.
fn non_negative(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

/// Page views and custom events. The only kind enriched with geo and device
/// attributes.
pub struct TrackProcessor {
    deps: ProcessorDeps,
    geo: Arc<GeoResolver>,
}

impl TrackProcessor {
    pub fn new(deps: ProcessorDeps, geo: Arc<GeoResolver>) -> Self {
        Self { deps, geo }
    }

    fn build_record(
        &self,
        event: TrackEvent,
        event_id: Option<String>,
        context: &EventContext,
    ) -> TrackRecord {
        let now = self.deps.now();
        let geo = self.geo.get_geo(&context.ip);
        let ua = parse_user_agent(&context.user_agent);
        let timestamp = timestamp_or(event.timestamp, now);
        let path = long(event.path);

        TrackRecord {
            id: Uuid::now_v7(),
            client_id: context.client_id.clone(),
            event_name: short(event.name),
            anonymous_id: hashed_anonymous_id(
                first_non_empty([event.anonymous_id, event.anonymous_id_snake]).as_deref(),
                &context.salt,
            ),
            time: timestamp,
            session_id: validate_session_id(event.session_id.as_deref()),
            event_type: TRACK_EVENT.to_owned(),
            event_id,
            session_start_time: timestamp_or(event.session_start_time, now),
            timestamp,

            referrer: long(event.referrer),
            url: path.clone(),
            path,
            title: long(event.title),

            ip: geo.anonymized_ip.unwrap_or_default(),
            user_agent: sanitize_string(Some(&context.user_agent), STRING_MAX_LENGTH)
                .unwrap_or_default(),
            browser_name: ua.browser_name.unwrap_or_default(),
            browser_version: ua.browser_version.unwrap_or_default(),
            os_name: ua.os_name.unwrap_or_default(),
            os_version: ua.os_version.unwrap_or_default(),
            device_type: ua.device_type.unwrap_or_default(),
            device_brand: ua.device_brand.unwrap_or_default(),
            device_model: ua.device_model.unwrap_or_default(),
            country: geo.country.unwrap_or_default(),
            region: geo.region.unwrap_or_default(),
            city: geo.city.unwrap_or_default(),

            screen_resolution: short(event.screen_resolution),
            viewport_size: short(event.viewport_size),
            language: short(event.language),
            timezone: short(event.timezone),

            connection_type: short(event.connection_type),
            rtt: non_negative(event.rtt),
            downlink: non_negative(event.downlink),

            time_on_page: non_negative(event.time_on_page),
            scroll_depth: non_negative(event.scroll_depth),
            interaction_count: whole_number(event.interaction_count),
            exit_intent: whole_number(event.exit_intent).unwrap_or(0),
            page_count: whole_number(event.page_count)
                .filter(|c| *c != 0)
                .unwrap_or(1),
            is_bounce: whole_number(event.is_bounce).unwrap_or(0),
            has_exit_intent: event.has_exit_intent,
            page_size: non_negative(event.page_size),

            utm_source: short(event.utm_source),
            utm_medium: short(event.utm_medium),
            utm_campaign: short(event.utm_campaign),
            utm_term: short(event.utm_term),
            utm_content: short(event.utm_content),

            load_time: clamp_timing_metric(event.load_time),
            dom_ready_time: clamp_timing_metric(event.dom_ready_time),
            dom_interactive: clamp_timing_metric(event.dom_interactive),
            ttfb: clamp_timing_metric(event.ttfb),
            connection_time: clamp_timing_metric(event.connection_time),
            request_time: clamp_timing_metric(event.request_time),
            render_time: clamp_timing_metric(event.render_time),
            redirect_time: clamp_timing_metric(event.redirect_time),
            domain_lookup_time: clamp_timing_metric(event.domain_lookup_time),

            fcp: clamp_timing_metric(event.fcp),
            lcp: clamp_timing_metric(event.lcp),
            cls: clamp_metric(event.cls),
            fid: clamp_timing_metric(event.fid),
            inp: clamp_timing_metric(event.inp),

            href: long(event.href),
            text: long(event.text),
            value: long(event.value),

            properties: "{}".to_owned(),
            created_at: now,
        }
    }
}

#[async_trait]
impl EventProcessor for TrackProcessor {
    fn event_type(&self) -> &'static str {
        TRACK_EVENT
    }

    fn validate(&self, event: &IncomingEvent) -> bool {
        has_valid_envelope(event, TRACK_EVENT)
    }

    async fn process(
        &self,
        event: &IncomingEvent,
        context: &EventContext,
    ) -> Result<ProcessOutcome, ProcessorError> {
        let parsed: TrackEvent = event.parse().map_err(|source| ProcessorError::Malformed {
            event_type: TRACK_EVENT,
            source,
        })?;
        let event_id = event.event_id();
        if self.deps.is_duplicate(event_id.as_deref(), TRACK_EVENT).await {
            return Ok(ProcessOutcome::Duplicate);
        }

        let record = self.build_record(parsed, event_id.clone(), context);

        Ok(self
            .deps
            .store(EVENTS_TABLE, record.into(), TRACK_EVENT, event_id.as_deref())
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::test_support::{context, deps, NOW};
    use crate::records::CanonicalRecord;
    use crate::salt::hash_anonymous_id;
    use serde_json::json;

    fn processor() -> (TrackProcessor, crate::storage::memory::MemoryStorage) {
        let (deps, storage) = deps();
        (
            TrackProcessor::new(deps, Arc::new(GeoResolver::disabled())),
            storage,
        )
    }

    fn stored(storage: &crate::storage::memory::MemoryStorage) -> Vec<TrackRecord> {
        storage
            .rows_for(EVENTS_TABLE)
            .into_iter()
            .map(|record| match record {
                CanonicalRecord::Track(record) => *record,
                other => panic!("unexpected record {other:?}"),
            })
            .collect()
    }

    #[test]
    fn validates_the_envelope() {
        let (processor, _) = processor();
        let valid = json!({"type": "track", "timestamp": 1, "clientId": "site"});
        assert!(processor.validate(&valid.into()));

        for invalid in [
            json!({"type": "error", "timestamp": 1, "clientId": "site"}),
            json!({"type": "track", "timestamp": "1", "clientId": "site"}),
            json!({"type": "track", "timestamp": 1, "clientId": ""}),
            json!({"type": "track", "timestamp": 1}),
        ] {
            assert!(!processor.validate(&invalid.into()));
        }
    }

    #[tokio::test]
    async fn builds_a_sanitized_enriched_record() {
        let (processor, storage) = processor();
        let event = IncomingEvent::new(json!({
            "type": "track",
            "timestamp": 1_699_999_999_000i64,
            "clientId": "site",
            "eventId": "e1",
            "name": "screen_view",
            "anonymousId": "anon_1",
            "sessionId": "sess_1",
            "path": "  https://example.com/<pricing>  ",
            "load_time": 1499.6,
            "ttfb": -5,
            "fcp": 400000,
            "cls": 0.12,
            "page_count": 0,
            "value": 42,
            "utm_source": {"nested": true},
        }));

        let outcome = processor.process(&event, &context()).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Stored);

        let rows = stored(&storage);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.event_id.as_deref(), Some("e1"));
        assert_eq!(row.event_name.as_deref(), Some("screen_view"));
        assert_eq!(
            row.anonymous_id,
            Some(hash_anonymous_id("anon_1", "daily-salt"))
        );
        assert_eq!(row.session_id.as_deref(), Some("sess_1"));
        assert_eq!(row.path.as_deref(), Some("https://example.com/pricing"));
        assert_eq!(row.url, row.path);
        assert_eq!(row.timestamp, 1_699_999_999_000);
        assert_eq!(row.session_start_time, NOW);
        assert_eq!(row.created_at, NOW);
        assert_eq!(row.load_time, Some(1500.0));
        assert_eq!(row.ttfb, None);
        assert_eq!(row.fcp, None);
        assert_eq!(row.cls, Some(0.12));
        assert_eq!(row.page_count, 1);
        assert_eq!(row.exit_intent, 0);
        assert_eq!(row.value.as_deref(), Some("42"));
        assert_eq!(row.utm_source, None);
        assert_eq!(row.ip, "203.0.113.0");
        assert_eq!(row.browser_name, "Firefox");
        assert_eq!(row.properties, "{}");
        assert_eq!(row.event_type, "track");
    }

    #[tokio::test]
    async fn accepts_both_anonymous_id_spellings() {
        let (processor, storage) = processor();
        let event = IncomingEvent::new(json!({
            "type": "track",
            "timestamp": 1,
            "clientId": "site",
            "anonymousId": "anon_1",
            "anonymous_id": "anon_2",
        }));
        assert_eq!(
            processor.process(&event, &context()).await.unwrap(),
            ProcessOutcome::Stored
        );

        let snake_only = IncomingEvent::new(json!({
            "type": "track", "timestamp": 1, "clientId": "site", "anonymous_id": "anon_2",
        }));
        processor.process(&snake_only, &context()).await.unwrap();

        let rows = stored(&storage);
        assert_eq!(rows[0].anonymous_id, Some(hash_anonymous_id("anon_1", "daily-salt")));
        assert_eq!(rows[1].anonymous_id, Some(hash_anonymous_id("anon_2", "daily-salt")));
    }

    #[tokio::test]
    async fn duplicates_are_not_stored() {
        let (processor, storage) = processor();
        let event = IncomingEvent::new(json!({
            "type": "track", "timestamp": 1, "clientId": "site", "eventId": "e1",
        }));

        assert_eq!(
            processor.process(&event, &context()).await.unwrap(),
            ProcessOutcome::Stored
        );
        assert_eq!(
            processor.process(&event, &context()).await.unwrap(),
            ProcessOutcome::Duplicate
        );
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn events_without_ids_are_never_deduplicated() {
        let (processor, storage) = processor();
        let event = IncomingEvent::new(json!({"type": "track", "timestamp": 1, "clientId": "site"}));
        processor.process(&event, &context()).await.unwrap();
        processor.process(&event, &context()).await.unwrap();
        assert_eq!(storage.len(), 2);
    }

    #[tokio::test]
    async fn store_failures_are_reported_and_retryable() {
        let (processor, storage) = processor();
        storage.set_failing(true);
        let event = IncomingEvent::new(json!({
            "type": "track", "timestamp": 1, "clientId": "site", "eventId": "e1",
        }));
        assert_eq!(
            processor.process(&event, &context()).await.unwrap(),
            ProcessOutcome::StoreFailed
        );

        storage.set_failing(false);
        assert_eq!(
            processor.process(&event, &context()).await.unwrap(),
            ProcessOutcome::Stored
        );
        assert_eq!(storage.len(), 1);
    }
}
