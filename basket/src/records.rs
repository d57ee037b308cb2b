//! Storage-ready rows, one struct per destination table. Written once, never
//! read back or updated by this service.

use clickhouse::Row;
use serde::Serialize;
use uuid::Uuid;

pub const EVENTS_TABLE: &str = "analytics.events";
pub const ERRORS_TABLE: &str = "analytics.errors";
pub const WEB_VITALS_TABLE: &str = "analytics.web_vitals";

#[derive(Row, Debug, Clone, PartialEq, Serialize)]
pub struct TrackRecord {
    #[serde(with = "clickhouse::serde::uuid")]
    pub id: Uuid,
    pub client_id: String,
    pub event_name: Option<String>,
    pub anonymous_id: Option<String>,
    pub time: i64,
    pub session_id: Option<String>,
    pub event_type: String,
    pub event_id: Option<String>,
    pub session_start_time: i64,
    pub timestamp: i64,

    pub referrer: Option<String>,
    pub url: Option<String>,
    pub path: Option<String>,
    pub title: Option<String>,

    pub ip: String,
    pub user_agent: String,
    pub browser_name: String,
    pub browser_version: String,
    pub os_name: String,
    pub os_version: String,
    pub device_type: String,
    pub device_brand: String,
    pub device_model: String,
    pub country: String,
    pub region: String,
    pub city: String,

    pub screen_resolution: Option<String>,
    pub viewport_size: Option<String>,
    pub language: Option<String>,
    pub timezone: Option<String>,

    pub connection_type: Option<String>,
    pub rtt: Option<f64>,
    pub downlink: Option<f64>,

    pub time_on_page: Option<f64>,
    pub scroll_depth: Option<f64>,
    pub interaction_count: Option<i64>,
    pub exit_intent: i64,
    pub page_count: i64,
    pub is_bounce: i64,
    pub has_exit_intent: Option<bool>,
    pub page_size: Option<f64>,

    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,

    pub load_time: Option<f64>,
    pub dom_ready_time: Option<f64>,
    pub dom_interactive: Option<f64>,
    pub ttfb: Option<f64>,
    pub connection_time: Option<f64>,
    pub request_time: Option<f64>,
    pub render_time: Option<f64>,
    pub redirect_time: Option<f64>,
    pub domain_lookup_time: Option<f64>,

    pub fcp: Option<f64>,
    pub lcp: Option<f64>,
    pub cls: Option<f64>,
    pub fid: Option<f64>,
    pub inp: Option<f64>,

    pub href: Option<String>,
    pub text: Option<String>,
    pub value: Option<String>,

    pub properties: String,
    pub created_at: i64,
}

#[derive(Row, Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    #[serde(with = "clickhouse::serde::uuid")]
    pub id: Uuid,
    pub client_id: String,
    pub event_id: Option<String>,
    pub anonymous_id: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: i64,
    pub path: Option<String>,
    pub message: Option<String>,
    pub filename: Option<String>,
    pub lineno: Option<i64>,
    pub colno: Option<i64>,
    pub stack: Option<String>,
    pub error_type: Option<String>,
    pub created_at: i64,
}

#[derive(Row, Debug, Clone, PartialEq, Serialize)]
pub struct WebVitalsRecord {
    #[serde(with = "clickhouse::serde::uuid")]
    pub id: Uuid,
    pub client_id: String,
    pub event_id: Option<String>,
    pub anonymous_id: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: i64,
    pub path: Option<String>,
    pub fcp: Option<f64>,
    pub lcp: Option<f64>,
    pub cls: Option<f64>,
    pub fid: Option<f64>,
    pub inp: Option<f64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CanonicalRecord {
    Track(Box<TrackRecord>),
    Error(ErrorRecord),
    WebVitals(WebVitalsRecord),
}

impl CanonicalRecord {
    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::Track(r) => r.event_id.as_deref(),
            Self::Error(r) => r.event_id.as_deref(),
            Self::WebVitals(r) => r.event_id.as_deref(),
        }
    }

    pub fn anonymous_id(&self) -> Option<&str> {
        match self {
            Self::Track(r) => r.anonymous_id.as_deref(),
            Self::Error(r) => r.anonymous_id.as_deref(),
            Self::WebVitals(r) => r.anonymous_id.as_deref(),
        }
    }
}

impl From<TrackRecord> for CanonicalRecord {
    fn from(record: TrackRecord) -> Self {
        Self::Track(Box::new(record))
    }
}

impl From<ErrorRecord> for CanonicalRecord {
    fn from(record: ErrorRecord) -> Self {
        Self::Error(record)
    }
}

impl From<WebVitalsRecord> for CanonicalRecord {
    fn from(record: WebVitalsRecord) -> Self {
        Self::WebVitals(record)
    }
}
