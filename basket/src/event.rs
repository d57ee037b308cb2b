use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::sanitize::{sanitize_string, SHORT_STRING_MAX_LENGTH};

pub const DEFAULT_EVENT_TYPE: &str = "track";

/// A beacon as received on the wire. Only the `type` discriminator and a
/// handful of envelope fields are understood here; everything else is
/// interpreted by the processor registered for that type.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingEvent(Value);

impl IncomingEvent {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Fills in the envelope defaults: a missing `type` becomes `track`, a
    /// missing `timestamp` becomes `now_millis`, and a missing `clientId` is
    /// taken from the authenticated request. Values that are present are
    /// left untouched so that validation can reject them.
    pub fn with_defaults(mut self, client_id: &str, now_millis: i64) -> Self {
        if let Value::Object(map) = &mut self.0 {
            if map.get("type").map_or(true, Value::is_null) {
                map.insert("type".to_owned(), Value::from(DEFAULT_EVENT_TYPE));
            }
            if map.get("timestamp").map_or(true, Value::is_null) {
                map.insert("timestamp".to_owned(), Value::from(now_millis));
            }
            if map.get("clientId").map_or(true, Value::is_null) {
                map.insert("clientId".to_owned(), Value::from(client_id));
            }
        }
        self
    }

    pub fn event_type(&self) -> &str {
        self.0.get("type").and_then(Value::as_str).unwrap_or_default()
    }

    /// Client-supplied identifier, bounded. Falls back to `payload.eventId`.
    pub fn event_id(&self) -> Option<String> {
        let raw = self
            .0
            .get("eventId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .or_else(|| self.0.pointer("/payload/eventId").and_then(Value::as_str));
        sanitize_string(raw, SHORT_STRING_MAX_LENGTH)
    }

    pub fn has_type(&self, tag: &str) -> bool {
        self.event_type() == tag
    }

    pub fn has_numeric_timestamp(&self) -> bool {
        self.0.get("timestamp").is_some_and(Value::is_number)
    }

    pub fn has_client_id(&self) -> bool {
        self.0
            .get("clientId")
            .and_then(Value::as_str)
            .is_some_and(|id| !id.is_empty())
    }

    pub fn has_payload(&self) -> bool {
        self.0.get("payload").is_some_and(Value::is_object)
    }

    /// Deserializes into a processor's typed view of the event.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.0)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for IncomingEvent {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// Request-scoped facts shared by every event of a request. Built once after
/// validation and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub ip: String,
    pub user_agent: String,
    pub client_id: String,
    pub owner_id: Option<String>,
    pub salt: String,
}
