use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
    Ignored,
}

/// Body returned for both the single-event and the batch endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IngestResponse {
    pub status: ResponseStatus,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<EventResult>>,
}

impl IngestResponse {
    pub fn success(event_type: &str) -> Self {
        Self {
            status: ResponseStatus::Success,
            event_type: Some(event_type.to_owned()),
            message: None,
            batch: None,
            processed: None,
            results: None,
        }
    }

    pub fn failure(status: ResponseStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            event_type: None,
            message: Some(message.into()),
            batch: None,
            processed: None,
            results: None,
        }
    }

    pub fn batch(results: Vec<EventResult>) -> Self {
        Self {
            status: ResponseStatus::Success,
            event_type: None,
            message: None,
            batch: Some(true),
            processed: Some(results.len()),
            results: Some(results),
        }
    }

    pub fn in_batch(mut self) -> Self {
        self.batch = Some(true);
        self
    }
}

impl IntoResponse for IngestResponse {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Outcome of dispatching one event. Never an exception: every failure mode
/// of the pipeline ends up here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResult {
    pub success: bool,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

impl EventResult {
    pub fn ok(event_type: &str, event_id: Option<String>) -> Self {
        Self {
            success: true,
            event_type: event_type.to_owned(),
            event_id,
            error: None,
            duplicate: false,
        }
    }

    pub fn duplicate(event_type: &str, event_id: Option<String>) -> Self {
        Self {
            duplicate: true,
            ..Self::ok(event_type, event_id)
        }
    }

    pub fn failed(event_type: &str, event_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            event_type: event_type.to_owned(),
            event_id,
            error: Some(error.into()),
            duplicate: false,
        }
    }
}

pub const CATEGORY_VALIDATION: &str = "Validation Error";
pub const CATEGORY_SECURITY: &str = "Security Check";
pub const CATEGORY_BOT: &str = "Bot Detection";

/// Why a request was turned away before any event was dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    PayloadTooLarge,
    MissingClientId,
    InvalidClientId,
    ExceededEventLimit,
    OriginNotAuthorized,
    Bot {
        reason: String,
        category: String,
        bot_name: Option<String>,
    },
}

impl Rejection {
    pub fn reason(&self) -> &str {
        match self {
            Self::PayloadTooLarge => "payload_too_large",
            Self::MissingClientId => "missing_client_id",
            Self::InvalidClientId => "invalid_client_id",
            Self::ExceededEventLimit => "exceeded_event_limit",
            Self::OriginNotAuthorized => "origin_not_authorized",
            Self::Bot { reason, .. } => reason,
        }
    }

    pub fn category(&self) -> &str {
        match self {
            Self::OriginNotAuthorized => CATEGORY_SECURITY,
            Self::Bot { category, .. } => category,
            _ => CATEGORY_VALIDATION,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::PayloadTooLarge => "Payload too large",
            Self::MissingClientId => "Missing client ID",
            Self::InvalidClientId => "Invalid or inactive client ID",
            Self::ExceededEventLimit => "Exceeded event limit",
            Self::OriginNotAuthorized => "Origin not authorized",
            Self::Bot { .. } => "Bot detected",
        }
    }

    /// Bots are ignored rather than failed, so SDKs do not retry them.
    pub fn status(&self) -> ResponseStatus {
        match self {
            Self::Bot { .. } => ResponseStatus::Ignored,
            _ => ResponseStatus::Error,
        }
    }

    pub fn bot_name(&self) -> Option<&str> {
        match self {
            Self::Bot { bot_name, .. } => bot_name.as_deref(),
            _ => None,
        }
    }
}

impl From<Rejection> for IngestResponse {
    fn from(rejection: Rejection) -> Self {
        IngestResponse::failure(rejection.status(), rejection.message())
    }
}
