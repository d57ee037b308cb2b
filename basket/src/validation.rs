use std::sync::Arc;

use axum::http::{header, HeaderMap};
use metrics::counter;
use tracing::{error, warn};

use crate::api::Rejection;
use crate::enrichment::detect_bot;
use crate::origin::is_valid_origin;
use crate::sanitize::{sanitize_string, SHORT_STRING_MAX_LENGTH, STRING_MAX_LENGTH};
use crate::tenants::WebsiteStore;
use crate::usage::UsageMeter;

/// What the validator needs to know about a request.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub client_id: Option<String>,
    pub headers: HeaderMap,
    pub ip: String,
    pub body_len: usize,
}

/// The authenticated identity of a request that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub client_id: String,
    pub user_agent: String,
    pub ip: String,
    pub owner_id: Option<String>,
}

pub struct ValidationService {
    websites: Arc<dyn WebsiteStore>,
    usage: Arc<dyn UsageMeter>,
    payload_max_bytes: usize,
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

impl ValidationService {
    pub fn new(
        websites: Arc<dyn WebsiteStore>,
        usage: Arc<dyn UsageMeter>,
        payload_max_bytes: usize,
    ) -> Self {
        Self {
            websites,
            usage,
            payload_max_bytes,
        }
    }

    /// Runs the request-level checks in order, stopping at the first failure:
    /// payload size, client id, tenant, usage, origin, bots.
    pub async fn validate(&self, request: &IngestRequest) -> Result<AuthContext, Rejection> {
        if request.body_len > self.payload_max_bytes {
            return Err(self.blocked(Rejection::PayloadTooLarge, None));
        }

        let Some(client_id) = sanitize_string(request.client_id.as_deref(), SHORT_STRING_MAX_LENGTH)
        else {
            return Err(self.blocked(Rejection::MissingClientId, None));
        };

        let website = match self.websites.get_website(&client_id).await {
            Ok(Some(website)) if website.is_active() => website,
            Ok(_) => return Err(self.blocked(Rejection::InvalidClientId, Some(&client_id))),
            Err(err) => {
                error!(client_id, "website lookup failed: {}", err);
                return Err(self.blocked(Rejection::InvalidClientId, Some(&client_id)));
            }
        };

        if let Some(owner_id) = &website.owner_id {
            if !self.usage.allow_event(owner_id).await {
                return Err(self.blocked(Rejection::ExceededEventLimit, Some(&client_id)));
            }
        }

        if let Some(origin) = header_str(&request.headers, header::ORIGIN) {
            if !origin.trim().is_empty() && !is_valid_origin(origin, &website.domain) {
                return Err(self.blocked(Rejection::OriginNotAuthorized, Some(&client_id)));
            }
        }

        let user_agent = sanitize_string(
            header_str(&request.headers, header::USER_AGENT),
            STRING_MAX_LENGTH,
        )
        .unwrap_or_default();

        let bot = detect_bot(&user_agent, &request.headers);
        if bot.is_bot {
            let rejection = Rejection::Bot {
                reason: bot.reason.unwrap_or_else(|| "unknown_bot".to_owned()),
                category: bot
                    .category
                    .unwrap_or_else(|| crate::api::CATEGORY_BOT.to_owned()),
                bot_name: bot.bot_name,
            };
            return Err(self.blocked(rejection, Some(&client_id)));
        }

        Ok(AuthContext {
            client_id,
            user_agent,
            ip: request.ip.clone(),
            owner_id: website.owner_id,
        })
    }

    fn blocked(&self, rejection: Rejection, client_id: Option<&str>) -> Rejection {
        warn!(
            reason = rejection.reason(),
            category = rejection.category(),
            client_id,
            bot_name = rejection.bot_name(),
            "blocked traffic"
        );
        counter!(
            "basket_requests_blocked_total",
            "reason" => rejection.reason().to_owned(),
            "category" => rejection.category().to_owned(),
        )
        .increment(1);
        rejection
    }
}
