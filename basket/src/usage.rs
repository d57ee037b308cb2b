use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const EVENTS_FEATURE: &str = "events";

/// Billing-side quota check. Implementations record the usage as part of
/// the check.
#[async_trait]
pub trait UsageMeter: Send + Sync {
    async fn allow_event(&self, customer_id: &str) -> bool;
}

/// Used when no metering endpoint is configured.
pub struct Unmetered {}

#[async_trait]
impl UsageMeter for Unmetered {
    async fn allow_event(&self, _customer_id: &str) -> bool {
        true
    }
}

#[derive(Debug, Serialize)]
struct CheckRequest<'a> {
    customer_id: &'a str,
    feature_id: &'a str,
    send_event: bool,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    #[serde(default)]
    allowed: bool,
}

/// Asks the metering service over HTTP. Only an explicit refusal blocks
/// traffic: transport or decoding failures let the event through.
pub struct HttpUsageMeter {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl HttpUsageMeter {
    pub fn new(url: String, secret: Option<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            secret,
        })
    }
}

#[async_trait]
impl UsageMeter for HttpUsageMeter {
    async fn allow_event(&self, customer_id: &str) -> bool {
        let mut request = self.client.post(&self.url).json(&CheckRequest {
            customer_id,
            feature_id: EVENTS_FEATURE,
            send_event: true,
        });
        if let Some(secret) = &self.secret {
            request = request.bearer_auth(secret);
        }

        let response = match request.send().await.and_then(|r| r.error_for_status()) {
            Ok(response) => response,
            Err(err) => {
                warn!(customer_id, "usage check failed, allowing event: {}", err);
                return true;
            }
        };

        match response.json::<CheckResponse>().await {
            Ok(check) => check.allowed,
            Err(err) => {
                warn!(customer_id, "usage check returned garbage, allowing event: {}", err);
                true
            }
        }
    }
}
