use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::storage::{CacheProvider, StorageProvider};
use crate::time::TimeSource;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Ok,
    Degraded,
    Unhealthy,
}

impl From<bool> for ServiceStatus {
    fn from(healthy: bool) -> Self {
        if healthy {
            ServiceStatus::Ok
        } else {
            ServiceStatus::Unhealthy
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: ServiceStatus,
    pub version: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct Services {
    pub storage: ServiceStatus,
    pub cache: ServiceStatus,
    pub events: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DetailedHealth {
    pub status: ServiceStatus,
    pub version: &'static str,
    pub timestamp: String,
    pub services: Services,
}

impl IntoResponse for Health {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

impl IntoResponse for DetailedHealth {
    /// 503 as soon as one provider is down, so load balancers can react.
    fn into_response(self) -> Response {
        let code = match self.status {
            ServiceStatus::Ok => StatusCode::OK,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        };
        (code, Json(self)).into_response()
    }
}

/// Reports on the providers the handler depends on.
#[derive(Clone)]
pub struct HealthCheck {
    storage: Arc<dyn StorageProvider>,
    cache: Arc<dyn CacheProvider>,
    events: Vec<String>,
    clock: Arc<dyn TimeSource + Send + Sync>,
}

impl HealthCheck {
    pub fn new(
        storage: Arc<dyn StorageProvider>,
        cache: Arc<dyn CacheProvider>,
        events: Vec<String>,
        clock: Arc<dyn TimeSource + Send + Sync>,
    ) -> Self {
        Self {
            storage,
            cache,
            events,
            clock,
        }
    }

    fn timestamp(&self) -> String {
        let nanos = i128::from(self.clock.now_millis()) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .ok()
            .and_then(|t| t.format(&Rfc3339).ok())
            .unwrap_or_default()
    }

    pub fn basic(&self) -> Health {
        Health {
            status: ServiceStatus::Ok,
            version: VERSION,
            timestamp: self.timestamp(),
        }
    }

    pub async fn detailed(&self) -> DetailedHealth {
        let (storage, cache) = tokio::join!(self.storage.is_healthy(), self.cache.is_healthy());
        let status = if storage && cache {
            ServiceStatus::Ok
        } else {
            ServiceStatus::Degraded
        };

        DetailedHealth {
            status,
            version: VERSION,
            timestamp: self.timestamp(),
            services: Services {
                storage: storage.into(),
                cache: cache.into(),
                events: self.events.clone(),
            },
        }
    }

    /// Logged once at startup. Unhealthy providers only warn: the service
    /// still comes up and reports them as degraded.
    pub async fn log_bootstrap(&self) {
        let report = self.detailed().await;
        info!(
            storage = self.storage.name(),
            storage_healthy = report.services.storage == ServiceStatus::Ok,
            cache = self.cache.name(),
            cache_healthy = report.services.cache == ServiceStatus::Ok,
            event_types = ?report.services.events,
            "bootstrap completed"
        );
        if report.services.storage != ServiceStatus::Ok {
            warn!("storage provider {} is not healthy", self.storage.name());
        }
        if report.services.cache != ServiceStatus::Ok {
            warn!("cache provider {} is not healthy", self.cache.name());
        }
    }
}
