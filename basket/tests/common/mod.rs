#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use basket::dedup::DedupGate;
use basket::enrichment::GeoResolver;
use basket::handler::IngestionHandler;
use basket::health::HealthCheck;
use basket::processors::{ErrorProcessor, ProcessorDeps, TrackProcessor, WebVitalsProcessor};
use basket::registry::EventRegistry;
use basket::router::router;
use basket::salt::SaltManager;
use basket::storage::memory::{MemoryCache, MemoryStorage};
use basket::tenants::StaticWebsites;
use basket::time::{ManualTime, TimeSource};
use basket::usage::Unmetered;
use basket::validation::ValidationService;

pub const CHROME: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const GOOGLEBOT: &str = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
pub const CLIENT_ID: &str = "site-1";
pub const BATCH_MAX_SIZE: usize = 5;

pub struct TestApp {
    pub router: Router,
    pub storage: MemoryStorage,
    pub cache: MemoryCache,
    pub clock: ManualTime,
}

pub fn app() -> TestApp {
    let clock = ManualTime::new(1_700_000_000_000);
    let shared_clock: Arc<dyn TimeSource + Send + Sync> = Arc::new(clock.clone());
    let storage = MemoryStorage::default();
    let cache = MemoryCache::with_clock(clock.clone());

    let deps = ProcessorDeps {
        dedup: Arc::new(DedupGate::new(Arc::new(cache.clone()))),
        storage: Arc::new(storage.clone()),
        clock: shared_clock.clone(),
    };
    let mut registry = EventRegistry::new();
    registry.register(Arc::new(TrackProcessor::new(
        deps.clone(),
        Arc::new(GeoResolver::disabled()),
    )));
    registry.register(Arc::new(ErrorProcessor::new(deps.clone())));
    registry.register(Arc::new(WebVitalsProcessor::new(deps)));

    let websites: StaticWebsites = format!("{CLIENT_ID}=example.com").parse().unwrap();
    let validation = ValidationService::new(Arc::new(websites), Arc::new(Unmetered {}), 64 * 1024);

    let health = HealthCheck::new(
        Arc::new(storage.clone()),
        Arc::new(cache.clone()),
        registry.registered_types(),
        shared_clock.clone(),
    );
    let handler = IngestionHandler::new(
        validation,
        registry,
        SaltManager::new(Arc::new(cache.clone()), shared_clock.clone()),
        shared_clock,
        BATCH_MAX_SIZE,
        Duration::from_secs(5),
    );

    TestApp {
        router: router(Arc::new(handler), health, false),
        storage,
        cache,
        clock,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    pub async fn post(&self, uri: &str, body: &str) -> Value {
        self.post_with(uri, body, &[]).await
    }

    pub async fn post_with(&self, uri: &str, body: &str, headers: &[(&str, &str)]) -> Value {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", "203.0.113.9");
        if !headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("user-agent")) {
            request = request.header(header::USER_AGENT, CHROME);
        }
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let (status, body) = self
            .send(request.body(Body::from(body.to_owned())).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }
}
