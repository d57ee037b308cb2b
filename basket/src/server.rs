use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::dedup::DedupGate;
use crate::enrichment::GeoResolver;
use crate::handler::IngestionHandler;
use crate::health::HealthCheck;
use crate::processors::{ErrorProcessor, ProcessorDeps, TrackProcessor, WebVitalsProcessor};
use crate::registry::EventRegistry;
use crate::router;
use crate::salt::SaltManager;
use crate::storage::clickhouse::ClickHouseStorage;
use crate::storage::print::PrintStorage;
use crate::storage::redis::RedisCache;
use crate::storage::{CacheProvider, ProviderRegistry, StorageProvider};
use crate::tenants::{CachedWebsites, PostgresWebsites, StaticWebsites, WebsiteStore};
use crate::time::{SystemTime, TimeSource};
use crate::usage::{HttpUsageMeter, Unmetered, UsageMeter};
use crate::validation::ValidationService;

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

async fn create_cache(config: &Config) -> anyhow::Result<Arc<dyn CacheProvider>> {
    let redis = RedisCache::new(
        config.redis_url.clone(),
        config.redis_key_prefix.clone(),
        millis(config.redis_response_timeout_ms),
        millis(config.redis_connection_timeout_ms),
    )
    .await
    .context("failed to create redis client")?;

    let mut caches: ProviderRegistry<dyn CacheProvider> = ProviderRegistry::new("cache");
    caches.register("redis", Arc::new(redis))?;
    Ok(caches.select(config.cache_provider.as_deref())?)
}

fn create_storage(config: &Config) -> anyhow::Result<Arc<dyn StorageProvider>> {
    let mut storages: ProviderRegistry<dyn StorageProvider> = ProviderRegistry::new("storage");
    if config.print_sink {
        // Only for local debugging: nothing is persisted
        storages.register("print", Arc::new(PrintStorage {}))?;
    } else {
        storages.register("clickhouse", Arc::new(ClickHouseStorage::new(&config.clickhouse)))?;
    }
    Ok(storages.select(config.storage_provider.as_deref())?)
}

async fn create_websites(config: &Config) -> anyhow::Result<Arc<dyn WebsiteStore>> {
    let inner: Arc<dyn WebsiteStore> = match (&config.static_websites, &config.database_url) {
        (Some(list), _) => {
            let websites: StaticWebsites = list.parse()?;
            info!("serving a static list of websites");
            Arc::new(websites)
        }
        (None, Some(url)) => Arc::new(
            PostgresWebsites::connect(url)
                .await
                .context("failed to connect to the websites database")?,
        ),
        (None, None) => bail!("either DATABASE_URL or STATIC_WEBSITES must be set"),
    };

    Ok(Arc::new(CachedWebsites::new(
        inner,
        Duration::from_secs(config.website_cache_ttl_seconds),
    )))
}

fn create_usage_meter(config: &Config) -> anyhow::Result<Arc<dyn UsageMeter>> {
    match &config.usage_check_url {
        Some(url) => Ok(Arc::new(HttpUsageMeter::new(
            url.clone(),
            config.usage_check_secret.clone(),
            millis(config.usage_check_timeout_ms),
        )?)),
        None => {
            info!("usage metering is disabled");
            Ok(Arc::new(Unmetered {}))
        }
    }
}

fn create_geo(config: &Config) -> anyhow::Result<GeoResolver> {
    match &config.geoip_path {
        Some(path) => GeoResolver::new(PathBuf::from(path)).context("failed to open the GeoIP database"),
        None => {
            info!("geo enrichment is disabled");
            Ok(GeoResolver::disabled())
        }
    }
}

/// Builds every component from the configuration. Any failure here is a
/// bootstrap failure.
pub async fn build(config: &Config) -> anyhow::Result<(Arc<IngestionHandler>, HealthCheck)> {
    let clock: Arc<dyn TimeSource + Send + Sync> = Arc::new(SystemTime {});
    let cache = create_cache(config).await?;
    let storage = create_storage(config)?;

    let deps = ProcessorDeps {
        dedup: Arc::new(DedupGate::new(cache.clone())),
        storage: storage.clone(),
        clock: clock.clone(),
    };
    let mut registry = EventRegistry::new();
    registry.register(Arc::new(TrackProcessor::new(
        deps.clone(),
        Arc::new(create_geo(config)?),
    )));
    registry.register(Arc::new(ErrorProcessor::new(deps.clone())));
    registry.register(Arc::new(WebVitalsProcessor::new(deps)));

    let validation = ValidationService::new(
        create_websites(config).await?,
        create_usage_meter(config)?,
        config.payload_max_bytes,
    );

    let health = HealthCheck::new(
        storage,
        cache.clone(),
        registry.registered_types(),
        clock.clone(),
    );

    let handler = IngestionHandler::new(
        validation,
        registry,
        SaltManager::new(cache, clock.clone()),
        clock,
        config.batch_max_size,
        config.request_timeout(),
    );

    Ok((Arc::new(handler), health))
}

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (handler, health) = build(&config).await?;
    health.log_bootstrap().await;

    let app = router::router(handler, health, config.export_prometheus);

    info!("listening on {:?}", listener.local_addr()?);
    info!("config: log_level == {:?}", config.log_level);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    info!("HTTP server graceful shutdown completed");
    Ok(())
}
