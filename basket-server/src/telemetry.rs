use std::time::Duration;

use opentelemetry::trace::TraceError;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{BatchConfig, RandomIdGenerator, Sampler, Tracer};
use opentelemetry_sdk::{runtime, Resource};
use tracing::level_filters::LevelFilter;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use basket::config::Config;
use basket::health::VERSION;

const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

fn otlp_tracer(endpoint: &str, config: &Config) -> Result<Tracer, TraceError> {
    let trace_config = opentelemetry_sdk::trace::Config::default()
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
            config.otel_sampling_rate,
        ))))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(Resource::new([
            KeyValue::new("service.name", config.otel_service_name.clone()),
            KeyValue::new("service.version", VERSION),
        ]));

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .with_timeout(EXPORT_TIMEOUT);

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_trace_config(trace_config)
        .with_batch_config(BatchConfig::default())
        .with_exporter(exporter)
        .install_batch(runtime::Tokio)
}

/// Installs the global subscriber. Stdout honours `RUST_LOG` and falls back
/// to `LOG_LEVEL`; spans go to OTLP only when `OTEL_URL` is set. An exporter
/// that fails to start is reported but does not stop the service.
pub fn init(config: &Config) {
    let level = LevelFilter::from_level(config.log_level);

    let stdout = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy(),
    );

    let (otel, otel_error) = match config.otel_url.as_deref().map(|url| otlp_tracer(url, config)) {
        Some(Ok(tracer)) => (Some(OpenTelemetryLayer::new(tracer).with_filter(level)), None),
        Some(Err(err)) => (None, Some(err)),
        None => (None, None),
    };

    tracing_subscriber::registry().with(stdout).with(otel).init();

    if let Some(err) = otel_error {
        tracing::warn!("trace export disabled, the OTLP pipeline failed to start: {}", err);
    }
}

pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}
