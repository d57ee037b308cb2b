use std::net::SocketAddr;
use std::time::Duration;

use envconfig::Envconfig;
use tracing::Level;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "false")]
    pub print_sink: bool,

    #[envconfig(default = "127.0.0.1:4000")]
    pub address: SocketAddr,

    pub redis_url: String,
    #[envconfig(default = "100")]
    pub redis_response_timeout_ms: u64,
    #[envconfig(default = "5000")]
    pub redis_connection_timeout_ms: u64,
    pub redis_key_prefix: Option<String>,

    #[envconfig(nested = true)]
    pub clickhouse: ClickHouseConfig,

    pub database_url: Option<String>,
    pub static_websites: Option<String>, // "<id>=<domain>;<id>=<domain>"
    #[envconfig(default = "60")]
    pub website_cache_ttl_seconds: u64,

    pub usage_check_url: Option<String>,
    pub usage_check_secret: Option<String>,
    #[envconfig(default = "1000")]
    pub usage_check_timeout_ms: u64,

    pub geoip_path: Option<String>,

    #[envconfig(default = "1048576")]
    pub payload_max_bytes: usize,
    #[envconfig(default = "100")]
    pub batch_max_size: usize,
    #[envconfig(default = "10000")]
    pub request_timeout_ms: u64,

    // Required when more than one provider of a kind is available
    pub storage_provider: Option<String>,
    pub cache_provider: Option<String>,

    // Used for integration tests
    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    pub otel_url: Option<String>,
    #[envconfig(default = "1.0")]
    pub otel_sampling_rate: f64,
    #[envconfig(default = "basket")]
    pub otel_service_name: String,

    #[envconfig(default = "info")]
    pub log_level: Level,
}

#[derive(Envconfig, Clone)]
pub struct ClickHouseConfig {
    #[envconfig(default = "http://localhost:8123")]
    pub clickhouse_url: String,
    #[envconfig(default = "analytics")]
    pub clickhouse_database: String,
    #[envconfig(default = "default")]
    pub clickhouse_user: String,
    #[envconfig(default = "")]
    pub clickhouse_password: String,
    #[envconfig(default = "true")]
    pub clickhouse_async_insert: bool,
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
