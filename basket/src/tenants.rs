use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TenantError {
    #[error("website lookup failed: {0}")]
    Lookup(String),
    #[error("invalid static website list: {0}")]
    InvalidStaticList(String),
}

impl From<sqlx::Error> for TenantError {
    fn from(err: sqlx::Error) -> Self {
        TenantError::Lookup(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebsiteStatus {
    Active,
    Inactive,
    Pending,
}

impl FromStr for WebsiteStatus {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            "PENDING" => Ok(Self::Pending),
            other => Err(TenantError::Lookup(format!("unknown website status {other}"))),
        }
    }
}

/// A tenant, as far as ingestion is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Website {
    pub id: String,
    pub domain: String,
    pub status: WebsiteStatus,
    /// Billing owner, checked against usage limits when present
    pub owner_id: Option<String>,
    pub organization_id: Option<String>,
}

impl Website {
    pub fn is_active(&self) -> bool {
        self.status == WebsiteStatus::Active
    }
}

#[async_trait]
pub trait WebsiteStore: Send + Sync {
    async fn get_website(&self, id: &str) -> Result<Option<Website>, TenantError>;
}

/// Websites read from the provisioning database.
pub struct PostgresWebsites {
    pool: PgPool,
}

impl PostgresWebsites {
    pub async fn connect(url: &str) -> Result<Self, TenantError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl WebsiteStore for PostgresWebsites {
    #[instrument(skip(self))]
    async fn get_website(&self, id: &str) -> Result<Option<Website>, TenantError> {
        let row = sqlx::query(
            "SELECT id, domain, status::text AS status, user_id, organization_id FROM websites WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.try_get("status")?;
        Ok(Some(Website {
            id: row.try_get("id")?,
            domain: row.try_get("domain")?,
            status: status.parse()?,
            owner_id: row.try_get("user_id")?,
            organization_id: row.try_get("organization_id")?,
        }))
    }
}

/// A fixed set of active websites, for local runs without a database.
/// Parsed from `id=domain;id=domain`.
#[derive(Debug, Clone, Default)]
pub struct StaticWebsites {
    websites: HashMap<String, Website>,
}

impl StaticWebsites {
    pub fn insert(&mut self, website: Website) {
        self.websites.insert(website.id.clone(), website);
    }
}

impl FromStr for StaticWebsites {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut websites = StaticWebsites::default();
        for entry in s.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (id, domain) = entry
                .split_once('=')
                .ok_or_else(|| TenantError::InvalidStaticList(entry.to_owned()))?;
            let (id, domain) = (id.trim(), domain.trim());
            if id.is_empty() || domain.is_empty() {
                return Err(TenantError::InvalidStaticList(entry.to_owned()));
            }
            websites.insert(Website {
                id: id.to_owned(),
                domain: domain.to_owned(),
                status: WebsiteStatus::Active,
                owner_id: None,
                organization_id: None,
            });
        }
        Ok(websites)
    }
}

#[async_trait]
impl WebsiteStore for StaticWebsites {
    async fn get_website(&self, id: &str) -> Result<Option<Website>, TenantError> {
        Ok(self.websites.get(id).cloned())
    }
}

/// Keeps lookups, misses included, in process for a short while. Errors are
/// not cached.
pub struct CachedWebsites {
    inner: Arc<dyn WebsiteStore>,
    cache: Cache<String, Option<Website>>,
}

impl CachedWebsites {
    pub fn new(inner: Arc<dyn WebsiteStore>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(100_000)
                .build(),
        }
    }
}

#[async_trait]
impl WebsiteStore for CachedWebsites {
    async fn get_website(&self, id: &str) -> Result<Option<Website>, TenantError> {
        if let Some(hit) = self.cache.get(id).await {
            return Ok(hit);
        }
        let website = self.inner.get_website(id).await?;
        self.cache.insert(id.to_owned(), website.clone()).await;
        Ok(website)
    }
}
