use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::records::CanonicalRecord;

pub mod clickhouse;
pub mod memory;
pub mod print;
pub mod redis;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error("cache timed out")]
    Timeout,
    #[error("cache error: {0}")]
    Backend(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("failed to insert into {table}: {message}")]
    Insert { table: String, message: String },
    #[error("storage is unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a multi-row insert. Failures are reported, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchInsertResult {
    pub processed: usize,
    pub errors: Vec<String>,
}

impl BatchInsertResult {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            processed: 0,
            errors: vec![message.into()],
        }
    }
}

/// Append-only writer for the analytics store.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn insert(&self, table: &str, record: &CanonicalRecord) -> Result<(), StorageError>;
    async fn insert_batch(&self, table: &str, records: &[CanonicalRecord]) -> BatchInsertResult;
    async fn is_healthy(&self) -> bool;
}

/// Key-value cache with TTLs. `set_nx` must be atomic: it is the only
/// primitive used to arbitrate between concurrent writers.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<(), CacheError>;
    /// Sets the key only if it is absent. Returns false if it already existed.
    async fn set_nx(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool, CacheError>;
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
    async fn del(&self, key: &str) -> Result<(), CacheError>;
    async fn is_healthy(&self) -> bool;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a {kind} provider named {name} is already registered")]
    Duplicate { kind: &'static str, name: String },
    #[error("no {kind} provider is registered")]
    Empty { kind: &'static str },
    #[error("unknown {kind} provider {name}")]
    Unknown { kind: &'static str, name: String },
    #[error("several {kind} providers are registered ({names:?}), one must be selected")]
    Ambiguous {
        kind: &'static str,
        names: Vec<String>,
    },
}

/// Named providers of one kind. Selection is explicit: with several
/// providers registered, asking for "any" is an error.
pub struct ProviderRegistry<P: ?Sized> {
    kind: &'static str,
    providers: Vec<(String, Arc<P>)>,
}

impl<P: ?Sized> ProviderRegistry<P> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            providers: Vec::new(),
        }
    }

    pub fn register(&mut self, name: &str, provider: Arc<P>) -> Result<(), RegistryError> {
        if self.providers.iter().any(|(n, _)| n == name) {
            return Err(RegistryError::Duplicate {
                kind: self.kind,
                name: name.to_owned(),
            });
        }
        self.providers.push((name.to_owned(), provider));
        Ok(())
    }

    pub fn select(&self, name: Option<&str>) -> Result<Arc<P>, RegistryError> {
        match name {
            Some(name) => self
                .providers
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, p)| p.clone())
                .ok_or_else(|| RegistryError::Unknown {
                    kind: self.kind,
                    name: name.to_owned(),
                }),
            None => match self.providers.as_slice() {
                [] => Err(RegistryError::Empty { kind: self.kind }),
                [(_, provider)] => Ok(provider.clone()),
                _ => Err(RegistryError::Ambiguous {
                    kind: self.kind,
                    names: self.names(),
                }),
            },
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|(n, _)| n.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::memory::{MemoryCache, MemoryStorage};
    use super::*;

    #[test]
    fn selects_the_only_provider() {
        let mut registry: ProviderRegistry<dyn StorageProvider> = ProviderRegistry::new("storage");
        registry
            .register("memory", Arc::new(MemoryStorage::default()))
            .unwrap();
        assert_eq!(registry.select(None).unwrap().name(), "memory");
        assert_eq!(registry.select(Some("memory")).unwrap().name(), "memory");
    }

    #[test]
    fn refuses_ambiguous_selection() {
        let mut registry: ProviderRegistry<dyn CacheProvider> = ProviderRegistry::new("cache");
        registry
            .register("a", Arc::new(MemoryCache::default()))
            .unwrap();
        registry
            .register("b", Arc::new(MemoryCache::default()))
            .unwrap();

        assert!(matches!(
            registry.select(None),
            Err(RegistryError::Ambiguous { .. })
        ));
        assert!(registry.select(Some("b")).is_ok());
        assert!(matches!(
            registry.select(Some("c")),
            Err(RegistryError::Unknown { .. })
        ));
    }

    #[test]
    fn refuses_duplicates_and_empty() {
        let mut registry: ProviderRegistry<dyn CacheProvider> = ProviderRegistry::new("cache");
        assert_eq!(
            registry.select(None).err(),
            Some(RegistryError::Empty { kind: "cache" })
        );
        registry
            .register("a", Arc::new(MemoryCache::default()))
            .unwrap();
        assert!(matches!(
            registry.register("a", Arc::new(MemoryCache::default())),
            Err(RegistryError::Duplicate { .. })
        ));
    }

    #[test]
    fn batch_result_success() {
        assert!(BatchInsertResult::default().success());
        assert!(!BatchInsertResult::failed("boom").success());
    }
}
