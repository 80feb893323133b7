//! Lookup Service
//!
//! Resolves service names to addresses through the shared
//! [`AddressCache`], falling back to the configured [`Resolver`].

use crate::domain::entities::BackendAddress;
use crate::domain::ports::Resolver;
use crate::infrastructure::AddressCache;
use dashmap::DashMap;
use std::sync::Arc;

/// Errors from [`LookupService::resolve`].
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("resolver not found: {0}")]
    ResolverNotFound(String),
    #[error(transparent)]
    Resolver(#[from] anyhow::Error),
}

/// Named resolver implementations.
#[derive(Default)]
pub struct ResolverRegistry {
    resolvers: DashMap<String, Arc<dyn Resolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a resolver under `name`.
    pub fn register(&self, name: impl Into<String>, resolver: Arc<dyn Resolver>) {
        self.resolvers.insert(name.into(), resolver);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Resolver>> {
        self.resolvers.get(name).map(|r| r.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }
}

/// Cached name resolution.
pub struct LookupService {
    cache: AddressCache,
    registry: ResolverRegistry,
    resolver_name: String,
}

impl LookupService {
    pub fn new(cache: AddressCache, registry: ResolverRegistry, resolver_name: String) -> Self {
        Self {
            cache,
            registry,
            resolver_name,
        }
    }

    /// Resolve `name`, serving fresh cache entries without calling the
    /// resolver. Only successful lookups are cached.
    pub async fn resolve(&self, name: &str) -> Result<Vec<BackendAddress>, LookupError> {
        if let Some(cached) = self.cache.get(name) {
            tracing::debug!("lookup: resolving [cache]: {} {:?}", name, cached);
            return Ok(cached);
        }

        let resolver = self.registry.get(&self.resolver_name).ok_or_else(|| {
            tracing::debug!("lookup: resolver not found: {}", self.resolver_name);
            LookupError::ResolverNotFound(self.resolver_name.clone())
        })?;

        let addresses = resolver.lookup(name).await?;
        self.cache.set(name, addresses.clone());
        tracing::debug!("lookup: resolving: {} {:?}", name, addresses);
        Ok(addresses)
    }

    pub fn resolver_name(&self) -> &str {
        &self.resolver_name
    }
}
