//! Name Resolver Port
//!
//! Defines the interface for turning a logical service name into
//! concrete backend addresses.

use crate::domain::entities::BackendAddress;
use async_trait::async_trait;

/// A name-resolution strategy registered under a name in the
/// [`ResolverRegistry`](crate::application::ResolverRegistry).
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `name` to an ordered list of `host:port` addresses.
    ///
    /// An empty list means the name resolved to nothing; an error means
    /// the lookup itself failed.
    async fn lookup(&self, name: &str) -> anyhow::Result<Vec<BackendAddress>>;
}
