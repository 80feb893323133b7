//! Config Store Port
//!
//! Defines the interface to a distributed key-value store that holds
//! backend lists. Implementations speak the Consul KV and etcd v2 APIs.

use crate::domain::entities::StoreScheme;
use async_trait::async_trait;
use std::sync::Arc;

/// Client for a watched key-value store.
///
/// Each implementation keeps its own watch cursor, so a single instance
/// must only be watched from one loop at a time.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Values of all children under `path`, in store order.
    async fn list(&self, path: &str) -> anyhow::Result<Vec<String>>;

    /// The value stored at `path`. A missing key is an empty string.
    async fn get(&self, path: &str) -> anyhow::Result<String>;

    /// Block until `path` (or anything below it) changes, or until the
    /// store's own long-poll timeout elapses.
    ///
    /// On success the cursor advances past the observed index.
    async fn watch(&self, path: &str) -> anyhow::Result<()>;
}

/// Opens a [`ConfigStore`] client for a scheme named in a backend selector.
pub trait ConfigStoreConnector: Send + Sync {
    /// `endpoint` is the selector URI's `host[:port]`, if it had one.
    fn connect(
        &self,
        scheme: StoreScheme,
        endpoint: Option<&str>,
    ) -> anyhow::Result<Arc<dyn ConfigStore>>;
}
