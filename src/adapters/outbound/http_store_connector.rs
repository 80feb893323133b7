//! HTTP Store Connector
//!
//! Opens Consul or etcd clients for `consul://` and `etcd://` selectors,
//! sharing one HTTP connection pool.

use super::{ConsulStore, EtcdStore};
use crate::domain::entities::StoreScheme;
use crate::domain::ports::{ConfigStore, ConfigStoreConnector};
use std::sync::Arc;

pub struct HttpStoreConnector {
    client: reqwest::Client,
}

impl HttpStoreConnector {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ConfigStoreConnector for HttpStoreConnector {
    fn connect(
        &self,
        scheme: StoreScheme,
        endpoint: Option<&str>,
    ) -> anyhow::Result<Arc<dyn ConfigStore>> {
        if let Some(endpoint) = endpoint {
            if endpoint.contains('/') || endpoint.trim().is_empty() {
                anyhow::bail!("invalid {} endpoint: {:?}", scheme, endpoint);
            }
        }
        let store: Arc<dyn ConfigStore> = match scheme {
            StoreScheme::Consul => Arc::new(ConsulStore::new(self.client.clone(), endpoint)),
            StoreScheme::Etcd => Arc::new(EtcdStore::new(self.client.clone(), endpoint)),
        };
        tracing::debug!("{}: connected to {}", scheme, endpoint.unwrap_or("default endpoint"));
        Ok(store)
    }
}
