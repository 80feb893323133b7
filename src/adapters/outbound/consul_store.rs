//! Consul KV Store
//!
//! Implements ConfigStore over Consul's HTTP KV API. Watches use
//! blocking queries: `?index=<n>` parks the request until the key's
//! modify index moves past `n`.
//!
//! See: https://developer.hashicorp.com/consul/api-docs/kv

use crate::domain::ports::ConfigStore;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Agent address used when the selector URI has no host.
pub const DEFAULT_CONSUL_ADDRESS: &str = "127.0.0.1:8500";

const INDEX_HEADER: &str = "X-Consul-Index";

/// One entry of a `/v1/kv` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KvPair {
    key: String,
    /// Base64 encoded; null for keys created without a value.
    value: Option<String>,
}

impl KvPair {
    fn decoded(&self) -> Option<String> {
        let raw = self.value.as_deref()?;
        match STANDARD.decode(raw) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                tracing::warn!("consul: undecodable value for {}: {}", self.key, e);
                None
            }
        }
    }
}

/// Consul-backed config store.
pub struct ConsulStore {
    client: reqwest::Client,
    base_url: String,
    wait_index: AtomicU64,
}

impl ConsulStore {
    /// `address` is `host[:port]` (or a full `http(s)://` URL).
    pub fn new(client: reqwest::Client, address: Option<&str>) -> Self {
        let address = address.unwrap_or(DEFAULT_CONSUL_ADDRESS);
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", address)
        };
        Self {
            client,
            base_url,
            wait_index: AtomicU64::new(0),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Last index observed by `watch`.
    pub fn wait_index(&self) -> u64 {
        self.wait_index.load(Ordering::SeqCst)
    }

    fn kv_url(&self, path: &str) -> String {
        format!("{}/v1/kv/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET a KV path. A missing key is an empty list, not an error.
    async fn fetch(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> anyhow::Result<(Vec<KvPair>, Option<u64>)> {
        let response = self
            .client
            .get(self.kv_url(path))
            .query(query)
            .send()
            .await?;

        let index = response
            .headers()
            .get(INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        if response.status() == StatusCode::NOT_FOUND {
            return Ok((Vec::new(), index));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("consul: {} - {}", status, body);
        }

        let pairs: Vec<KvPair> = response.json().await?;
        Ok((pairs, index))
    }
}

#[async_trait]
impl ConfigStore for ConsulStore {
    /// Values of the keys below `path`. A recursive read of a plain key
    /// returns that key itself; it is skipped so a single comma-separated
    /// value lists as empty and the caller falls back to `get`.
    async fn list(&self, path: &str) -> anyhow::Result<Vec<String>> {
        let (pairs, _) = self.fetch(path, &[("recurse", "true".to_string())]).await?;
        let own_key = path.trim_matches('/');
        Ok(pairs
            .iter()
            .filter(|pair| pair.key.trim_end_matches('/') != own_key)
            .filter_map(KvPair::decoded)
            .collect())
    }

    async fn get(&self, path: &str) -> anyhow::Result<String> {
        let (pairs, _) = self.fetch(path, &[]).await?;
        Ok(pairs
            .first()
            .and_then(KvPair::decoded)
            .unwrap_or_default())
    }

    async fn watch(&self, path: &str) -> anyhow::Result<()> {
        let index = self.wait_index.load(Ordering::SeqCst);
        let (_, last_index) = self.fetch(path, &[("index", index.to_string())]).await?;
        if let Some(last_index) = last_index {
            self.wait_index.store(last_index, Ordering::SeqCst);
        }
        Ok(())
    }
}
