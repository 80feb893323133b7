//! etcd v2 Store
//!
//! Implements ConfigStore over etcd's v2 keys API. Watches are long
//! polls on `?wait=true&waitIndex=<n>`.

use crate::domain::ports::ConfigStore;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Endpoint used when the selector URI has no host.
pub const DEFAULT_ETCD_ENDPOINT: &str = "http://127.0.0.1:2379";

const INDEX_HEADER: &str = "X-Etcd-Index";

/// "The event in requested index is outdated and cleared".
const EVENT_INDEX_CLEARED: u64 = 401;

/// Error body of a non-2xx keys response.
#[derive(Debug, Deserialize)]
struct EtcdError {
    #[serde(rename = "errorCode")]
    error_code: u64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    index: u64,
}

#[derive(Debug, Deserialize)]
struct KeysResponse {
    node: Option<Node>,
}

#[derive(Debug, Default, Deserialize)]
struct Node {
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    dir: bool,
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default, rename = "modifiedIndex")]
    modified_index: u64,
}

/// etcd-backed config store.
pub struct EtcdStore {
    client: reqwest::Client,
    base_url: String,
    wait_index: AtomicU64,
}

impl EtcdStore {
    /// `address` is `host[:port]` (or a full `http(s)://` URL).
    pub fn new(client: reqwest::Client, address: Option<&str>) -> Self {
        let base_url = match address {
            None => DEFAULT_ETCD_ENDPOINT.to_string(),
            Some(a) if a.starts_with("http://") || a.starts_with("https://") => {
                a.trim_end_matches('/').to_string()
            }
            Some(a) => format!("http://{}", a),
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

    /// Index the next `watch` waits from (0 means "from now").
    pub fn wait_index(&self) -> u64 {
        self.wait_index.load(Ordering::SeqCst)
    }

    fn keys_url(&self, path: &str) -> String {
        format!("{}/v2/keys/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET a key. A missing key (etcd error 100) is `None`.
    async fn fetch(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> anyhow::Result<(Option<Node>, Option<u64>)> {
        let response = self
            .client
            .get(self.keys_url(path))
            .query(query)
            .send()
            .await?;

        let index = response
            .headers()
            .get(INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        if response.status() == StatusCode::NOT_FOUND {
            return Ok((None, index));
        }
        if !response.status().is_success() {
            let status = response.status();
            let Ok(err) = response.json::<EtcdError>().await else {
                anyhow::bail!("etcd: {}", status);
            };
            if err.error_code == EVENT_INDEX_CLEARED {
                // History behind the cursor is gone; restart from the current index.
                let current = index.or(Some(err.index).filter(|i| *i > 0));
                self.wait_index
                    .store(current.map_or(0, |i| i + 1), Ordering::SeqCst);
            }
            anyhow::bail!("etcd: {} - {} ({})", status, err.message, err.error_code);
        }

        let body: KeysResponse = response.json().await?;
        Ok((body.node, index))
    }
}

#[async_trait]
impl ConfigStore for EtcdStore {
    /// Values of the directory's children. A plain key has no children,
    /// so it lists as empty and the caller falls back to `get`.
    async fn list(&self, path: &str) -> anyhow::Result<Vec<String>> {
        let (node, _) = self.fetch(path, &[("recursive", "true".to_string())]).await?;
        let Some(node) = node else {
            return Ok(Vec::new());
        };
        if !node.dir {
            return Ok(Vec::new());
        }
        Ok(node
            .nodes
            .into_iter()
            .filter_map(|child| child.value)
            .collect())
    }

    async fn get(&self, path: &str) -> anyhow::Result<String> {
        let (node, _) = self.fetch(path, &[]).await?;
        Ok(node.and_then(|n| n.value).unwrap_or_default())
    }

    async fn watch(&self, path: &str) -> anyhow::Result<()> {
        let mut query = vec![
            ("wait", "true".to_string()),
            ("recursive", "true".to_string()),
        ];
        let index = self.wait_index.load(Ordering::SeqCst);
        if index > 0 {
            query.push(("waitIndex", index.to_string()));
        }

        let (node, etcd_index) = self.fetch(path, &query).await?;
        // Prefer the index of the change itself; the header only says
        // where the cluster was when the watch started.
        let seen = node
            .map(|n| n.modified_index)
            .filter(|i| *i > 0)
            .or(etcd_index);
        if let Some(seen) = seen {
            self.wait_index.store(seen + 1, Ordering::SeqCst);
        }
        Ok(())
    }
}
