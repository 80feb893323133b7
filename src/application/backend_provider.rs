//! Backend Providers
//!
//! Strategies that pick a relay target for each accepted connection.
//! A provider is built once from a selector string (see
//! [`ProviderFactory::build`]) and lives for the whole process.
//!
//! Providers never fail a lookup loudly: every internal error is logged
//! and surfaces as `None`, which makes the server drop that connection.

use crate::application::lookup_service::LookupService;
use crate::domain::entities::{
    normalize_address, split_host_port, BackendAddress, OmniKey, StoreScheme,
};
use crate::domain::ports::{
    BackendInspector, ConfigStore, ConfigStoreConnector, OriginalDestination,
};
use crate::infrastructure::{LruCache, Weighted};
use parking_lot::Mutex;
use reqwest::Url;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

/// Future returned by [`BackendProvider::next_backend`].
pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Option<BackendAddress>> + Send + 'a>>;

/// Errors building a provider from a selector string.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("empty backend selector")]
    EmptySelector,
    #[error("unrecognized config store backend: {0}")]
    UnknownStoreScheme(String),
    #[error("invalid config store endpoint: {0}")]
    InvalidStoreEndpoint(String),
}

/// How a selector string is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Explicit `host:port` list, round-robined.
    Fixed(Vec<BackendAddress>),
    /// Config-store URI such as `consul://10.0.0.5:8500/services/web`.
    Store {
        scheme: StoreScheme,
        endpoint: Option<String>,
        path: String,
    },
    /// Bare name resolved per connection.
    Srv(String),
}

impl Selector {
    /// Classify a non-empty selector.
    ///
    /// Two or more comma-separated entries are a fixed list. A single
    /// `scheme://host/path` token names a config store, and an unknown
    /// scheme is an error. A token without a usable port is a service name.
    /// Anything else is a single fixed address.
    pub fn parse(input: &str) -> Result<Self, ProviderError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ProviderError::EmptySelector);
        }

        let parts: Vec<&str> = input.split(',').collect();
        if parts.len() > 1 {
            return Ok(Selector::Fixed(
                parts.iter().map(|p| p.trim().to_string()).collect(),
            ));
        }

        if let Ok(url) = Url::parse(input) {
            let path = url.path();
            // `host:port` parses as an opaque URL; only hierarchical ones count
            if !url.cannot_be_a_base() && !path.is_empty() {
                let scheme = StoreScheme::from_scheme(url.scheme())
                    .ok_or_else(|| ProviderError::UnknownStoreScheme(url.scheme().to_string()))?;
                let endpoint = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .map(|host| match url.port() {
                        Some(port) => format!("{}:{}", host, port),
                        None => host.to_string(),
                    });
                return Ok(Selector::Store {
                    scheme,
                    endpoint,
                    path: path.to_string(),
                });
            }
        }

        if split_host_port(input).is_none() {
            Ok(Selector::Srv(input.to_string()))
        } else {
            Ok(Selector::Fixed(vec![input.to_string()]))
        }
    }
}

/// The resolution strategies.
pub enum BackendProvider {
    Fixed(FixedBackends),
    Srv(SrvBackends),
    ConfigStore(ConfigBackends),
    Omni(OmniBackends),
}

impl BackendProvider {
    /// Pick the backend for `conn`, or `None` if there is none right now.
    pub fn next_backend<'a>(&'a self, conn: &'a TcpStream) -> BackendFuture<'a> {
        Box::pin(async move {
            match self {
                BackendProvider::Fixed(b) => b.next(),
                BackendProvider::Srv(b) => b.next().await,
                BackendProvider::ConfigStore(b) => b.next(),
                BackendProvider::Omni(b) => b.next_backend(conn).await,
            }
        })
    }
}

impl fmt::Display for BackendProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendProvider::Fixed(b) => fmt::Display::fmt(b, f),
            BackendProvider::Srv(b) => f.write_str(&b.name),
            BackendProvider::ConfigStore(b) => write!(f, "{} {}", b.scheme, b.path),
            BackendProvider::Omni(_) => f.write_str("omnimode"),
        }
    }
}

// ===== Fixed =====

/// Round-robin over an immutable address list.
#[derive(Debug, Default)]
pub struct FixedBackends {
    backends: Vec<BackendAddress>,
    counter: AtomicU64,
}

impl FixedBackends {
    /// Build from raw entries. Entries are trimmed, named ports are
    /// rewritten to numbers, and blank entries are dropped.
    pub fn new<I, S>(backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let backends = backends
            .into_iter()
            .map(|b| normalize_address(b.as_ref()))
            .filter(|b| !b.is_empty())
            .collect();
        Self {
            backends,
            counter: AtomicU64::new(0),
        }
    }

    /// Next address in rotation. The counter is pre-incremented, so the
    /// first call returns the entry at index 1 (mod len).
    pub fn next(&self) -> Option<BackendAddress> {
        if self.backends.is_empty() {
            return None;
        }
        let n = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let idx = (n % self.backends.len() as u64) as usize;
        Some(self.backends[idx].clone())
    }

    pub fn backends(&self) -> &[BackendAddress] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl fmt::Display for FixedBackends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.backends.join(", "))
    }
}

// ===== SRV =====

/// A service name resolved on every connection.
///
/// There is no caching here; the lookup service's cache absorbs repeated
/// queries for the same name.
pub struct SrvBackends {
    name: String,
    lookup: Arc<LookupService>,
}

impl SrvBackends {
    pub fn new(name: impl Into<String>, lookup: Arc<LookupService>) -> Self {
        Self {
            name: name.into(),
            lookup,
        }
    }

    /// First resolved address for the service.
    pub async fn next(&self) -> Option<BackendAddress> {
        match self.lookup.resolve(&self.name).await {
            Ok(addrs) => {
                let first = addrs.into_iter().next();
                if first.is_none() {
                    tracing::warn!("dns: no records for {}", self.name);
                }
                first
            }
            Err(e) => {
                tracing::warn!("dns: {}: {}", self.name, e);
                None
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

// ===== Config store =====

/// Backends kept in a watched config store.
///
/// The current list lives behind a mutex. The watch task refetches the
/// list outside the lock and only takes it to swap the new list in.
/// Readers hold it for the round-robin pick alone.
pub struct ConfigBackends {
    scheme: StoreScheme,
    path: String,
    store: Arc<dyn ConfigStore>,
    current: Arc<Mutex<FixedBackends>>,
    watcher: Option<JoinHandle<()>>,
}

impl ConfigBackends {
    /// Create the provider, load the initial list, and start watching.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start(scheme: StoreScheme, path: String, store: Arc<dyn ConfigStore>) -> Self {
        let current = Arc::new(Mutex::new(FixedBackends::default()));
        Self::refresh(store.as_ref(), &path, &current).await;

        let watcher = tokio::spawn(Self::watch_to_update(
            store.clone(),
            path.clone(),
            current.clone(),
        ));

        Self {
            scheme,
            path,
            store,
            current,
            watcher: Some(watcher),
        }
    }

    /// Fetch the backend list from the store.
    ///
    /// Prefers one key per backend (`list`); when that yields nothing,
    /// falls back to a single comma-separated value (`get`).
    pub async fn fetch(store: &dyn ConfigStore, path: &str) -> Vec<BackendAddress> {
        let listed = match store.list(path).await {
            Ok(values) => values,
            Err(e) => {
                tracing::error!("configstore: list {} failed: {:?}", path, e);
                Vec::new()
            }
        };
        if !listed.is_empty() {
            return listed;
        }

        match store.get(path).await {
            Ok(value) => value.split(',').map(str::to_string).collect(),
            Err(e) => {
                tracing::error!("configstore: get {} failed: {:?}", path, e);
                Vec::new()
            }
        }
    }

    async fn refresh(store: &dyn ConfigStore, path: &str, current: &Mutex<FixedBackends>) {
        let backends = FixedBackends::new(Self::fetch(store, path).await);
        tracing::info!("configstore: {}", backends);
        *current.lock() = backends;
    }

    /// Refetch now, outside the watch cadence.
    pub async fn update(&self) {
        Self::refresh(self.store.as_ref(), &self.path, &self.current).await;
    }

    async fn watch_to_update(
        store: Arc<dyn ConfigStore>,
        path: String,
        current: Arc<Mutex<FixedBackends>>,
    ) {
        loop {
            if let Err(e) = store.watch(&path).await {
                tracing::warn!("configstore: watch {} failed: {:?}", path, e);
            }
            Self::refresh(store.as_ref(), &path, &current).await;
        }
    }

    pub fn next(&self) -> Option<BackendAddress> {
        self.current.lock().next()
    }

    /// A copy of the current list.
    pub fn snapshot(&self) -> Vec<BackendAddress> {
        self.current.lock().backends().to_vec()
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for ConfigBackends {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

// ===== Omni =====

#[derive(Clone, Default)]
struct ProviderSlot(Arc<OnceCell<Arc<BackendProvider>>>);

impl Weighted for ProviderSlot {
    fn weight(&self) -> usize {
        1
    }
}

/// Per-connection dispatch for transparently redirected traffic.
///
/// Each `(source IP, original port)` pair gets its own nested provider,
/// built from whatever selector the [`BackendInspector`] reports for it.
/// The registry lock covers only the slot lookup; inspection and the
/// nested lookup run outside it. A per-key `OnceCell` makes sure a key
/// is inspected once even when connections race.
pub struct OmniBackends {
    factory: Arc<ProviderFactory>,
    inspector: Arc<dyn BackendInspector>,
    original_dst: Arc<dyn OriginalDestination>,
    registry: Mutex<LruCache<OmniKey, ProviderSlot>>,
}

impl OmniBackends {
    /// `max_providers` bounds the registry with LRU eviction; `None`
    /// keeps every provider for the life of the process.
    pub fn new(
        factory: Arc<ProviderFactory>,
        inspector: Arc<dyn BackendInspector>,
        original_dst: Arc<dyn OriginalDestination>,
        max_providers: Option<usize>,
    ) -> Self {
        Self {
            factory,
            inspector,
            original_dst,
            registry: Mutex::new(LruCache::new(max_providers.unwrap_or(usize::MAX))),
        }
    }

    pub async fn next_backend(&self, conn: &TcpStream) -> Option<BackendAddress> {
        let source_ip = match conn.peer_addr() {
            Ok(addr) => addr.ip().to_canonical(),
            Err(e) => {
                tracing::warn!("omni: unable to determine peer address: {}", e);
                return None;
            }
        };
        let dest_port = match self.original_dst.destination_port(conn) {
            Ok(port) => port,
            Err(e) => {
                tracing::warn!("omni: unable to determine destination port: {}", e);
                return None;
            }
        };

        let provider = self.lookup_provider(OmniKey::new(source_ip, dest_port)).await?;
        provider.next_backend(conn).await
    }

    async fn lookup_provider(&self, key: OmniKey) -> Option<Arc<BackendProvider>> {
        let slot = {
            let mut registry = self.registry.lock();
            let existing = registry.get(&key).cloned();
            match existing {
                Some(slot) => slot,
                None => {
                    let slot = ProviderSlot::default();
                    registry.insert(key, slot.clone());
                    slot
                }
            }
        };

        let result = slot
            .0
            .get_or_try_init(|| async move {
                let name = self
                    .inspector
                    .backend_name(key.source_ip, key.dest_port)
                    .await?;
                let provider = self.factory.build(&name).await?;
                tracing::info!("omni: {} -> {}", key, provider);
                Ok::<_, anyhow::Error>(Arc::new(provider))
            })
            .await;

        match result {
            Ok(provider) => Some(provider.clone()),
            Err(e) => {
                tracing::warn!("omni: {}: {:#}", key, e);
                None
            }
        }
    }

    /// Number of registered `(source IP, port)` providers, including ones
    /// whose inspection has not succeeded yet.
    pub fn registered(&self) -> usize {
        self.registry.lock().len()
    }
}

// ===== Construction =====

/// Builds providers from selector strings.
pub struct ProviderFactory {
    lookup: Arc<LookupService>,
    stores: Arc<dyn ConfigStoreConnector>,
}

impl ProviderFactory {
    pub fn new(lookup: Arc<LookupService>, stores: Arc<dyn ConfigStoreConnector>) -> Self {
        Self { lookup, stores }
    }

    /// Build a provider for a non-empty selector.
    ///
    /// Config-store providers load their initial list and start their
    /// watch loop before this returns.
    pub async fn build(&self, selector: &str) -> Result<BackendProvider, ProviderError> {
        match Selector::parse(selector)? {
            Selector::Fixed(list) => Ok(BackendProvider::Fixed(FixedBackends::new(list))),
            Selector::Srv(name) => Ok(BackendProvider::Srv(SrvBackends::new(
                name,
                self.lookup.clone(),
            ))),
            Selector::Store {
                scheme,
                endpoint,
                path,
            } => {
                let store = self
                    .stores
                    .connect(scheme, endpoint.as_deref())
                    .map_err(|e| ProviderError::InvalidStoreEndpoint(format!("{:#}", e)))?;
                Ok(BackendProvider::ConfigStore(
                    ConfigBackends::start(scheme, path, store).await,
                ))
            }
        }
    }

    /// Build the omni provider used when no selector is given.
    pub fn omni(
        self: &Arc<Self>,
        inspector: Arc<dyn BackendInspector>,
        original_dst: Arc<dyn OriginalDestination>,
        max_providers: Option<usize>,
    ) -> BackendProvider {
        BackendProvider::Omni(OmniBackends::new(
            self.clone(),
            inspector,
            original_dst,
            max_providers,
        ))
    }
}
