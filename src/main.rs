//! ambassadord - transparent TCP ambassador
//!
//! This is the composition root that wires together all the components.

use ambassadord::adapters::inbound::TcpServer;
use ambassadord::adapters::outbound::{
    DnsSrvResolver, DockerInspector, HttpStoreConnector, SoOriginalDst,
};
use ambassadord::application::{LookupService, ProviderFactory, ResolverRegistry};
use ambassadord::config::load_config;
use ambassadord::domain::ports::Resolver;
use ambassadord::infrastructure::{shutdown_signal, AddressCache};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = load_config()?;

    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    // ===== COMPOSITION ROOT =====

    // 1. Name lookup: cache in front of the resolver registry
    let registry = ResolverRegistry::new();
    let dns = match cfg.dns_server {
        Some(server) => Ok(DnsSrvResolver::new(server)),
        None => DnsSrvResolver::from_resolv_conf(),
    };
    match dns {
        Ok(dns) => {
            let dns = dns.with_recursion_desired(cfg.dns_recursion);
            tracing::debug!("dns resolver using {}", dns.server());
            registry.register("dns", Arc::new(dns) as Arc<dyn Resolver>);
        }
        // Only service-name selectors need it
        Err(e) => tracing::warn!("dns resolver unavailable: {:#}", e),
    }

    let cache = AddressCache::new(cfg.cache_capacity, Duration::from_secs(cfg.cache_ttl_secs));
    let lookup = Arc::new(LookupService::new(cache, registry, cfg.resolver.clone()));

    // 2. Config stores share one HTTP client
    let http = reqwest::Client::new();
    let stores = Arc::new(HttpStoreConnector::new(http.clone()));
    let factory = Arc::new(ProviderFactory::new(lookup, stores));

    // 3. Backend provider from the selector
    let provider = if cfg.backends.is_empty() {
        let inspector = Arc::new(DockerInspector::new(http, &cfg.docker_host)?);
        factory.omni(inspector, Arc::new(SoOriginalDst::new()), cfg.omni_max_providers)
    } else {
        factory.build(&cfg.backends).await?
    };

    // 4. Inbound adapter
    let server = TcpServer::new(Arc::new(provider), cfg.listen_addr);

    tokio::select! {
        result = server.run() => result,
        _ = shutdown_signal() => Ok(()),
    }
}
