use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};

pub const DEFAULT_PORT: u16 = 10000;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    // Relay
    pub listen_addr: String,
    /// Backend selector; empty means omni mode.
    pub backends: String,

    // Name lookup
    pub resolver: String,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    /// None: first nameserver from /etc/resolv.conf.
    pub dns_server: Option<SocketAddr>,
    pub dns_recursion: bool,

    // Omni mode
    pub docker_host: String,
    pub omni_max_providers: Option<usize>,

    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            backends: String::new(),
            resolver: "dns".to_string(),
            cache_capacity: 1024 * 1024,
            cache_ttl_secs: 1,
            dns_server: None,
            dns_recursion: false,
            docker_host: "tcp://127.0.0.1:2375".to_string(),
            omni_max_providers: None,
            debug: false,
        }
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    load_config_with(|key| std::env::var(key).ok(), std::env::args().skip(1))
}

/// Build a [`Config`] from a variable lookup and the command-line
/// arguments (program name excluded).
pub fn load_config_with<F, A>(var: F, args: A) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
    A: IntoIterator<Item = String>,
{
    let defaults = Config::default();

    let port: u16 = var("PORT")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let listen_addr = var("AMBASSADOR_LISTEN_ADDR")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| format!("0.0.0.0:{}", port));

    let backends = args
        .into_iter()
        .next()
        .or_else(|| var("AMBASSADOR_BACKENDS"))
        .unwrap_or_default()
        .trim()
        .to_string();

    let resolver = var("LOOKUP_RESOLVER")
        .filter(|v| !v.is_empty())
        .unwrap_or(defaults.resolver);

    let cache_capacity = var("AMBASSADOR_CACHE_CAPACITY")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.cache_capacity);

    let cache_ttl_secs = var("AMBASSADOR_CACHE_TTL_SECS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.cache_ttl_secs);

    let dns_server = match var("AMBASSADOR_DNS_SERVER").filter(|v| !v.trim().is_empty()) {
        Some(v) => Some(parse_dns_server(v.trim())?),
        None => None,
    };

    let dns_recursion = var("AMBASSADOR_DNS_RECURSION")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false);

    let docker_host = var("DOCKER_HOST")
        .filter(|v| !v.is_empty())
        .unwrap_or(defaults.docker_host);

    let omni_max_providers = var("AMBASSADOR_OMNI_MAX_PROVIDERS")
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|n| *n > 0);

    let debug = var("DEBUG").is_some();

    Ok(Config {
        listen_addr,
        backends,
        resolver,
        cache_capacity,
        cache_ttl_secs,
        dns_server,
        dns_recursion,
        docker_host,
        omni_max_providers,
        debug,
    })
}

/// `ip:port`, or a bare IP on port 53.
fn parse_dns_server(value: &str) -> anyhow::Result<SocketAddr> {
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Ok(addr);
    }
    value
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, 53))
        .map_err(|_| anyhow::anyhow!("invalid AMBASSADOR_DNS_SERVER: {}", value))
}
