//! Domain Entities
//!
//! Core value types for backend selection. A backend address is an
//! opaque `host:port` string; the relay never looks inside it beyond
//! checking that it is non-empty.

use std::fmt;
use std::net::IpAddr;

/// A `host:port` string naming a single relay target.
pub type BackendAddress = String;

/// Well-known service names accepted in the port position of an address.
const NAMED_PORTS: &[(&str, u16)] = &[
    ("syslog", 514),
    ("http", 80),
    ("https", 443),
    ("ssh", 22),
    ("consul", 8500),
    ("consul-http", 8500),
    ("etcd", 2379),
    ("dns", 53),
];

/// Look up the numeric port for a well-known service name.
pub fn named_port(name: &str) -> Option<u16> {
    NAMED_PORTS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, port)| *port)
}

/// Join a host and port, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> BackendAddress {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Split a `host:port` string.
///
/// The port may be numeric or one of the named ports. Returns `None` when
/// the input has no port component (a bare name such as an SRV service).
pub fn split_host_port(input: &str) -> Option<(&str, u16)> {
    let (host, port) = if let Some(rest) = input.strip_prefix('[') {
        let (host, rest) = rest.split_once(']')?;
        (host, rest.strip_prefix(':')?)
    } else {
        let (host, port) = input.rsplit_once(':')?;
        if host.contains(':') {
            // unbracketed IPv6 literal
            return None;
        }
        (host, port)
    };

    if port.is_empty() {
        return None;
    }
    let port = match port.parse::<u16>() {
        Ok(p) => p,
        Err(_) => named_port(port)?,
    };
    Some((host, port))
}

/// Rewrite a `host:name` address into `host:<number>`.
///
/// Addresses that do not split cleanly are returned trimmed but otherwise
/// untouched, so dialing reports the problem for that one connection.
pub fn normalize_address(input: &str) -> BackendAddress {
    let input = input.trim();
    match split_host_port(input) {
        Some((host, port)) => join_host_port(host, port),
        None => input.to_string(),
    }
}

/// Distributed stores a backend selector URI may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreScheme {
    Consul,
    Etcd,
}

impl StoreScheme {
    /// Match a URI scheme (case-insensitive).
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "consul" => Some(StoreScheme::Consul),
            "etcd" => Some(StoreScheme::Etcd),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreScheme::Consul => "consul",
            StoreScheme::Etcd => "etcd",
        }
    }
}

impl fmt::Display for StoreScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry key for omni-mode providers: who connected, and which port
/// they originally dialed before the NAT redirect.
///
/// Two containers sharing a source IP (or one container reused across
/// restarts) map to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OmniKey {
    pub source_ip: IpAddr,
    pub dest_port: u16,
}

impl OmniKey {
    /// IPv4-mapped sources from a dual-stack listener collapse to IPv4.
    pub fn new(source_ip: IpAddr, dest_port: u16) -> Self {
        Self {
            source_ip: source_ip.to_canonical(),
            dest_port,
        }
    }
}

impl fmt::Display for OmniKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", join_host_port(&self.source_ip.to_string(), self.dest_port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_named_port_known() {
        assert_eq!(named_port("http"), Some(80));
        assert_eq!(named_port("HTTPS"), Some(443));
        assert_eq!(named_port("consul-http"), Some(8500));
        assert_eq!(named_port("etcd"), Some(2379));
    }

    #[test]
    fn test_named_port_unknown() {
        assert_eq!(named_port("gopher"), None);
    }

    #[test]
    fn test_join_host_port() {
        assert_eq!(join_host_port("10.0.0.1", 80), "10.0.0.1:80");
        assert_eq!(join_host_port("::1", 8080), "[::1]:8080");
        assert_eq!(join_host_port("db.internal", 5432), "db.internal:5432");
    }

    #[test]
    fn test_split_host_port_numeric() {
        assert_eq!(split_host_port("10.0.0.1:80"), Some(("10.0.0.1", 80)));
        assert_eq!(split_host_port("[::1]:443"), Some(("::1", 443)));
    }

    #[test]
    fn test_split_host_port_named() {
        assert_eq!(split_host_port("web:http"), Some(("web", 80)));
    }

    #[test]
    fn test_split_host_port_rejects_bare_names() {
        assert_eq!(split_host_port("_web._tcp.service.consul"), None);
        assert_eq!(split_host_port("web:"), None);
        assert_eq!(split_host_port("web:notaport"), None);
        assert_eq!(split_host_port("::1"), None);
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address(" web:ssh "), "web:22");
        assert_eq!(normalize_address("10.0.0.1:9000"), "10.0.0.1:9000");
        assert_eq!(normalize_address("garbage"), "garbage");
    }

    #[test]
    fn test_store_scheme_from_scheme() {
        assert_eq!(StoreScheme::from_scheme("consul"), Some(StoreScheme::Consul));
        assert_eq!(StoreScheme::from_scheme("ETCD"), Some(StoreScheme::Etcd));
        assert_eq!(StoreScheme::from_scheme("zookeeper"), None);
        assert_eq!(StoreScheme::Etcd.to_string(), "etcd");
    }

    #[test]
    fn test_omni_key_display() {
        let key = OmniKey::new(IpAddr::V4(Ipv4Addr::new(172, 17, 0, 2)), 6379);
        assert_eq!(key.to_string(), "172.17.0.2:6379");
    }

    #[test]
    fn test_omni_key_mapped_ipv6_matches_ipv4() {
        let mapped: IpAddr = "::ffff:172.17.0.2".parse().unwrap();
        let key = OmniKey::new(mapped, 6379);
        assert_eq!(key, OmniKey::new(IpAddr::V4(Ipv4Addr::new(172, 17, 0, 2)), 6379));
        assert_eq!(key.to_string(), "172.17.0.2:6379");
    }
}
