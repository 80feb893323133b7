//! DNS SRV Resolver
//!
//! Resolves service names with a single SRV query over UDP. Targets are
//! paired positionally with the additional-section A records so that a
//! Consul-style DNS interface yields dialable IPs directly.

use crate::domain::entities::{join_host_port, BackendAddress};
use crate::domain::ports::Resolver;
use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tokio::net::UdpSocket;

pub const RESOLV_CONF_PATH: &str = "/etc/resolv.conf";
pub const DEFAULT_DNS_TIMEOUT: Duration = Duration::from_secs(5);
const DNS_PORT: u16 = 53;

/// SRV resolver registered as `"dns"`.
#[derive(Debug, Clone)]
pub struct DnsSrvResolver {
    server: SocketAddr,
    recursion_desired: bool,
    timeout: Duration,
}

impl DnsSrvResolver {
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            recursion_desired: false,
            timeout: DEFAULT_DNS_TIMEOUT,
        }
    }

    /// Use the first nameserver listed in `/etc/resolv.conf`.
    pub fn from_resolv_conf() -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(RESOLV_CONF_PATH)?;
        let server = parse_resolv_conf(&contents)
            .ok_or_else(|| anyhow::anyhow!("no nameserver in {}", RESOLV_CONF_PATH))?;
        Ok(Self::new(server))
    }

    pub fn with_recursion_desired(mut self, recursion_desired: bool) -> Self {
        self.recursion_desired = recursion_desired;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    fn build_query(&self, name: &str, id: u16) -> anyhow::Result<Message> {
        let fqdn = if name.ends_with('.') {
            name.to_string()
        } else {
            format!("{}.", name)
        };

        let mut message = Message::new();
        message.set_id(id);
        message.set_message_type(MessageType::Query);
        message.set_op_code(OpCode::Query);
        message.set_recursion_desired(self.recursion_desired);

        let mut query = Query::new();
        query.set_name(Name::from_str(&fqdn)?);
        query.set_query_type(RecordType::SRV);
        message.add_query(query);
        Ok(message)
    }

    async fn exchange(&self, query: &Message) -> anyhow::Result<Message> {
        let bind_addr = if self.server.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(self.server).await?;
        socket.send(&query.to_bytes()?).await?;

        let mut buf = [0u8; 4096];
        loop {
            let len = tokio::time::timeout(self.timeout, socket.recv(&mut buf))
                .await
                .map_err(|_| anyhow::anyhow!("dns: timeout waiting for {}", self.server))??;
            let response = Message::from_bytes(&buf[..len])?;
            if response.id() == query.id() {
                return Ok(response);
            }
            tracing::debug!("dns: discarding response with id {}", response.id());
        }
    }
}

/// First `nameserver` entry of a resolv.conf, on port 53.
pub fn parse_resolv_conf(contents: &str) -> Option<SocketAddr> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#') && !line.starts_with(';'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match fields.next() {
                Some("nameserver") => fields.next(),
                _ => None,
            }
        })
        .find_map(|addr| addr.parse::<IpAddr>().ok())
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
}

/// Turn an SRV response into `host:port` addresses.
///
/// The i-th answer takes its host from the i-th additional record when
/// that record is an A record, otherwise from the SRV target name.
pub fn parse_response(response: &Message) -> anyhow::Result<Vec<BackendAddress>> {
    match response.response_code() {
        ResponseCode::NoError | ResponseCode::NXDomain => {}
        code => anyhow::bail!("dns: server returned {}", code),
    }

    let additionals = response.additionals();
    let mut addresses = Vec::with_capacity(response.answers().len());
    for (i, answer) in response.answers().iter().enumerate() {
        let Some(RData::SRV(srv)) = answer.data() else {
            continue;
        };
        let host = match additionals.get(i).and_then(|r| r.data()) {
            Some(RData::A(a)) => a.0.to_string(),
            _ => srv.target().to_string().trim_end_matches('.').to_string(),
        };
        addresses.push(join_host_port(&host, srv.port()));
    }
    Ok(addresses)
}

#[async_trait]
impl Resolver for DnsSrvResolver {
    async fn lookup(&self, name: &str) -> anyhow::Result<Vec<BackendAddress>> {
        let query = self.build_query(name, rand::random())?;
        let response = self.exchange(&query).await?;
        parse_response(&response)
    }
}
