mod consul_store;
mod dns_srv_resolver;
mod docker_inspector;
mod etcd_store;
mod http_store_connector;
mod so_original_dst;

pub use consul_store::{ConsulStore, DEFAULT_CONSUL_ADDRESS};
pub use dns_srv_resolver::{parse_resolv_conf, DnsSrvResolver, DEFAULT_DNS_TIMEOUT};
pub use docker_inspector::{docker_base_url, DockerInspector, DEFAULT_DOCKER_HOST};
pub use etcd_store::{EtcdStore, DEFAULT_ETCD_ENDPOINT};
pub use http_store_connector::HttpStoreConnector;
pub use so_original_dst::SoOriginalDst;
