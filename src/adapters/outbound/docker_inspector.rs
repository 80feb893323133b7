//! Docker Backend Inspector
//!
//! Omni mode learns what a redirected client wanted from the client's
//! own container: the container whose IP matches the connection's
//! source carries `BACKEND_<port>=<selector>` in its environment.

use crate::domain::ports::BackendInspector;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;

pub const DEFAULT_DOCKER_HOST: &str = "tcp://127.0.0.1:2375";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerListing {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerDetails {
    #[serde(default)]
    config: ContainerConfig,
    #[serde(default)]
    network_settings: NetworkSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerConfig {
    #[serde(default)]
    env: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkSettings {
    #[serde(default, rename = "IPAddress")]
    ip_address: String,
    #[serde(default)]
    networks: Option<HashMap<String, EndpointSettings>>,
}

#[derive(Debug, Default, Deserialize)]
struct EndpointSettings {
    #[serde(default, rename = "IPAddress")]
    ip_address: String,
}

impl ContainerDetails {
    /// Bridge IP or any attached network's IP equals `ip`.
    fn has_ip(&self, ip: &str) -> bool {
        let settings = &self.network_settings;
        if settings.ip_address == ip {
            return true;
        }
        settings
            .networks
            .as_ref()
            .map(|n| n.values().any(|e| e.ip_address == ip))
            .unwrap_or(false)
    }

    /// Value of `key`, with the key compared case-insensitively.
    fn env_value(&self, key: &str) -> Option<String> {
        self.config
            .env
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|entry| entry.split_once('='))
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.to_string())
    }
}

/// Translate a `DOCKER_HOST` value into an HTTP base URL.
///
/// Unix sockets are not reachable through the HTTP client, so
/// `unix://` endpoints are rejected rather than silently ignored.
pub fn docker_base_url(docker_host: &str) -> anyhow::Result<String> {
    let docker_host = docker_host.trim().trim_end_matches('/');
    if let Some(rest) = docker_host.strip_prefix("tcp://") {
        return Ok(format!("http://{}", rest));
    }
    if docker_host.starts_with("http://") || docker_host.starts_with("https://") {
        return Ok(docker_host.to_string());
    }
    if docker_host.starts_with("unix://") {
        anyhow::bail!(
            "docker: unix socket endpoints are not supported ({}); expose the API over tcp",
            docker_host
        );
    }
    anyhow::bail!("docker: unrecognised DOCKER_HOST: {}", docker_host)
}

/// Inspector backed by the Docker Engine HTTP API.
pub struct DockerInspector {
    client: reqwest::Client,
    base_url: String,
}

impl DockerInspector {
    pub fn new(client: reqwest::Client, docker_host: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client,
            base_url: docker_base_url(docker_host)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("docker: GET {} - {} - {}", path, status, body);
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl BackendInspector for DockerInspector {
    async fn backend_name(&self, source_ip: IpAddr, dest_port: u16) -> anyhow::Result<String> {
        let env_key = format!("BACKEND_{}", dest_port);
        let source_ip = source_ip.to_canonical().to_string();

        let containers: Vec<ContainerListing> = self
            .get_json("/containers/json")
            .await
            .map_err(|e| anyhow::anyhow!("omni: unable to list containers: {}", e))?;

        for listing in containers {
            let details: ContainerDetails = self
                .get_json(&format!("/containers/{}/json", listing.id))
                .await
                .map_err(|e| {
                    anyhow::anyhow!("omni: unable to inspect container {}: {}", listing.id, e)
                })?;

            if details.has_ip(&source_ip) {
                return details.env_value(&env_key).ok_or_else(|| {
                    anyhow::anyhow!(
                        "omni: {} not found in environment of container {}",
                        env_key,
                        listing.id
                    )
                });
            }
        }

        anyhow::bail!("omni: unable to find container with source IP {}", source_ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ip(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    async fn mount_container(server: &MockServer, id: &str, ip: &str, env: &[&str]) {
        let body = serde_json::json!({
            "Id": id,
            "Config": {"Env": env},
            "NetworkSettings": {"IPAddress": ip, "Networks": {}}
        });
        Mock::given(method("GET"))
            .and(path(format!("/containers/{}/json", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(server)
            .await;
    }

    async fn mount_listing(server: &MockServer, ids: &[&str]) {
        let body: Vec<_> = ids.iter().map(|id| serde_json::json!({"Id": id})).collect();
        Mock::given(method("GET"))
            .and(path("/containers/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_docker_base_url() {
        assert_eq!(
            docker_base_url("tcp://10.0.0.1:2375").unwrap(),
            "http://10.0.0.1:2375"
        );
        assert_eq!(
            docker_base_url("http://docker:2375/").unwrap(),
            "http://docker:2375"
        );
        assert!(docker_base_url("unix:///var/run/docker.sock").is_err());
        assert!(docker_base_url("npipe:////./pipe/docker_engine").is_err());
    }

    #[tokio::test]
    async fn test_backend_name_from_matching_container() {
        let server = MockServer::start().await;
        mount_listing(&server, &["aaa", "bbb"]).await;
        mount_container(&server, "aaa", "172.17.0.2", &["PATH=/bin"]).await;
        mount_container(
            &server,
            "bbb",
            "172.17.0.3",
            &["backend_6379=redis.service.consul", "HOME=/root"],
        )
        .await;

        let inspector = DockerInspector::new(reqwest::Client::new(), &server.uri()).unwrap();
        let name = inspector
            .backend_name(ip(172, 17, 0, 3), 6379)
            .await
            .unwrap();
        assert_eq!(name, "redis.service.consul");
    }

    #[tokio::test]
    async fn test_mapped_ipv6_source_matches_ipv4_container() {
        let server = MockServer::start().await;
        mount_listing(&server, &["bbb"]).await;
        mount_container(&server, "bbb", "172.17.0.3", &["BACKEND_6379=redis:6379"]).await;

        let inspector = DockerInspector::new(reqwest::Client::new(), &server.uri()).unwrap();
        let mapped: IpAddr = "::ffff:172.17.0.3".parse().unwrap();
        let name = inspector.backend_name(mapped, 6379).await.unwrap();
        assert_eq!(name, "redis:6379");
    }

    #[tokio::test]
    async fn test_value_may_contain_equals() {
        let server = MockServer::start().await;
        mount_listing(&server, &["aaa"]).await;
        mount_container(
            &server,
            "aaa",
            "172.17.0.2",
            &["BACKEND_80=etcd://10.0.0.1:2379/web?x=1"],
        )
        .await;

        let inspector = DockerInspector::new(reqwest::Client::new(), &server.uri()).unwrap();
        let name = inspector.backend_name(ip(172, 17, 0, 2), 80).await.unwrap();
        assert_eq!(name, "etcd://10.0.0.1:2379/web?x=1");
    }

    #[tokio::test]
    async fn test_matches_user_defined_network_ip() {
        let server = MockServer::start().await;
        mount_listing(&server, &["ccc"]).await;
        let body = serde_json::json!({
            "Id": "ccc",
            "Config": {"Env": ["BACKEND_5432=db:5432"]},
            "NetworkSettings": {
                "IPAddress": "",
                "Networks": {"app": {"IPAddress": "10.5.0.7"}}
            }
        });
        Mock::given(method("GET"))
            .and(path("/containers/ccc/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let inspector = DockerInspector::new(reqwest::Client::new(), &server.uri()).unwrap();
        let name = inspector.backend_name(ip(10, 5, 0, 7), 5432).await.unwrap();
        assert_eq!(name, "db:5432");
    }

    #[tokio::test]
    async fn test_missing_variable() {
        let server = MockServer::start().await;
        mount_listing(&server, &["aaa"]).await;
        mount_container(&server, "aaa", "172.17.0.2", &["BACKEND_80=web:80"]).await;

        let inspector = DockerInspector::new(reqwest::Client::new(), &server.uri()).unwrap();
        let err = inspector
            .backend_name(ip(172, 17, 0, 2), 443)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("BACKEND_443"));
    }

    #[tokio::test]
    async fn test_no_container_with_ip() {
        let server = MockServer::start().await;
        mount_listing(&server, &["aaa"]).await;
        mount_container(&server, "aaa", "172.17.0.2", &[]).await;

        let inspector = DockerInspector::new(reqwest::Client::new(), &server.uri()).unwrap();
        let err = inspector
            .backend_name(ip(172, 17, 0, 9), 80)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("source IP"));
    }

    #[tokio::test]
    async fn test_list_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/containers/json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let inspector = DockerInspector::new(reqwest::Client::new(), &server.uri()).unwrap();
        let err = inspector
            .backend_name(ip(172, 17, 0, 2), 80)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unable to list containers"));
    }
}
