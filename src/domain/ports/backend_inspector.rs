//! Backend Inspector Port
//!
//! Boundary to the container platform used in omni mode.

use async_trait::async_trait;
use std::net::IpAddr;

/// Finds which backend a redirected client wanted.
///
/// Given the client's source IP and the port it originally dialed, the
/// inspector returns a backend selector string (anything
/// [`ProviderFactory::build`](crate::application::ProviderFactory::build)
/// accepts), or an error if no container or variable matches.
#[async_trait]
pub trait BackendInspector: Send + Sync {
    async fn backend_name(&self, source_ip: IpAddr, dest_port: u16) -> anyhow::Result<String>;
}
