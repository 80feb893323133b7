//! Original Destination Port
//!
//! Recovers the pre-NAT destination of a transparently redirected
//! connection.

use std::io;
use tokio::net::TcpStream;

/// Socket-level query for the port a client dialed before a NAT
/// `REDIRECT` rule rewrote it.
///
/// Platforms without the query return [`io::ErrorKind::Unsupported`].
pub trait OriginalDestination: Send + Sync {
    fn destination_port(&self, stream: &TcpStream) -> io::Result<u16>;
}
