//! Adapters
//!
//! Inbound: the TCP relay. Outbound: config stores, DNS, Docker and the
//! original-destination socket query.

pub mod inbound;
pub mod outbound;
