//! ambassadord Library
//!
//! This module exposes the ambassadord components for use in integration
//! tests and as a library.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{BackendProvider, LookupService, ProviderError, ProviderFactory};
pub use config::load_config;
pub use domain::entities::{BackendAddress, OmniKey, StoreScheme};
pub use domain::ports::{
    BackendInspector, ConfigStore, ConfigStoreConnector, OriginalDestination, Resolver,
};
pub use infrastructure::AddressCache;
