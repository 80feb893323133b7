//! Application Layer
//!
//! Backend selection and name lookup, wired to the outbound ports.

pub mod backend_provider;
pub mod lookup_service;

pub use backend_provider::{
    BackendProvider, ConfigBackends, FixedBackends, OmniBackends, ProviderError, ProviderFactory,
    Selector, SrvBackends,
};
pub use lookup_service::{LookupError, LookupService, ResolverRegistry};
