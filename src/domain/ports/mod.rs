mod backend_inspector;
mod config_store;
mod original_destination;
mod resolver;

pub use backend_inspector::BackendInspector;
pub use config_store::{ConfigStore, ConfigStoreConnector};
pub use original_destination::OriginalDestination;
pub use resolver::Resolver;
