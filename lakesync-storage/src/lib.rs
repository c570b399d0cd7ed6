//! lakesync storage - collaborator contracts
//!
//! The metadata store, lakehouse catalog, remote warehouse and local host
//! engine are external to the freshness and routing logic. This crate defines
//! their contracts as async traits and ships in-memory implementations used
//! by tests and embedders.

mod lakehouse;
mod metadata;
mod traits;

pub use lakehouse::InMemoryLakehouse;
pub use metadata::InMemoryMetadataStore;
pub use traits::{CatalogStorage, HostEngine, MetadataStore, WarehouseConnector};
