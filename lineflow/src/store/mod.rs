//! The metadata store interface and its in-memory implementation.
//!
//! The persistent store is an external collaborator: this module defines
//! the typed put/get surface the lineage layer depends on
//! ([`MetadataStore`]), the connection configuration used to reach a
//! store, and an in-memory implementation used for tests and embedded
//! runs. Every component takes the store as an injected `Arc<dyn
//! MetadataStore>` so it can be substituted freely.

mod connection;
mod interface;
mod memory;
mod records;

pub use connection::{ConnectionConfig, InMemoryConnector, SqliteConnectionMode, StoreConnector};
pub use interface::{ContextInsert, MetadataStore, StoreError};
pub use memory::InMemoryMetadataStore;
#[cfg(test)]
pub use interface::MockMetadataStore;
pub use records::{
    ArtifactRecord, ArtifactType, ContextRecord, ContextType, Event, EventPath, EventType,
    ExecutionRecord, ExecutionType,
};
