//! # Lineflow
//!
//! Lineage tracking and execution caching for pipeline metadata.
//!
//! Lineflow records, for every pipeline step execution, which typed
//! artifacts were consumed and produced, under which pipeline / run /
//! component contexts, and answers the question "has an equivalent
//! execution already run, and can its outputs be reused?". It provides:
//!
//! - **Schema-on-write type registry**: artifact, execution and context
//!   types grow their property schemas on demand, never shrink them
//! - **Hierarchical run contexts**: idempotent registration of pipeline,
//!   pipeline-run and component-run contexts for lineage scoping
//! - **Event-sourced lineage**: append-only INPUT/OUTPUT events are the
//!   sole source of truth for what an execution consumed and produced
//! - **Deterministic cache lookup**: a two-phase equivalence filter that
//!   finds a prior execution whose outputs can stand in for a new run
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lineflow::prelude::*;
//!
//! let connector = InMemoryConnector::new();
//! let config = ConnectionConfig::sqlite("/tmp/pipeline/metadata.db")?;
//! let metadata = Metadata::connect(&connector, &config).await?;
//!
//! let contexts = metadata.register_contexts(&pipeline_info, &component_info).await?;
//! let execution_id = metadata
//!     .register_execution(&exec_properties, &pipeline_info, &component_info, &contexts)
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod artifact;
pub mod errors;
pub mod info;
pub mod metadata;
pub mod properties;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifact::{Artifact, ARTIFACT_STATE_NEW, ARTIFACT_STATE_PUBLISHED};
    pub use crate::errors::MetadataError;
    pub use crate::info::{ComponentInfo, PipelineInfo};
    pub use crate::metadata::{
        ArtifactMap, ArtifactPublisher, CacheResolver, ContextManager, ExecutionRecorder,
        Metadata, TypeRegistry, EXECUTION_STATE_CACHED, EXECUTION_STATE_COMPLETE,
        EXECUTION_STATE_NEW,
    };
    pub use crate::properties::{PropertyMap, PropertySchema, PropertyType, PropertyValue};
    pub use crate::store::{
        ConnectionConfig, ContextInsert, Event, EventType, InMemoryConnector,
        InMemoryMetadataStore, MetadataStore, StoreConnector, StoreError,
    };
}
