//! The typed put/get surface of the metadata store.
//!
//! The store is transactional per call: each `put_*` is atomic, but no
//! transaction spans multiple calls. "Create if missing" flows are
//! expressed optimistically: [`MetadataStore::put_context`] reports a
//! duplicate as a first-class [`ContextInsert`] branch rather than an
//! error, so the losing side of a registration race is testable without
//! forcing real races.

use async_trait::async_trait;
use thiserror::Error;

use super::records::{
    ArtifactRecord, ArtifactType, ContextRecord, ContextType, Event, ExecutionRecord,
    ExecutionType,
};

/// Errors reported by a metadata store implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A referenced record does not exist.
    #[error("{entity} not found: {detail}")]
    NotFound {
        /// The entity kind looked up.
        entity: &'static str,
        /// Which record was missing.
        detail: String,
    },

    /// An insert collided with an existing record of the same identity.
    #[error("{entity} already exists: {detail}")]
    AlreadyExists {
        /// The entity kind inserted.
        entity: &'static str,
        /// Which record already existed.
        detail: String,
    },

    /// A type put could not be applied because the registered schema is
    /// incompatible with the requested one.
    #[error("schema for type `{type_name}` cannot be evolved: existing {existing}, requested {requested}")]
    SchemaMismatch {
        /// The type name.
        type_name: String,
        /// Formatted schema currently registered.
        existing: String,
        /// Formatted schema that was requested.
        requested: String,
    },

    /// A record returned by the store unexpectedly lacks an id.
    #[error("stored {entity} record has no id")]
    MissingId {
        /// The entity kind.
        entity: &'static str,
    },

    /// The request was malformed, e.g. an insert without a type id.
    #[error("invalid request: {0}")]
    Invalid(String),

    /// The store could not be reached; safe to retry during connection
    /// establishment.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of an optimistic context insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextInsert {
    /// The context was inserted and assigned this id.
    Created(i64),
    /// A context with the same type and name already exists; the caller
    /// should fetch it.
    Duplicate,
}

/// Typed put/get operations over artifacts, executions, contexts, events
/// and their type schemas.
///
/// Implementations must assign monotonically increasing ids per entity
/// table; the cache resolver orders executions by id to prefer the most
/// recent match.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Registers or evolves an artifact type; returns its id.
    ///
    /// With `can_add_fields`, new properties may be added to an existing
    /// schema. Removing or retyping existing properties is always an
    /// error.
    async fn put_artifact_type(
        &self,
        artifact_type: ArtifactType,
        can_add_fields: bool,
    ) -> Result<i64, StoreError>;

    /// Fetches artifact types by id; errors if any id is unknown.
    async fn get_artifact_types_by_id(
        &self,
        type_ids: &[i64],
    ) -> Result<Vec<ArtifactType>, StoreError>;

    /// Registers or evolves an execution type; returns its id.
    async fn put_execution_type(
        &self,
        execution_type: ExecutionType,
        can_add_fields: bool,
    ) -> Result<i64, StoreError>;

    /// Looks up an execution type by name.
    async fn get_execution_type(
        &self,
        type_name: &str,
    ) -> Result<Option<ExecutionType>, StoreError>;

    /// Registers or evolves a context type; returns its id.
    async fn put_context_type(
        &self,
        context_type: ContextType,
        can_add_fields: bool,
    ) -> Result<i64, StoreError>;

    /// Inserts or updates artifacts in one atomic call; returns their ids
    /// in input order.
    async fn put_artifacts(&self, artifacts: Vec<ArtifactRecord>) -> Result<Vec<i64>, StoreError>;

    /// Returns all artifacts.
    async fn get_artifacts(&self) -> Result<Vec<ArtifactRecord>, StoreError>;

    /// Fetches artifacts by id; errors if any id is unknown.
    async fn get_artifacts_by_id(
        &self,
        artifact_ids: &[i64],
    ) -> Result<Vec<ArtifactRecord>, StoreError>;

    /// Returns all artifacts with the given uri.
    async fn get_artifacts_by_uri(&self, uri: &str) -> Result<Vec<ArtifactRecord>, StoreError>;

    /// Returns all artifacts of the named type.
    async fn get_artifacts_by_type(
        &self,
        type_name: &str,
    ) -> Result<Vec<ArtifactRecord>, StoreError>;

    /// Inserts one execution together with its events and its context
    /// attributions in one atomic call; returns the execution id.
    async fn put_execution(
        &self,
        execution: ExecutionRecord,
        events: Vec<Event>,
        context_ids: Vec<i64>,
    ) -> Result<i64, StoreError>;

    /// Inserts or updates executions in one atomic call; returns their
    /// ids in input order.
    async fn put_executions(
        &self,
        executions: Vec<ExecutionRecord>,
    ) -> Result<Vec<i64>, StoreError>;

    /// Fetches executions by id; errors if any id is unknown.
    async fn get_executions_by_id(
        &self,
        execution_ids: &[i64],
    ) -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Returns all executions attributed to the given context.
    async fn get_executions_by_context(
        &self,
        context_id: i64,
    ) -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Appends events in one atomic call. Events are immutable.
    async fn put_events(&self, events: Vec<Event>) -> Result<(), StoreError>;

    /// Returns all events whose execution id is in the given set.
    async fn get_events_by_execution_ids(
        &self,
        execution_ids: &[i64],
    ) -> Result<Vec<Event>, StoreError>;

    /// Optimistically inserts a context; a (type, name) collision is
    /// reported as [`ContextInsert::Duplicate`], not an error.
    async fn put_context(&self, context: ContextRecord) -> Result<ContextInsert, StoreError>;

    /// Looks up a context by type name and context name.
    async fn get_context_by_type_and_name(
        &self,
        type_name: &str,
        context_name: &str,
    ) -> Result<Option<ContextRecord>, StoreError>;

    /// Returns all contexts of the named type.
    async fn get_contexts_by_type(&self, type_name: &str)
        -> Result<Vec<ContextRecord>, StoreError>;
}
