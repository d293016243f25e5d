//! Error types for the lineflow metadata layer.
//!
//! Two layers of errors exist: [`StoreError`] covers failures reported by
//! the metadata store interface, while [`MetadataError`] is the taxonomy
//! surfaced to pipeline step logic. None of these are retried
//! automatically except store connection establishment.

use thiserror::Error;

use crate::store::StoreError;

/// The main error type for metadata operations.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The store could not be reached after exhausting connection retries.
    #[error("failed to establish connection to metadata storage after {attempts} attempts: {reason}")]
    Connection {
        /// Number of connection attempts made before giving up.
        attempts: usize,
        /// Last failure reason reported by the connector.
        reason: String,
    },

    /// A type cannot be evolved to satisfy the requested properties
    /// because the store already holds an incompatible registration.
    #[error(
        "missing or modified key in properties comparing with existing type \
         `{type_name}`. Existing type: {existing}, New type: {requested}"
    )]
    SchemaConflict {
        /// Name of the conflicting type.
        type_name: String,
        /// Schema already registered in the store.
        existing: String,
        /// Schema the caller attempted to register.
        requested: String,
    },

    /// A declared execution property collides with a reserved key.
    #[error("execution properties with reserved key `{key}`")]
    ReservedProperty {
        /// The offending property name.
        key: String,
    },

    /// An operation required a persisted artifact id but none was set.
    #[error("artifact id missing for {context}")]
    MissingArtifactId {
        /// Description of the artifact that lacked an id.
        context: String,
    },

    /// `publish_execution` was called with a non-terminal state.
    #[error("cannot publish execution with state `{state}`")]
    InvalidPublishState {
        /// The rejected state value.
        state: String,
    },

    /// A cached execution's recorded outputs do not line up with what the
    /// caller expects; reuse is unsafe and the caller must recompute.
    #[error("cache consistency violation: {0}")]
    CacheConsistency(String),

    /// A context that the operation requires does not exist.
    #[error("context `{name}` of type `{context_type}` does not exist")]
    ContextNotFound {
        /// The context type name.
        context_type: String,
        /// The context name.
        name: String,
    },

    /// A lineage query found no matching record.
    #[error("{0}")]
    NotFound(String),

    /// An error reported by the underlying metadata store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// IO error, e.g. while checksumming a module file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MetadataError {
    /// Returns true when the error indicates a corrupted or unusable
    /// cache entry that callers should treat as a cache miss plus
    /// recomputation, never as a valid hit.
    #[must_use]
    pub fn is_cache_consistency(&self) -> bool {
        matches!(self, Self::CacheConsistency(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let err = MetadataError::Connection {
            attempts: 10,
            reason: "store offline".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("10 attempts"));
        assert!(msg.contains("store offline"));
    }

    #[test]
    fn test_schema_conflict_names_both_schemas() {
        let err = MetadataError::SchemaConflict {
            type_name: "Trainer".to_string(),
            existing: "{lr: STRING}".to_string(),
            requested: "{lr: STRING, epochs: STRING}".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("{lr: STRING}"));
        assert!(msg.contains("{lr: STRING, epochs: STRING}"));
    }

    #[test]
    fn test_store_error_converts() {
        let err: MetadataError = StoreError::Unavailable("init race".to_string()).into();
        assert!(matches!(err, MetadataError::Store(_)));
    }

    #[test]
    fn test_is_cache_consistency() {
        assert!(MetadataError::CacheConsistency("bad".to_string()).is_cache_consistency());
        assert!(!MetadataError::NotFound("x".to_string()).is_cache_consistency());
    }
}
