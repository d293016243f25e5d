//! Schema-on-write type resolution.
//!
//! Artifact, execution and context properties are untyped text/number
//! bags as far as the store is concerned; registering their types on
//! first write keeps the lineage graph queryable without a rigid upfront
//! schema. Schemas only ever grow: new optional properties may be added,
//! existing ones are never removed or retyped.

use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::MetadataError;
use crate::properties::{format_schema, PropertyMap, PropertySchema, PropertyType};
use crate::store::{ArtifactType, ContextType, ExecutionType, MetadataStore, StoreError};

/// Execution property holding the module-file content checksum.
pub const EXECUTION_TYPE_KEY_CHECKSUM: &str = "checksum_md5";
/// Execution property holding the pipeline name.
pub const EXECUTION_TYPE_KEY_PIPELINE_NAME: &str = "pipeline_name";
/// Execution property holding the pipeline root location.
pub const EXECUTION_TYPE_KEY_PIPELINE_ROOT: &str = "pipeline_root";
/// Execution property holding the run id.
pub const EXECUTION_TYPE_KEY_RUN_ID: &str = "run_id";
/// Execution property holding the component id.
pub const EXECUTION_TYPE_KEY_COMPONENT_ID: &str = "component_id";
/// Execution property holding the lifecycle state.
pub const EXECUTION_TYPE_KEY_STATE: &str = "state";

/// Execution property that, when declared, points at a user code module
/// to checksum.
pub const MODULE_FILE_KEY: &str = "module_file";

/// Property names the layer writes itself; a user-declared execution
/// property may never collide with these.
pub const EXECUTION_TYPE_RESERVED_KEYS: [&str; 6] = [
    EXECUTION_TYPE_KEY_CHECKSUM,
    EXECUTION_TYPE_KEY_PIPELINE_NAME,
    EXECUTION_TYPE_KEY_PIPELINE_ROOT,
    EXECUTION_TYPE_KEY_RUN_ID,
    EXECUTION_TYPE_KEY_COMPONENT_ID,
    EXECUTION_TYPE_KEY_STATE,
];

/// Resolves artifact, execution and context types against the store.
#[derive(Clone)]
pub struct TypeRegistry {
    store: Arc<dyn MetadataStore>,
}

impl TypeRegistry {
    /// Creates a registry over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Returns the artifact type with its registered id.
    ///
    /// A type that already carries an id is returned unchanged;
    /// otherwise it is registered (allowing new fields on an existing
    /// schema) and the assigned id recorded.
    pub async fn resolve_artifact_type(
        &self,
        artifact_type: &ArtifactType,
    ) -> Result<ArtifactType, MetadataError> {
        if artifact_type.id.is_some() {
            return Ok(artifact_type.clone());
        }
        let mut resolved = artifact_type.clone();
        let type_id = self.store.put_artifact_type(resolved.clone(), true).await?;
        resolved.id = Some(type_id);
        Ok(resolved)
    }

    /// Returns the id of an execution type that covers the declared
    /// properties.
    ///
    /// Uses the existing type when its schema is a superset of what is
    /// needed; otherwise registers an evolved schema built from the
    /// fixed base plus the declared property names. A store rejection of
    /// the evolution surfaces as [`MetadataError::SchemaConflict`]
    /// naming both schemas.
    pub async fn resolve_execution_type(
        &self,
        type_name: &str,
        exec_properties: &PropertyMap,
    ) -> Result<i64, MetadataError> {
        // A collision with a reserved key is a configuration error no
        // matter whether the type ends up reused or registered.
        for key in exec_properties.keys() {
            if EXECUTION_TYPE_RESERVED_KEYS.contains(&key.as_str()) {
                return Err(MetadataError::ReservedProperty { key: key.clone() });
            }
        }

        let existing = self.store.get_execution_type(type_name).await?;
        if let Some(existing_type) = &existing {
            if exec_properties
                .keys()
                .all(|key| existing_type.properties.contains_key(key))
            {
                if let Some(type_id) = existing_type.id {
                    return Ok(type_id);
                }
            }
        }

        let mut execution_type = ExecutionType::new(type_name);
        execution_type
            .properties
            .insert(EXECUTION_TYPE_KEY_STATE.to_string(), PropertyType::String);
        for key in exec_properties.keys() {
            execution_type
                .properties
                .insert(key.clone(), PropertyType::String);
        }
        if exec_properties.contains_key(MODULE_FILE_KEY) {
            execution_type.properties.insert(
                EXECUTION_TYPE_KEY_CHECKSUM.to_string(),
                PropertyType::String,
            );
        }
        for key in [
            EXECUTION_TYPE_KEY_PIPELINE_NAME,
            EXECUTION_TYPE_KEY_PIPELINE_ROOT,
            EXECUTION_TYPE_KEY_RUN_ID,
            EXECUTION_TYPE_KEY_COMPONENT_ID,
        ] {
            execution_type
                .properties
                .insert(key.to_string(), PropertyType::String);
        }

        match self
            .store
            .put_execution_type(execution_type.clone(), true)
            .await
        {
            Ok(type_id) => {
                info!("Registering a new execution type with id {type_id}.");
                Ok(type_id)
            }
            Err(StoreError::SchemaMismatch { .. } | StoreError::AlreadyExists { .. }) => {
                let existing_schema = existing
                    .map(|t| format_schema(&t.properties))
                    .unwrap_or_else(|| "{}".to_string());
                let requested_schema = format_schema(&execution_type.properties);
                warn!(
                    "missing or modified key in exec_properties comparing with existing \
                     execution type with the same type name. Existing type: {existing_schema}, \
                     New type: {requested_schema}"
                );
                Err(MetadataError::SchemaConflict {
                    type_name: type_name.to_string(),
                    existing: existing_schema,
                    requested: requested_schema,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Registers a context type if it does not exist, otherwise returns
    /// the existing one's id (growing its schema when needed).
    pub async fn register_context_type_if_not_exist(
        &self,
        type_name: &str,
        properties: &PropertySchema,
    ) -> Result<i64, MetadataError> {
        let mut context_type = ContextType::new(type_name);
        context_type.properties = properties.clone();
        let type_id = self.store.put_context_type(context_type, true).await?;
        Ok(type_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::PropertyValue;
    use crate::store::{InMemoryMetadataStore, MockMetadataStore};
    use pretty_assertions::assert_eq;

    fn properties(keys: &[&str]) -> PropertyMap {
        keys.iter()
            .map(|key| ((*key).to_string(), PropertyValue::from("x")))
            .collect()
    }

    #[tokio::test]
    async fn test_artifact_type_with_id_is_unchanged() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let registry = TypeRegistry::new(store);
        let mut artifact_type = ArtifactType::new("Model");
        artifact_type.id = Some(42);
        let resolved = registry.resolve_artifact_type(&artifact_type).await.unwrap();
        assert_eq!(resolved.id, Some(42));
    }

    #[tokio::test]
    async fn test_artifact_type_registration_assigns_id() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let registry = TypeRegistry::new(store);
        let resolved = registry
            .resolve_artifact_type(&ArtifactType::new("Model"))
            .await
            .unwrap();
        assert!(resolved.id.is_some());
    }

    #[tokio::test]
    async fn test_execution_type_includes_base_schema() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let registry = TypeRegistry::new(store.clone());
        registry
            .resolve_execution_type("Trainer", &properties(&["lr"]))
            .await
            .unwrap();
        let registered = store.get_execution_type("Trainer").await.unwrap().unwrap();
        for key in [
            "state",
            "lr",
            "pipeline_name",
            "pipeline_root",
            "run_id",
            "component_id",
        ] {
            assert!(registered.properties.contains_key(key), "missing {key}");
        }
        assert!(!registered.properties.contains_key("checksum_md5"));
    }

    #[tokio::test]
    async fn test_module_file_adds_checksum_property() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let registry = TypeRegistry::new(store.clone());
        registry
            .resolve_execution_type("Transform", &properties(&["module_file"]))
            .await
            .unwrap();
        let registered = store
            .get_execution_type("Transform")
            .await
            .unwrap()
            .unwrap();
        assert!(registered.properties.contains_key("checksum_md5"));
    }

    #[tokio::test]
    async fn test_superset_schema_is_reused() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let registry = TypeRegistry::new(store);
        let first = registry
            .resolve_execution_type("Trainer", &properties(&["lr", "epochs"]))
            .await
            .unwrap();
        let second = registry
            .resolve_execution_type("Trainer", &properties(&["lr"]))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_type_growth_is_monotonic() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let registry = TypeRegistry::new(store.clone());
        registry
            .resolve_execution_type("Trainer", &properties(&["lr"]))
            .await
            .unwrap();
        registry
            .resolve_execution_type("Trainer", &properties(&["lr", "epochs"]))
            .await
            .unwrap();
        let registered = store.get_execution_type("Trainer").await.unwrap().unwrap();
        // Union of every declared set seen so far.
        assert!(registered.properties.contains_key("lr"));
        assert!(registered.properties.contains_key("epochs"));
    }

    #[tokio::test]
    async fn test_reserved_key_collision_is_fatal() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let registry = TypeRegistry::new(store);
        let err = registry
            .resolve_execution_type("Trainer", &properties(&["run_id"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MetadataError::ReservedProperty { key } if key == "run_id"
        ));
    }

    #[tokio::test]
    async fn test_reserved_key_collision_checked_before_reuse() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let registry = TypeRegistry::new(store);
        registry
            .resolve_execution_type("Trainer", &properties(&["lr"]))
            .await
            .unwrap();
        // The registered schema already holds run_id, so a plain
        // superset check would silently reuse the type.
        let err = registry
            .resolve_execution_type("Trainer", &properties(&["run_id"]))
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::ReservedProperty { .. }));
    }

    #[tokio::test]
    async fn test_store_rejection_surfaces_schema_conflict() {
        let mut store = MockMetadataStore::new();
        store.expect_get_execution_type().returning(|_| {
            let mut existing = ExecutionType::new("Trainer");
            existing.id = Some(1);
            existing
                .properties
                .insert("state".to_string(), PropertyType::String);
            existing
                .properties
                .insert("batch".to_string(), PropertyType::String);
            Ok(Some(existing))
        });
        store.expect_put_execution_type().returning(|requested, _| {
            Err(StoreError::SchemaMismatch {
                type_name: requested.name,
                existing: "{batch: STRING, state: STRING}".to_string(),
                requested: "{...}".to_string(),
            })
        });

        let registry = TypeRegistry::new(Arc::new(store));
        let err = registry
            .resolve_execution_type("Trainer", &properties(&["lr"]))
            .await
            .unwrap_err();
        match err {
            MetadataError::SchemaConflict {
                type_name,
                existing,
                requested,
            } => {
                assert_eq!(type_name, "Trainer");
                assert!(existing.contains("batch"));
                assert!(requested.contains("lr"));
            }
            other => panic!("expected schema conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_context_type_registration_is_idempotent() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let registry = TypeRegistry::new(store);
        let mut schema = PropertySchema::new();
        schema.insert("pipeline_name".to_string(), PropertyType::String);
        let first = registry
            .register_context_type_if_not_exist("pipeline", &schema)
            .await
            .unwrap();
        let second = registry
            .register_context_type_if_not_exist("pipeline", &schema)
            .await
            .unwrap();
        assert_eq!(first, second);
    }
}
