//! Hierarchical run contexts.
//!
//! Three context levels group executions for later lookup:
//! - pipeline context: shared within one pipeline, across runs
//! - pipeline-run context: shared within one run, across components
//! - component-run context: one component run
//!
//! Contexts group executions, they do not own them. A component-run
//! context's properties echo its ancestors' identifying fields so
//! executions can be found without traversing a graph.

use std::sync::Arc;
use tracing::debug;

use super::type_registry::TypeRegistry;
use crate::errors::MetadataError;
use crate::info::{ComponentInfo, PipelineInfo};
use crate::properties::{PropertyMap, PropertySchema, PropertyValue};
use crate::store::{ContextInsert, ContextRecord, MetadataStore};

/// Context type shared within one pipeline, across runs.
pub const CONTEXT_TYPE_PIPELINE: &str = "pipeline";
/// Context type shared within one pipeline run, across components.
pub const CONTEXT_TYPE_PIPELINE_RUN: &str = "run";
/// Context type scoped to one component run.
pub const CONTEXT_TYPE_COMPONENT_RUN: &str = "component_run";

/// Context property holding the pipeline name.
pub const CONTEXT_KEY_PIPELINE_NAME: &str = "pipeline_name";
/// Context property holding the run id.
pub const CONTEXT_KEY_RUN_ID: &str = "run_id";
/// Context property holding the component id.
pub const CONTEXT_KEY_COMPONENT_ID: &str = "component_id";

/// Creates and fetches the context hierarchy for pipeline runs.
#[derive(Clone)]
pub struct ContextManager {
    store: Arc<dyn MetadataStore>,
    types: TypeRegistry,
}

impl ContextManager {
    /// Creates a context manager over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        let types = TypeRegistry::new(store.clone());
        Self { store, types }
    }

    /// Registers a context if it does not exist, otherwise fetches the
    /// existing one.
    ///
    /// The insert is optimistic: on the duplicate branch the existing
    /// record is fetched instead of failing, which makes registration
    /// safe under concurrent pipeline runs without coordination.
    async fn register_context_if_not_exist(
        &self,
        type_name: &str,
        context_name: String,
        properties: PropertyMap,
    ) -> Result<ContextRecord, MetadataError> {
        let schema: PropertySchema = properties
            .iter()
            .map(|(key, value)| (key.clone(), value.property_type()))
            .collect();
        let type_id = self
            .types
            .register_context_type_if_not_exist(type_name, &schema)
            .await?;

        let mut context = ContextRecord {
            id: None,
            type_id: Some(type_id),
            name: context_name,
            properties,
        };
        match self.store.put_context(context.clone()).await? {
            ContextInsert::Created(context_id) => {
                context.id = Some(context_id);
                debug!("ID of run context {} is {context_id}.", context.name);
                Ok(context)
            }
            ContextInsert::Duplicate => {
                debug!("Run context {} already exists.", context.name);
                self.store
                    .get_context_by_type_and_name(type_name, &context.name)
                    .await?
                    .ok_or_else(|| MetadataError::ContextNotFound {
                        context_type: type_name.to_string(),
                        name: context.name.clone(),
                    })
            }
        }
    }

    /// Creates or fetches the contexts needed for a component run.
    ///
    /// Returns the pipeline context, the pipeline-run context (only when
    /// a run id is present) and the component-run context, in that
    /// order. Repeated registration with the same identity is idempotent.
    pub async fn register_contexts(
        &self,
        pipeline_info: &PipelineInfo,
        component_info: &ComponentInfo,
    ) -> Result<Vec<ContextRecord>, MetadataError> {
        let mut result = Vec::with_capacity(3);

        let mut properties = PropertyMap::new();
        properties.insert(
            CONTEXT_KEY_PIPELINE_NAME.to_string(),
            PropertyValue::from(pipeline_info.pipeline_name.as_str()),
        );
        let pipeline_context = self
            .register_context_if_not_exist(
                CONTEXT_TYPE_PIPELINE,
                pipeline_info.pipeline_context_name().to_string(),
                properties,
            )
            .await?;
        debug!(
            "Pipeline context [{} : {:?}]",
            pipeline_info.pipeline_context_name(),
            pipeline_context.id
        );
        result.push(pipeline_context);

        if let Some(run_context_name) = pipeline_info.pipeline_run_context_name() {
            let mut properties = PropertyMap::new();
            properties.insert(
                CONTEXT_KEY_PIPELINE_NAME.to_string(),
                PropertyValue::from(pipeline_info.pipeline_name.as_str()),
            );
            if let Some(run_id) = &pipeline_info.run_id {
                properties.insert(
                    CONTEXT_KEY_RUN_ID.to_string(),
                    PropertyValue::from(run_id.as_str()),
                );
            }
            let run_context = self
                .register_context_if_not_exist(
                    CONTEXT_TYPE_PIPELINE_RUN,
                    run_context_name.clone(),
                    properties,
                )
                .await?;
            debug!("Pipeline run context [{run_context_name} : {:?}]", run_context.id);
            result.push(run_context);
        }

        let mut properties = PropertyMap::new();
        properties.insert(
            CONTEXT_KEY_PIPELINE_NAME.to_string(),
            PropertyValue::from(pipeline_info.pipeline_name.as_str()),
        );
        if let Some(run_id) = &pipeline_info.run_id {
            properties.insert(
                CONTEXT_KEY_RUN_ID.to_string(),
                PropertyValue::from(run_id.as_str()),
            );
        }
        properties.insert(
            CONTEXT_KEY_COMPONENT_ID.to_string(),
            PropertyValue::from(component_info.component_id.as_str()),
        );
        let component_run_context_name = component_info.component_run_context_name(pipeline_info);
        let component_run_context = self
            .register_context_if_not_exist(
                CONTEXT_TYPE_COMPONENT_RUN,
                component_run_context_name.clone(),
                properties,
            )
            .await?;
        debug!(
            "Component run context [{component_run_context_name} : {:?}]",
            component_run_context.id
        );
        result.push(component_run_context);

        Ok(result)
    }

    /// Looks up a context by type and name. Absence is a normal outcome.
    pub async fn lookup_context(
        &self,
        type_name: &str,
        context_name: &str,
    ) -> Result<Option<ContextRecord>, MetadataError> {
        Ok(self
            .store
            .get_context_by_type_and_name(type_name, context_name)
            .await?)
    }

    /// Gets the pipeline-level context for the given pipeline.
    pub async fn get_pipeline_context(
        &self,
        pipeline_info: &PipelineInfo,
    ) -> Result<Option<ContextRecord>, MetadataError> {
        self.lookup_context(CONTEXT_TYPE_PIPELINE, pipeline_info.pipeline_context_name())
            .await
    }

    /// Gets the pipeline-run-level context, or `None` when the pipeline
    /// has no run id.
    pub async fn get_pipeline_run_context(
        &self,
        pipeline_info: &PipelineInfo,
    ) -> Result<Option<ContextRecord>, MetadataError> {
        match pipeline_info.pipeline_run_context_name() {
            Some(name) => self.lookup_context(CONTEXT_TYPE_PIPELINE_RUN, &name).await,
            None => Ok(None),
        }
    }

    /// Gets the component-run-level context for the given component.
    pub async fn get_component_run_context(
        &self,
        pipeline_info: &PipelineInfo,
        component_info: &ComponentInfo,
    ) -> Result<Option<ContextRecord>, MetadataError> {
        self.lookup_context(
            CONTEXT_TYPE_COMPONENT_RUN,
            &component_info.component_run_context_name(pipeline_info),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryMetadataStore;
    use pretty_assertions::assert_eq;

    fn run_scoped_identity() -> (PipelineInfo, ComponentInfo) {
        (
            PipelineInfo::new("p1", "/data/p1").with_run_id("r1"),
            ComponentInfo::new("Trainer", "c1"),
        )
    }

    #[tokio::test]
    async fn test_registers_three_levels() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let manager = ContextManager::new(store);
        let (pipeline_info, component_info) = run_scoped_identity();
        let contexts = manager
            .register_contexts(&pipeline_info, &component_info)
            .await
            .unwrap();
        assert_eq!(contexts.len(), 3);
        assert_eq!(contexts[0].name, "p1");
        assert_eq!(contexts[1].name, "p1.r1");
        assert_eq!(contexts[2].name, "p1.r1.c1");
        assert!(contexts.iter().all(|c| c.id.is_some()));
    }

    #[tokio::test]
    async fn test_runless_pipeline_skips_run_context() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let manager = ContextManager::new(store);
        let pipeline_info = PipelineInfo::new("p1", "/data/p1");
        let component_info = ComponentInfo::new("Trainer", "c1");
        let contexts = manager
            .register_contexts(&pipeline_info, &component_info)
            .await
            .unwrap();
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[1].name, "p1.c1");
        assert!(!contexts[1].properties.contains_key(CONTEXT_KEY_RUN_ID));
    }

    #[tokio::test]
    async fn test_registration_is_idempotent() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let manager = ContextManager::new(store);
        let (pipeline_info, component_info) = run_scoped_identity();
        let first = manager
            .register_contexts(&pipeline_info, &component_info)
            .await
            .unwrap();
        let second = manager
            .register_contexts(&pipeline_info, &component_info)
            .await
            .unwrap();
        let ids = |contexts: &[ContextRecord]| {
            contexts.iter().map(|c| c.id).collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
        let names = |contexts: &[ContextRecord]| {
            contexts.iter().map(|c| c.name.clone()).collect::<Vec<_>>()
        };
        assert_eq!(names(&first), names(&second));
    }

    #[tokio::test]
    async fn test_component_run_context_echoes_ancestors() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let manager = ContextManager::new(store);
        let (pipeline_info, component_info) = run_scoped_identity();
        let contexts = manager
            .register_contexts(&pipeline_info, &component_info)
            .await
            .unwrap();
        let component_run = &contexts[2];
        let text = |key: &str| {
            component_run
                .properties
                .get(key)
                .map(PropertyValue::as_text)
        };
        assert_eq!(text(CONTEXT_KEY_PIPELINE_NAME), Some("p1".to_string()));
        assert_eq!(text(CONTEXT_KEY_RUN_ID), Some("r1".to_string()));
        assert_eq!(text(CONTEXT_KEY_COMPONENT_ID), Some("c1".to_string()));
    }

    #[tokio::test]
    async fn test_lookup_absent_context_is_none() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let manager = ContextManager::new(store);
        let pipeline_info = PipelineInfo::new("never-ran", "/data");
        assert_eq!(
            manager.get_pipeline_context(&pipeline_info).await.unwrap(),
            None
        );
        assert_eq!(
            manager
                .get_pipeline_run_context(&pipeline_info)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_get_contexts_after_registration() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let manager = ContextManager::new(store);
        let (pipeline_info, component_info) = run_scoped_identity();
        let registered = manager
            .register_contexts(&pipeline_info, &component_info)
            .await
            .unwrap();

        let pipeline = manager
            .get_pipeline_context(&pipeline_info)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pipeline.id, registered[0].id);

        let run = manager
            .get_pipeline_run_context(&pipeline_info)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.id, registered[1].id);

        let component_run = manager
            .get_component_run_context(&pipeline_info, &component_info)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(component_run.id, registered[2].id);
    }
}
