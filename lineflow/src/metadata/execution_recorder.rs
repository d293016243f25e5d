//! Execution registration and publication.
//!
//! An execution is registered `new`, then published exactly once as
//! `complete` or `cached`. A failed step never publishes, leaving the
//! execution `new` forever; that stuck state is the observable signature
//! of a failed run and keeps it out of cache matching.

use std::sync::Arc;
use tracing::debug;

use super::artifact_publisher::ArtifactPublisher;
use super::type_registry::{
    TypeRegistry, EXECUTION_TYPE_KEY_CHECKSUM, EXECUTION_TYPE_KEY_COMPONENT_ID,
    EXECUTION_TYPE_KEY_PIPELINE_NAME, EXECUTION_TYPE_KEY_PIPELINE_ROOT, EXECUTION_TYPE_KEY_RUN_ID,
    EXECUTION_TYPE_KEY_STATE, MODULE_FILE_KEY,
};
use super::ArtifactMap;
use crate::errors::MetadataError;
use crate::info::{ComponentInfo, PipelineInfo};
use crate::properties::{PropertyMap, PropertyValue};
use crate::store::{ContextRecord, Event, EventType, ExecutionRecord, MetadataStore, StoreError};
use crate::utils::module_file_checksum;

/// State of a registered execution that has not published yet.
pub const EXECUTION_STATE_NEW: &str = "new";
/// State of an execution that ran and published real outputs.
pub const EXECUTION_STATE_COMPLETE: &str = "complete";
/// State of an execution that reused a previous execution's outputs.
pub const EXECUTION_STATE_CACHED: &str = "cached";

/// Registers executions and links them to artifacts via events.
#[derive(Clone)]
pub struct ExecutionRecorder {
    store: Arc<dyn MetadataStore>,
    types: TypeRegistry,
    artifacts: ArtifactPublisher,
}

impl ExecutionRecorder {
    /// Creates a recorder over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        let types = TypeRegistry::new(store.clone());
        let artifacts = ArtifactPublisher::new(store.clone());
        Self {
            store,
            types,
            artifacts,
        }
    }

    /// Builds an execution record with the given state.
    ///
    /// Declared properties are text-encoded; the reserved identity
    /// properties (pipeline name, pipeline root, run id, component id)
    /// are added, and a `module_file` property pointing at an existing
    /// readable file contributes a content checksum so runs of
    /// textually-identical configuration but different code stay
    /// distinguishable.
    pub(crate) async fn prepare_execution(
        &self,
        state: &str,
        exec_properties: &PropertyMap,
        pipeline_info: &PipelineInfo,
        component_info: &ComponentInfo,
    ) -> Result<ExecutionRecord, MetadataError> {
        let type_id = self
            .types
            .resolve_execution_type(&component_info.component_type, exec_properties)
            .await?;
        let mut execution = ExecutionRecord {
            type_id: Some(type_id),
            ..ExecutionRecord::default()
        };
        execution.properties.insert(
            EXECUTION_TYPE_KEY_STATE.to_string(),
            PropertyValue::from(state),
        );
        for (key, value) in exec_properties {
            // Execution properties are always persisted as text.
            execution
                .properties
                .insert(key.clone(), PropertyValue::String(value.as_text()));
        }
        if let Some(module_file) = exec_properties.get(MODULE_FILE_KEY) {
            if let Some(checksum) = module_file_checksum(&module_file.as_text()).await? {
                execution.properties.insert(
                    EXECUTION_TYPE_KEY_CHECKSUM.to_string(),
                    PropertyValue::String(checksum),
                );
            }
        }
        execution.properties.insert(
            EXECUTION_TYPE_KEY_PIPELINE_NAME.to_string(),
            PropertyValue::from(pipeline_info.pipeline_name.as_str()),
        );
        execution.properties.insert(
            EXECUTION_TYPE_KEY_PIPELINE_ROOT.to_string(),
            PropertyValue::from(pipeline_info.pipeline_root.as_str()),
        );
        if let Some(run_id) = &pipeline_info.run_id {
            execution.properties.insert(
                EXECUTION_TYPE_KEY_RUN_ID.to_string(),
                PropertyValue::from(run_id.as_str()),
            );
        }
        execution.properties.insert(
            EXECUTION_TYPE_KEY_COMPONENT_ID.to_string(),
            PropertyValue::from(component_info.component_id.as_str()),
        );
        debug!("Prepared execution: {execution:?}");
        Ok(execution)
    }

    /// Creates a new execution in the store, linked to the given
    /// contexts, and returns its id.
    pub async fn register_execution(
        &self,
        exec_properties: &PropertyMap,
        pipeline_info: &PipelineInfo,
        component_info: &ComponentInfo,
        contexts: &[ContextRecord],
    ) -> Result<i64, MetadataError> {
        let execution = self
            .prepare_execution(
                EXECUTION_STATE_NEW,
                exec_properties,
                pipeline_info,
                component_info,
            )
            .await?;
        let context_ids = contexts
            .iter()
            .map(|context| {
                context.id.ok_or_else(|| MetadataError::ContextNotFound {
                    context_type: "context".to_string(),
                    name: context.name.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let execution_id = self
            .store
            .put_execution(execution, Vec::new(), context_ids)
            .await?;
        Ok(execution_id)
    }

    /// Publishes an execution with its input and output artifacts.
    ///
    /// Inputs must already be persisted. Outputs without identity are
    /// published here when the state is `complete`; under `cached` an
    /// id-less output is a fatal consistency error, since a cached
    /// execution must reuse previously-persisted outputs, never mint new
    /// ones. Artifacts receive ids before their OUTPUT events are built
    /// because events reference artifact ids by value.
    ///
    /// The state rewrite and the event batch are separate store calls: a
    /// crash in between can leave a `complete` execution with partial
    /// events, so callers must treat execution state as authoritative
    /// and event completeness as verifiable only after the state is
    /// terminal.
    ///
    /// Returns the output map with all ids populated.
    pub async fn publish_execution(
        &self,
        execution_id: i64,
        input_map: &ArtifactMap,
        output_map: ArtifactMap,
        state: &str,
    ) -> Result<ArtifactMap, MetadataError> {
        if state != EXECUTION_STATE_COMPLETE && state != EXECUTION_STATE_CACHED {
            return Err(MetadataError::InvalidPublishState {
                state: state.to_string(),
            });
        }

        let mut events = Vec::new();
        for (key, input_list) in input_map {
            for (index, single_input) in input_list.iter().enumerate() {
                let artifact_id =
                    single_input
                        .id()
                        .ok_or_else(|| MetadataError::MissingArtifactId {
                            context: format!("input `{key}[{index}]` of execution {execution_id}"),
                        })?;
                events.push(Event::new(
                    execution_id,
                    artifact_id,
                    key.clone(),
                    index,
                    EventType::Input,
                ));
            }
        }

        let mut output_map = output_map;
        for (key, output_list) in &mut output_map {
            for (index, single_output) in output_list.iter_mut().enumerate() {
                if single_output.id().is_none() {
                    if state == EXECUTION_STATE_CACHED {
                        return Err(MetadataError::CacheConsistency(format!(
                            "output artifact id not available for cached output `{key}[{index}]`"
                        )));
                    }
                    self.artifacts
                        .publish_artifacts(std::slice::from_mut(single_output))
                        .await?;
                }
                let artifact_id =
                    single_output
                        .id()
                        .ok_or_else(|| MetadataError::MissingArtifactId {
                            context: format!("output `{key}[{index}]` of execution {execution_id}"),
                        })?;
                events.push(Event::new(
                    execution_id,
                    artifact_id,
                    key.clone(),
                    index,
                    EventType::Output,
                ));
            }
        }

        let mut execution = self
            .store
            .get_executions_by_id(&[execution_id])
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound {
                entity: "execution",
                detail: format!("id {execution_id}"),
            })?;
        execution.properties.insert(
            EXECUTION_TYPE_KEY_STATE.to_string(),
            PropertyValue::from(state),
        );
        self.store.put_executions(vec![execution]).await?;
        if !events.is_empty() {
            self.store.put_events(events).await?;
        }
        debug!("Published execution {execution_id} with state {state}");
        Ok(output_map)
    }
}
