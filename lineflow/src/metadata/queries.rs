//! Lineage and run-state queries over the metadata store.
//!
//! These read-only operations serve run inspection and cross-component
//! artifact passing: finding the artifacts a named producer emitted,
//! listing a pipeline's runs, and reading per-component execution
//! states for a run.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::context_manager::{
    CONTEXT_KEY_PIPELINE_NAME, CONTEXT_KEY_RUN_ID, CONTEXT_TYPE_PIPELINE_RUN,
};
use super::type_registry::{EXECUTION_TYPE_KEY_COMPONENT_ID, EXECUTION_TYPE_KEY_STATE};
use super::Metadata;
use crate::artifact::Artifact;
use crate::errors::MetadataError;
use crate::info::PipelineInfo;
use crate::properties::PropertyValue;
use crate::store::{ArtifactRecord, EventType, StoreError};

impl Metadata {
    /// Returns all artifacts in the store. An empty store is a normal
    /// outcome, not an error.
    pub async fn get_all_artifacts(&self) -> Result<Vec<ArtifactRecord>, MetadataError> {
        match self.store.get_artifacts().await {
            Ok(artifacts) => Ok(artifacts),
            Err(StoreError::NotFound { .. }) => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns all artifacts stored at the given uri.
    pub async fn get_artifacts_by_uri(
        &self,
        uri: &str,
    ) -> Result<Vec<ArtifactRecord>, MetadataError> {
        match self.store.get_artifacts_by_uri(uri).await {
            Ok(artifacts) => Ok(artifacts),
            Err(StoreError::NotFound { .. }) => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns all artifacts of the named type.
    pub async fn get_artifacts_by_type(
        &self,
        type_name: &str,
    ) -> Result<Vec<ArtifactRecord>, MetadataError> {
        match self.store.get_artifacts_by_type(type_name).await {
            Ok(artifacts) => Ok(artifacts),
            Err(StoreError::NotFound { .. }) => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Searches the artifacts a producer component emitted under a named
    /// output slot in the current run.
    ///
    /// Requires the pipeline-run context to exist; an operation scoped
    /// to a run that never registered contexts is an error, unlike cache
    /// lookup where absence is a normal miss.
    pub async fn search_artifacts(
        &self,
        artifact_name: &str,
        pipeline_info: &PipelineInfo,
        producer_component_id: &str,
    ) -> Result<Vec<Artifact>, MetadataError> {
        let run_context_name = pipeline_info
            .pipeline_run_context_name()
            .unwrap_or_default();
        let context = self
            .contexts
            .get_pipeline_run_context(pipeline_info)
            .await?
            .ok_or_else(|| MetadataError::ContextNotFound {
                context_type: CONTEXT_TYPE_PIPELINE_RUN.to_string(),
                name: run_context_name,
            })?;
        let context_id = context.id.ok_or(StoreError::MissingId { entity: "context" })?;

        let mut producer_execution = None;
        for execution in self.store.get_executions_by_context(context_id).await? {
            let component_id = execution
                .properties
                .get(EXECUTION_TYPE_KEY_COMPONENT_ID)
                .and_then(PropertyValue::string_value);
            if component_id == Some(producer_component_id) {
                producer_execution = Some(execution);
                break;
            }
        }
        let producer_execution = producer_execution.ok_or_else(|| {
            MetadataError::NotFound(format!(
                "cannot find matching execution with pipeline name {}, run id {:?} and \
                 component id {producer_component_id}",
                pipeline_info.pipeline_name, pipeline_info.run_id
            ))
        })?;
        let producer_id = producer_execution
            .id
            .ok_or(StoreError::MissingId { entity: "execution" })?;

        let mut matching_artifact_ids = BTreeSet::new();
        for event in self
            .store
            .get_events_by_execution_ids(&[producer_id])
            .await?
        {
            if event.event_type == EventType::Output && event.path.key == artifact_name {
                matching_artifact_ids.insert(event.artifact_id);
            }
        }
        debug!(
            "Found {} artifacts named {artifact_name} from producer {producer_component_id}",
            matching_artifact_ids.len()
        );

        let artifact_ids: Vec<i64> = matching_artifact_ids.into_iter().collect();
        let records = self.store.get_artifacts_by_id(&artifact_ids).await?;
        let type_ids: Vec<i64> = records
            .iter()
            .filter_map(|record| record.type_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let artifact_types = self.store.get_artifact_types_by_id(&type_ids).await?;
        let types_by_id: BTreeMap<i64, _> = type_ids.into_iter().zip(artifact_types).collect();

        let mut result = Vec::with_capacity(records.len());
        for record in records {
            let type_id = record.type_id.ok_or(StoreError::MissingId {
                entity: "artifact type",
            })?;
            let artifact_type = types_by_id
                .get(&type_id)
                .cloned()
                .ok_or(StoreError::NotFound {
                    entity: "artifact type",
                    detail: format!("id {type_id}"),
                })?;
            let mut artifact = Artifact::new(artifact_type);
            artifact.set_record(record);
            result.push(artifact);
        }
        Ok(result)
    }

    /// Returns the run ids of every recorded run of the named pipeline.
    pub async fn get_all_runs(&self, pipeline_name: &str) -> Result<Vec<String>, MetadataError> {
        let mut result = Vec::new();
        for context in self
            .store
            .get_contexts_by_type(CONTEXT_TYPE_PIPELINE_RUN)
            .await?
        {
            let name = context
                .properties
                .get(CONTEXT_KEY_PIPELINE_NAME)
                .and_then(PropertyValue::string_value);
            if name == Some(pipeline_name) {
                if let Some(run_id) = context
                    .properties
                    .get(CONTEXT_KEY_RUN_ID)
                    .and_then(PropertyValue::string_value)
                {
                    result.push(run_id.to_string());
                }
            }
        }
        Ok(result)
    }

    /// Returns component id → execution state for every execution in the
    /// pipeline's current run. Empty when the run context does not
    /// exist.
    pub async fn get_execution_states(
        &self,
        pipeline_info: &PipelineInfo,
    ) -> Result<BTreeMap<String, String>, MetadataError> {
        let mut result = BTreeMap::new();
        let Some(context) = self.contexts.get_pipeline_run_context(pipeline_info).await? else {
            return Ok(result);
        };
        let context_id = context.id.ok_or(StoreError::MissingId { entity: "context" })?;
        for execution in self.store.get_executions_by_context(context_id).await? {
            let component_id = execution
                .properties
                .get(EXECUTION_TYPE_KEY_COMPONENT_ID)
                .and_then(PropertyValue::string_value);
            let state = execution
                .properties
                .get(EXECUTION_TYPE_KEY_STATE)
                .and_then(PropertyValue::string_value);
            if let (Some(component_id), Some(state)) = (component_id, state) {
                result.insert(component_id.to_string(), state.to_string());
            }
        }
        Ok(result)
    }
}
