//! Cache lookup: finding a previous equivalent execution.
//!
//! The lookup is a two-phase filter. Property/type equality (ignoring
//! run identity) is cheap and narrows the candidate set first; the more
//! expensive per-candidate input-set comparison runs only over the
//! capped survivors. Candidates are ordered most-recent-first by id, so
//! ties break on recency with no other rule.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use super::context_manager::ContextManager;
use super::execution_recorder::{ExecutionRecorder, EXECUTION_STATE_COMPLETE};
use super::type_registry::EXECUTION_TYPE_KEY_RUN_ID;
use super::ArtifactMap;
use crate::errors::MetadataError;
use crate::info::{ComponentInfo, PipelineInfo};
use crate::properties::{PropertyMap, PropertyValue};
use crate::store::{ArtifactRecord, EventType, ExecutionRecord, MetadataStore, StoreError};

/// Maximum number of property-matching executions considered per lookup.
///
/// Bounds lookup cost against pipelines with very long history; only the
/// most recent candidates (highest ids) stay in the window.
pub const MAX_EXECUTIONS_FOR_CACHE: usize = 100;

/// Finds prior executions whose outputs can be reused.
#[derive(Clone)]
pub struct CacheResolver {
    store: Arc<dyn MetadataStore>,
    contexts: ContextManager,
    recorder: ExecutionRecorder,
}

impl CacheResolver {
    /// Creates a resolver over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        let contexts = ContextManager::new(store.clone());
        let recorder = ExecutionRecorder::new(store.clone());
        Self {
            store,
            contexts,
            recorder,
        }
    }

    /// Tests whether a stored execution is equivalent to the expected
    /// template.
    ///
    /// Both sides have their `run_id` cleared (a cache hit must ignore
    /// which run produced it) and the candidate's id is copied onto the
    /// template; what remains is full record equality.
    fn is_eligible_previous_execution(
        expected: &ExecutionRecord,
        candidate: &ExecutionRecord,
    ) -> bool {
        let mut expected = expected.clone();
        let mut candidate = candidate.clone();
        expected.properties.insert(
            EXECUTION_TYPE_KEY_RUN_ID.to_string(),
            PropertyValue::String(String::new()),
        );
        candidate.properties.insert(
            EXECUTION_TYPE_KEY_RUN_ID.to_string(),
            PropertyValue::String(String::new()),
        );
        expected.id = candidate.id;
        expected == candidate
    }

    /// Picks the first candidate whose consumed-input id set equals the
    /// given inputs' id set.
    async fn cached_execution_id(
        &self,
        input_artifacts: &ArtifactMap,
        candidate_execution_ids: &[i64],
    ) -> Result<Option<i64>, MetadataError> {
        let mut input_ids = HashSet::new();
        for (key, input_list) in input_artifacts {
            for (index, single_input) in input_list.iter().enumerate() {
                let artifact_id =
                    single_input
                        .id()
                        .ok_or_else(|| MetadataError::MissingArtifactId {
                            context: format!("cache lookup input `{key}[{index}]`"),
                        })?;
                input_ids.insert(artifact_id);
            }
        }

        for &execution_id in candidate_execution_ids {
            let events = self
                .store
                .get_events_by_execution_ids(&[execution_id])
                .await?;
            let execution_input_ids: HashSet<i64> = events
                .iter()
                .filter(|event| event.event_type.is_input())
                .map(|event| event.artifact_id)
                .collect();
            if input_ids == execution_input_ids {
                debug!("Found matching execution with all input artifacts: {execution_id}");
                return Ok(Some(execution_id));
            }
            debug!("Execution {execution_id} does not match desired input artifacts");
        }
        debug!("No execution matching type id and input artifacts found");
        Ok(None)
    }

    /// Gets an eligible previous execution that took the same inputs.
    ///
    /// An eligible execution completed with the same execution
    /// properties, the same pipeline and component identity (run id
    /// excepted) and exactly the same input artifact set. Returns its
    /// id, or `None` when nothing qualifies, including when the
    /// pipeline has no pipeline-level context yet, since a pipeline that
    /// never ran cannot have cached executions.
    pub async fn previous_execution(
        &self,
        input_artifacts: &ArtifactMap,
        exec_properties: &PropertyMap,
        pipeline_info: &PipelineInfo,
        component_info: &ComponentInfo,
    ) -> Result<Option<i64>, MetadataError> {
        debug!(
            "Checking previous run for execution type {} of component {}",
            component_info.component_type, component_info.component_id
        );
        let expected = self
            .recorder
            .prepare_execution(
                EXECUTION_STATE_COMPLETE,
                exec_properties,
                pipeline_info,
                component_info,
            )
            .await?;
        let Some(context) = self.contexts.get_pipeline_context(pipeline_info).await? else {
            warn!(
                "Pipeline context not available for {}",
                pipeline_info.pipeline_name
            );
            return Ok(None);
        };
        let context_id = context.id.ok_or(StoreError::MissingId { entity: "context" })?;

        let mut candidate_execution_ids = Vec::new();
        for execution in self.store.get_executions_by_context(context_id).await? {
            if Self::is_eligible_previous_execution(&expected, &execution) {
                if let Some(execution_id) = execution.id {
                    candidate_execution_ids.push(execution_id);
                }
            }
        }
        // Most recent first; ids increase monotonically.
        candidate_execution_ids.sort_unstable_by(|a, b| b.cmp(a));
        candidate_execution_ids.truncate(MAX_EXECUTIONS_FOR_CACHE);

        self.cached_execution_id(input_artifacts, &candidate_execution_ids)
            .await
    }

    /// Reconstructs the output map of a previously-matched execution.
    ///
    /// The cached execution's OUTPUT events are grouped by slot; every
    /// output name the caller expects must be present with exactly the
    /// expected number of positions, otherwise the step's output
    /// contract changed since the cached run and reuse is unsafe.
    pub async fn fetch_previous_result_artifacts(
        &self,
        output_map: ArtifactMap,
        execution_id: i64,
    ) -> Result<ArtifactMap, MetadataError> {
        let mut name_to_index_to_artifact: BTreeMap<String, BTreeMap<usize, ArtifactRecord>> =
            BTreeMap::new();
        for event in self
            .store
            .get_events_by_execution_ids(&[execution_id])
            .await?
        {
            if event.event_type != EventType::Output {
                continue;
            }
            let artifact = self
                .store
                .get_artifacts_by_id(&[event.artifact_id])
                .await?
                .into_iter()
                .next()
                .ok_or(StoreError::NotFound {
                    entity: "artifact",
                    detail: format!("id {}", event.artifact_id),
                })?;
            name_to_index_to_artifact
                .entry(event.path.key.clone())
                .or_default()
                .insert(event.path.index, artifact);
        }

        let mut output_map = output_map;
        for (output_name, output_list) in &mut output_map {
            let index_to_artifact =
                name_to_index_to_artifact
                    .get(output_name)
                    .ok_or_else(|| {
                        MetadataError::CacheConsistency(format!(
                            "unmatched output name `{output_name}` from previous execution \
                             {execution_id}"
                        ))
                    })?;
            if output_list.len() != index_to_artifact.len() {
                return Err(MetadataError::CacheConsistency(format!(
                    "output `{output_name}` expected {} items but {} retrieved",
                    output_list.len(),
                    index_to_artifact.len()
                )));
            }
            for (index, output) in output_list.iter_mut().enumerate() {
                let record = index_to_artifact.get(&index).ok_or_else(|| {
                    MetadataError::CacheConsistency(format!(
                        "missing index {index} for output `{output_name}` of execution \
                         {execution_id}"
                    ))
                })?;
                let type_id = record.type_id.ok_or(StoreError::MissingId {
                    entity: "artifact type",
                })?;
                let artifact_type = self
                    .store
                    .get_artifact_types_by_id(&[type_id])
                    .await?
                    .into_iter()
                    .next()
                    .ok_or(StoreError::NotFound {
                        entity: "artifact type",
                        detail: format!("id {type_id}"),
                    })?;
                output.set_artifact_type(artifact_type);
                output.set_record(record.clone());
            }
        }
        Ok(output_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn execution(run_id: Option<&str>, state: &str, lr: &str) -> ExecutionRecord {
        let mut execution = ExecutionRecord {
            type_id: Some(1),
            ..ExecutionRecord::default()
        };
        execution
            .properties
            .insert("state".to_string(), PropertyValue::from(state));
        execution
            .properties
            .insert("lr".to_string(), PropertyValue::from(lr));
        if let Some(run_id) = run_id {
            execution
                .properties
                .insert("run_id".to_string(), PropertyValue::from(run_id));
        }
        execution
    }

    #[test]
    fn test_eligibility_ignores_run_id() {
        let expected = execution(Some("r2"), "complete", "0.1");
        let mut candidate = execution(Some("r1"), "complete", "0.1");
        candidate.id = Some(7);
        assert!(CacheResolver::is_eligible_previous_execution(
            &expected, &candidate
        ));
    }

    #[test]
    fn test_eligibility_ignores_candidate_id() {
        let expected = execution(None, "complete", "0.1");
        let mut candidate = execution(None, "complete", "0.1");
        candidate.id = Some(99);
        assert!(CacheResolver::is_eligible_previous_execution(
            &expected, &candidate
        ));
    }

    #[test]
    fn test_eligibility_rejects_new_state() {
        let expected = execution(Some("r2"), "complete", "0.1");
        let mut candidate = execution(Some("r1"), "new", "0.1");
        candidate.id = Some(7);
        assert!(!CacheResolver::is_eligible_previous_execution(
            &expected, &candidate
        ));
    }

    #[test]
    fn test_eligibility_rejects_property_difference() {
        let expected = execution(Some("r2"), "complete", "0.1");
        let mut candidate = execution(Some("r1"), "complete", "0.2");
        candidate.id = Some(7);
        assert!(!CacheResolver::is_eligible_previous_execution(
            &expected, &candidate
        ));
    }

    #[test]
    fn test_eligibility_rejects_type_difference() {
        let expected = execution(Some("r2"), "complete", "0.1");
        let mut candidate = execution(Some("r1"), "complete", "0.1");
        candidate.id = Some(7);
        candidate.type_id = Some(2);
        assert!(!CacheResolver::is_eligible_previous_execution(
            &expected, &candidate
        ));
    }

    #[test]
    fn test_eligibility_with_absent_run_id_on_one_side() {
        // Clearing writes an empty run_id onto both sides, so a runless
        // candidate still compares equal to a run-scoped template.
        let expected = execution(Some("r2"), "complete", "0.1");
        let mut candidate = execution(None, "complete", "0.1");
        candidate.id = Some(7);
        assert!(CacheResolver::is_eligible_previous_execution(
            &expected, &candidate
        ));
        assert_eq!(
            execution(None, "complete", "0.1").properties.get("run_id"),
            None
        );
    }
}
