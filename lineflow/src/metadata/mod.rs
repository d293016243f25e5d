//! The metadata client layer.
//!
//! [`Metadata`] is a scoped handle over a connected store, wiring the
//! five components of this layer (type registry, context manager,
//! artifact publisher, execution recorder, cache resolver) and
//! exposing the operation set pipeline steps call. The store connection
//! is acquired at the start of a unit of work and released when the
//! handle drops, regardless of outcome.

mod artifact_publisher;
mod cache_resolver;
mod context_manager;
mod execution_recorder;
mod queries;
mod type_registry;


pub use artifact_publisher::ArtifactPublisher;
pub use cache_resolver::{CacheResolver, MAX_EXECUTIONS_FOR_CACHE};
pub use context_manager::{
    ContextManager, CONTEXT_KEY_COMPONENT_ID, CONTEXT_KEY_PIPELINE_NAME, CONTEXT_KEY_RUN_ID,
    CONTEXT_TYPE_COMPONENT_RUN, CONTEXT_TYPE_PIPELINE, CONTEXT_TYPE_PIPELINE_RUN,
};
pub use execution_recorder::{
    ExecutionRecorder, EXECUTION_STATE_CACHED, EXECUTION_STATE_COMPLETE, EXECUTION_STATE_NEW,
};
pub use type_registry::{
    TypeRegistry, EXECUTION_TYPE_KEY_CHECKSUM, EXECUTION_TYPE_KEY_COMPONENT_ID,
    EXECUTION_TYPE_KEY_PIPELINE_NAME, EXECUTION_TYPE_KEY_PIPELINE_ROOT, EXECUTION_TYPE_KEY_RUN_ID,
    EXECUTION_TYPE_KEY_STATE, EXECUTION_TYPE_RESERVED_KEYS, MODULE_FILE_KEY,
};

use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::artifact::Artifact;
use crate::errors::MetadataError;
use crate::info::{ComponentInfo, PipelineInfo};
use crate::properties::PropertyMap;
use crate::store::{
    ConnectionConfig, ContextRecord, MetadataStore, StoreConnector, StoreError,
};

/// Named, ordered artifact collections keyed by input/output name.
pub type ArtifactMap = BTreeMap<String, Vec<Artifact>>;

/// Number of times connection establishment is attempted before the
/// failure is reported to the caller.
pub const MAX_CONNECT_RETRY: usize = 10;

/// Handle over a connected metadata store.
#[derive(Clone)]
pub struct Metadata {
    store: Arc<dyn MetadataStore>,
    contexts: ContextManager,
    artifacts: ArtifactPublisher,
    executions: ExecutionRecorder,
    cache: CacheResolver,
}

impl std::fmt::Debug for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metadata").finish_non_exhaustive()
    }
}

impl Metadata {
    /// Wraps an already-open store.
    #[must_use]
    pub fn with_store(store: Arc<dyn MetadataStore>) -> Self {
        let contexts = ContextManager::new(store.clone());
        let artifacts = ArtifactPublisher::new(store.clone());
        let executions = ExecutionRecorder::new(store.clone());
        let cache = CacheResolver::new(store.clone());
        Self {
            store,
            contexts,
            artifacts,
            executions,
            cache,
        }
    }

    /// Opens the store the config addresses, retrying transient
    /// failures.
    ///
    /// Concurrent processes racing to run first-time initialization DDL
    /// against a shared store can make establishment fail transiently;
    /// each such failure sleeps a random sub-second backoff before the
    /// next attempt, up to [`MAX_CONNECT_RETRY`] attempts in total.
    pub async fn connect(
        connector: &dyn StoreConnector,
        config: &ConnectionConfig,
    ) -> Result<Self, MetadataError> {
        let mut last_reason = String::new();
        for attempt in 1..=MAX_CONNECT_RETRY {
            match connector.open(config).await {
                Ok(store) => return Ok(Self::with_store(store)),
                Err(StoreError::Unavailable(reason)) => {
                    debug!("Connection attempt {attempt} failed: {reason}");
                    last_reason = reason;
                    let backoff_ms: u64 = rand::thread_rng().gen_range(0..1000);
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(MetadataError::Connection {
            attempts: MAX_CONNECT_RETRY,
            reason: last_reason,
        })
    }

    /// The underlying store handle.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// The context manager component.
    #[must_use]
    pub fn context_manager(&self) -> &ContextManager {
        &self.contexts
    }

    /// The artifact publisher component.
    #[must_use]
    pub fn artifact_publisher(&self) -> &ArtifactPublisher {
        &self.artifacts
    }

    /// The execution recorder component.
    #[must_use]
    pub fn execution_recorder(&self) -> &ExecutionRecorder {
        &self.executions
    }

    /// The cache resolver component.
    #[must_use]
    pub fn cache_resolver(&self) -> &CacheResolver {
        &self.cache
    }

    /// Creates or fetches the contexts needed for a component run. See
    /// [`ContextManager::register_contexts`].
    pub async fn register_contexts(
        &self,
        pipeline_info: &PipelineInfo,
        component_info: &ComponentInfo,
    ) -> Result<Vec<ContextRecord>, MetadataError> {
        self.contexts
            .register_contexts(pipeline_info, component_info)
            .await
    }

    /// Creates a new execution. See
    /// [`ExecutionRecorder::register_execution`].
    pub async fn register_execution(
        &self,
        exec_properties: &PropertyMap,
        pipeline_info: &PipelineInfo,
        component_info: &ComponentInfo,
        contexts: &[ContextRecord],
    ) -> Result<i64, MetadataError> {
        self.executions
            .register_execution(exec_properties, pipeline_info, component_info, contexts)
            .await
    }

    /// Publishes an execution with its inputs and outputs. See
    /// [`ExecutionRecorder::publish_execution`].
    pub async fn publish_execution(
        &self,
        execution_id: i64,
        input_map: &ArtifactMap,
        output_map: ArtifactMap,
        state: &str,
    ) -> Result<ArtifactMap, MetadataError> {
        self.executions
            .publish_execution(execution_id, input_map, output_map, state)
            .await
    }

    /// Publishes artifacts. See
    /// [`ArtifactPublisher::publish_artifacts`].
    pub async fn publish_artifacts(&self, artifacts: &mut [Artifact]) -> Result<(), MetadataError> {
        self.artifacts.publish_artifacts(artifacts).await
    }

    /// Updates the state of a persisted artifact. See
    /// [`ArtifactPublisher::update_artifact_state`].
    pub async fn update_artifact_state(
        &self,
        artifact: &mut Artifact,
        new_state: &str,
    ) -> Result<(), MetadataError> {
        self.artifacts.update_artifact_state(artifact, new_state).await
    }

    /// Finds a previous equivalent execution. See
    /// [`CacheResolver::previous_execution`].
    pub async fn previous_execution(
        &self,
        input_artifacts: &ArtifactMap,
        exec_properties: &PropertyMap,
        pipeline_info: &PipelineInfo,
        component_info: &ComponentInfo,
    ) -> Result<Option<i64>, MetadataError> {
        self.cache
            .previous_execution(input_artifacts, exec_properties, pipeline_info, component_info)
            .await
    }

    /// Reconstructs a cached execution's outputs. See
    /// [`CacheResolver::fetch_previous_result_artifacts`].
    pub async fn fetch_previous_result_artifacts(
        &self,
        output_map: ArtifactMap,
        execution_id: i64,
    ) -> Result<ArtifactMap, MetadataError> {
        self.cache
            .fetch_previous_result_artifacts(output_map, execution_id)
            .await
    }

    /// Gets the pipeline-level context.
    pub async fn get_pipeline_context(
        &self,
        pipeline_info: &PipelineInfo,
    ) -> Result<Option<ContextRecord>, MetadataError> {
        self.contexts.get_pipeline_context(pipeline_info).await
    }

    /// Gets the pipeline-run-level context.
    pub async fn get_pipeline_run_context(
        &self,
        pipeline_info: &PipelineInfo,
    ) -> Result<Option<ContextRecord>, MetadataError> {
        self.contexts.get_pipeline_run_context(pipeline_info).await
    }

    /// Gets the component-run-level context.
    pub async fn get_component_run_context(
        &self,
        pipeline_info: &PipelineInfo,
        component_info: &ComponentInfo,
    ) -> Result<Option<ContextRecord>, MetadataError> {
        self.contexts
            .get_component_run_context(pipeline_info, component_info)
            .await
    }
}
