//! Artifact upserts and lifecycle state transitions.
//!
//! The batch upsert is the only path by which artifacts acquire
//! persistent identity: assigned ids are copied back onto the caller's
//! handles so later code (event construction in particular) can
//! reference them by value.

use std::sync::Arc;
use tracing::debug;

use super::type_registry::TypeRegistry;
use crate::artifact::{Artifact, ARTIFACT_STATE_PUBLISHED};
use crate::errors::MetadataError;
use crate::store::MetadataStore;

/// Writes artifacts to the store and transitions their state.
#[derive(Clone)]
pub struct ArtifactPublisher {
    store: Arc<dyn MetadataStore>,
    types: TypeRegistry,
}

impl ArtifactPublisher {
    /// Creates a publisher over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        let types = TypeRegistry::new(store.clone());
        Self { store, types }
    }

    /// Updates or inserts artifacts with the given state.
    ///
    /// Artifacts without a resolved type get one registered first; the
    /// whole batch is then written in one call and the assigned ids are
    /// copied back onto the handles.
    pub async fn upsert_artifacts(
        &self,
        artifacts: &mut [Artifact],
        state: &str,
    ) -> Result<(), MetadataError> {
        for artifact in artifacts.iter_mut() {
            if artifact.type_id().is_none() {
                let resolved = self
                    .types
                    .resolve_artifact_type(artifact.artifact_type())
                    .await?;
                artifact.set_artifact_type(resolved);
            }
            artifact.set_state(state);
        }
        let records = artifacts
            .iter()
            .map(|artifact| artifact.record().clone())
            .collect();
        let artifact_ids = self.store.put_artifacts(records).await?;
        for (artifact, artifact_id) in artifacts.iter_mut().zip(artifact_ids) {
            artifact.set_id(artifact_id);
        }
        debug!("Upserted {} artifacts with state {state}", artifacts.len());
        Ok(())
    }

    /// Publishes artifacts: an upsert with the `published` state.
    pub async fn publish_artifacts(&self, artifacts: &mut [Artifact]) -> Result<(), MetadataError> {
        self.upsert_artifacts(artifacts, ARTIFACT_STATE_PUBLISHED)
            .await
    }

    /// Updates the state of an already-persisted artifact.
    pub async fn update_artifact_state(
        &self,
        artifact: &mut Artifact,
        new_state: &str,
    ) -> Result<(), MetadataError> {
        if artifact.id().is_none() {
            return Err(MetadataError::MissingArtifactId {
                context: format!("state update of artifact at `{}`", artifact.uri()),
            });
        }
        artifact.set_state(new_state);
        self.store
            .put_artifacts(vec![artifact.record().clone()])
            .await?;
        Ok(())
    }
}
