//! Builders for common test inputs.

use crate::artifact::Artifact;
use crate::info::{ComponentInfo, PipelineInfo};
use crate::properties::{PropertyMap, PropertyValue};
use crate::store::ArtifactType;

/// Builds a text property map from key/value pairs.
#[must_use]
pub fn properties(pairs: &[(&str, &str)]) -> PropertyMap {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_string(), PropertyValue::from(*value)))
        .collect()
}

/// Builds an unpersisted artifact of a fresh type.
#[must_use]
pub fn new_artifact(type_name: &str, uri: &str) -> Artifact {
    Artifact::new(ArtifactType::new(type_name)).with_uri(uri)
}

/// Builds a run-scoped pipeline/component identity pair.
#[must_use]
pub fn run_identity(
    pipeline_name: &str,
    run_id: &str,
    component_type: &str,
    component_id: &str,
) -> (PipelineInfo, ComponentInfo) {
    (
        PipelineInfo::new(pipeline_name, format!("/data/{pipeline_name}")).with_run_id(run_id),
        ComponentInfo::new(component_type, component_id),
    )
}
