//! Client-side artifact handle.
//!
//! An [`Artifact`] couples a store record with its resolved
//! [`ArtifactType`]. Steps build artifacts before execution; the
//! publisher assigns their persistent identity and transitions their
//! lifecycle state. Artifacts are never deleted by this layer.

use serde::{Deserialize, Serialize};

use crate::properties::PropertyValue;
use crate::store::{ArtifactRecord, ArtifactType};

/// Lifecycle state of an artifact that has been created but not yet
/// published.
pub const ARTIFACT_STATE_NEW: &str = "new";
/// Lifecycle state of an artifact whose producing execution completed.
pub const ARTIFACT_STATE_PUBLISHED: &str = "published";

/// Name of the lifecycle state property.
pub const ARTIFACT_PROPERTY_STATE: &str = "state";

/// A typed, URI-addressed data unit produced or consumed by an
/// execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    artifact_type: ArtifactType,
    record: ArtifactRecord,
}

impl Artifact {
    /// Creates an artifact of the given type with no uri and no
    /// persistent identity.
    #[must_use]
    pub fn new(artifact_type: ArtifactType) -> Self {
        let record = ArtifactRecord {
            type_id: artifact_type.id,
            ..ArtifactRecord::default()
        };
        Self {
            artifact_type,
            record,
        }
    }

    /// Sets the uri.
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.record.uri = uri.into();
        self
    }

    /// Store-assigned id, unset until persisted.
    #[must_use]
    pub fn id(&self) -> Option<i64> {
        self.record.id
    }

    /// Records the store-assigned id.
    pub fn set_id(&mut self, id: i64) {
        self.record.id = Some(id);
    }

    /// The artifact's location.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.record.uri
    }

    /// The resolved artifact type.
    #[must_use]
    pub fn artifact_type(&self) -> &ArtifactType {
        &self.artifact_type
    }

    /// Id of the registered type, unset until the type is resolved.
    #[must_use]
    pub fn type_id(&self) -> Option<i64> {
        self.record.type_id
    }

    /// Replaces the resolved type and keeps the record's type reference
    /// in sync.
    pub fn set_artifact_type(&mut self, artifact_type: ArtifactType) {
        self.record.type_id = artifact_type.id;
        self.artifact_type = artifact_type;
    }

    /// The underlying store record.
    #[must_use]
    pub fn record(&self) -> &ArtifactRecord {
        &self.record
    }

    /// Replaces the underlying store record, e.g. with one fetched from
    /// a previous run.
    pub fn set_record(&mut self, record: ArtifactRecord) {
        self.record = record;
    }

    /// Current lifecycle state, from whichever property slot holds it.
    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.record
            .properties
            .get(ARTIFACT_PROPERTY_STATE)
            .or_else(|| self.record.custom_properties.get(ARTIFACT_PROPERTY_STATE))
            .and_then(PropertyValue::string_value)
    }

    /// Sets the lifecycle state.
    ///
    /// Uses the well-known `state` property slot when the artifact's
    /// type declares one, else a custom property.
    pub fn set_state(&mut self, state: &str) {
        let value = PropertyValue::from(state);
        if self
            .artifact_type
            .properties
            .contains_key(ARTIFACT_PROPERTY_STATE)
        {
            self.record
                .properties
                .insert(ARTIFACT_PROPERTY_STATE.to_string(), value);
        } else {
            self.record
                .custom_properties
                .insert(ARTIFACT_PROPERTY_STATE.to_string(), value);
        }
    }

    /// Sets a typed property declared by the artifact's schema.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.record.properties.insert(key.into(), value.into());
    }

    /// Sets a free-form property outside the schema.
    pub fn set_custom_property(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) {
        self.record
            .custom_properties
            .insert(key.into(), value.into());
    }

    /// Reads a property, checking the typed bag first.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.record
            .properties
            .get(key)
            .or_else(|| self.record.custom_properties.get(key))
    }
}
