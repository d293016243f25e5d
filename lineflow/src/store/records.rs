//! Record types exchanged with the metadata store.
//!
//! Ids are store-assigned and therefore optional on the client side: a
//! record without an id has not been persisted yet. Once assigned, an id
//! is immutable and all later references use it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::properties::{PropertyMap, PropertySchema};

/// A named schema for artifacts of one type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactType {
    /// Store-assigned type id, unset until registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Unique type name.
    pub name: String,

    /// Mapping from property name to primitive kind. Grow-only.
    pub properties: PropertySchema,
}

impl ArtifactType {
    /// Creates an unregistered artifact type with an empty schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            properties: PropertySchema::new(),
        }
    }

    /// Adds a property to the schema.
    #[must_use]
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        property_type: crate::properties::PropertyType,
    ) -> Self {
        self.properties.insert(name.into(), property_type);
        self
    }
}

/// A named schema for executions of one type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionType {
    /// Store-assigned type id, unset until registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Unique type name.
    pub name: String,

    /// Mapping from property name to primitive kind. Grow-only.
    pub properties: PropertySchema,
}

impl ExecutionType {
    /// Creates an unregistered execution type with an empty schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            properties: PropertySchema::new(),
        }
    }
}

/// A named schema for contexts of one type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextType {
    /// Store-assigned type id, unset until registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Unique type name.
    pub name: String,

    /// Mapping from property name to primitive kind. Grow-only.
    pub properties: PropertySchema,
}

impl ContextType {
    /// Creates an unregistered context type with an empty schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            properties: PropertySchema::new(),
        }
    }
}

/// A persisted artifact: a typed, URI-addressed data unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Store-assigned id, unset until persisted. Immutable once assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Id of the registered [`ArtifactType`] this artifact conforms to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_id: Option<i64>,

    /// Location of the artifact payload.
    pub uri: String,

    /// Properties declared by the artifact's type schema.
    pub properties: PropertyMap,

    /// Free-form properties outside the type schema.
    pub custom_properties: PropertyMap,
}

/// A persisted execution: one run of a pipeline step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Store-assigned id, unset until persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Id of the registered [`ExecutionType`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_id: Option<i64>,

    /// Properties declared by the execution's type schema, including the
    /// `state` property this layer maintains.
    pub properties: PropertyMap,

    /// Free-form properties outside the type schema.
    pub custom_properties: PropertyMap,
}

/// A persisted context: a named grouping for lineage queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    /// Store-assigned id, unset until persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Id of the registered [`ContextType`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_id: Option<i64>,

    /// Unique name within the context type, deterministically derived
    /// from pipeline / run / component identity.
    pub name: String,

    /// Identifying properties (pipeline name, run id, component id,
    /// depending on level).
    pub properties: PropertyMap,
}

/// The direction of an event linking an execution to an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// The execution consumed the artifact.
    Input,
    /// The execution declared the artifact as an input without reading it.
    DeclaredInput,
    /// The execution produced the artifact.
    Output,
}

impl EventType {
    /// Returns true for input-side events (INPUT and DECLARED_INPUT),
    /// which is the set the cache input-equality test considers.
    #[must_use]
    pub fn is_input(self) -> bool {
        matches!(self, Self::Input | Self::DeclaredInput)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::DeclaredInput => write!(f, "declared_input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// The named, ordered slot an event occupies.
///
/// The pair (key, index) uniquely identifies one position within a
/// possibly multi-valued input or output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventPath {
    /// The input/output name declared by the step.
    pub key: String,
    /// The ordinal position within that name.
    pub index: usize,
}

/// An immutable fact linking one execution to one artifact.
///
/// Events are append-only and are the sole source of truth for what an
/// execution consumed and produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Id of the execution side of the link.
    pub execution_id: i64,
    /// Id of the artifact side of the link.
    pub artifact_id: i64,
    /// The named, ordered slot.
    pub path: EventPath,
    /// The direction of the link.
    pub event_type: EventType,
}

impl Event {
    /// Creates an event for the given slot.
    #[must_use]
    pub fn new(
        execution_id: i64,
        artifact_id: i64,
        key: impl Into<String>,
        index: usize,
        event_type: EventType,
    ) -> Self {
        Self {
            execution_id,
            artifact_id,
            path: EventPath {
                key: key.into(),
                index,
            },
            event_type,
        }
    }
}
