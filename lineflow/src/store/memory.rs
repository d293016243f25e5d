//! In-memory metadata store for tests and embedded runs.
//!
//! Semantics mirror the transactional store this layer targets in
//! production: atomic per-call batch writes, grow-only type evolution,
//! duplicate detection on (type, name) context inserts, and monotonically
//! increasing ids per entity table.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::interface::{ContextInsert, MetadataStore, StoreError};
use super::records::{
    ArtifactRecord, ArtifactType, ContextRecord, ContextType, Event, ExecutionRecord,
    ExecutionType,
};
use crate::properties::{format_schema, PropertySchema};

#[derive(Debug, Default)]
struct Tables {
    artifact_types: BTreeMap<i64, ArtifactType>,
    execution_types: BTreeMap<i64, ExecutionType>,
    context_types: BTreeMap<i64, ContextType>,
    artifacts: BTreeMap<i64, ArtifactRecord>,
    executions: BTreeMap<i64, ExecutionRecord>,
    contexts: BTreeMap<i64, ContextRecord>,
    /// (context_id, execution_id) attribution pairs.
    attributions: Vec<(i64, i64)>,
    events: Vec<Event>,
    next_type_id: i64,
    next_artifact_id: i64,
    next_execution_id: i64,
    next_context_id: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// Applies a grow-only schema evolution, rejecting retyped or omitted
/// properties. New properties require `can_add_fields`.
fn evolve_schema(
    type_name: &str,
    existing: &mut PropertySchema,
    requested: &PropertySchema,
    can_add_fields: bool,
) -> Result<(), StoreError> {
    let mismatch = || StoreError::SchemaMismatch {
        type_name: type_name.to_string(),
        existing: format_schema(existing),
        requested: format_schema(requested),
    };

    let mut added = Vec::new();
    for (key, kind) in requested {
        match existing.get(key) {
            Some(existing_kind) if existing_kind != kind => return Err(mismatch()),
            Some(_) => {}
            None => added.push((key.clone(), *kind)),
        }
    }
    // Omitting an already-registered property is a conflict; this layer
    // never requests can_omit_fields semantics.
    if existing.keys().any(|key| !requested.contains_key(key)) {
        return Err(mismatch());
    }
    if !added.is_empty() && !can_add_fields {
        return Err(mismatch());
    }
    existing.extend(added);
    Ok(())
}

/// A [`MetadataStore`] backed by in-process tables.
///
/// Shared across "connections" through [`super::InMemoryConnector`], so
/// concurrent pipeline runs against the same configured target observe
/// the same state.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    tables: RwLock<Tables>,
}

impl InMemoryMetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn put_artifact_type(
        &self,
        artifact_type: ArtifactType,
        can_add_fields: bool,
    ) -> Result<i64, StoreError> {
        let mut tables = self.tables.write();
        if let Some((id, existing)) = tables
            .artifact_types
            .iter_mut()
            .find(|(_, t)| t.name == artifact_type.name)
        {
            let id = *id;
            evolve_schema(
                &artifact_type.name,
                &mut existing.properties,
                &artifact_type.properties,
                can_add_fields,
            )?;
            return Ok(id);
        }
        let id = next_id(&mut tables.next_type_id);
        let mut artifact_type = artifact_type;
        artifact_type.id = Some(id);
        tables.artifact_types.insert(id, artifact_type);
        Ok(id)
    }

    async fn get_artifact_types_by_id(
        &self,
        type_ids: &[i64],
    ) -> Result<Vec<ArtifactType>, StoreError> {
        let tables = self.tables.read();
        type_ids
            .iter()
            .map(|id| {
                tables
                    .artifact_types
                    .get(id)
                    .cloned()
                    .ok_or(StoreError::NotFound {
                        entity: "artifact type",
                        detail: format!("id {id}"),
                    })
            })
            .collect()
    }

    async fn put_execution_type(
        &self,
        execution_type: ExecutionType,
        can_add_fields: bool,
    ) -> Result<i64, StoreError> {
        let mut tables = self.tables.write();
        if let Some((id, existing)) = tables
            .execution_types
            .iter_mut()
            .find(|(_, t)| t.name == execution_type.name)
        {
            let id = *id;
            evolve_schema(
                &execution_type.name,
                &mut existing.properties,
                &execution_type.properties,
                can_add_fields,
            )?;
            return Ok(id);
        }
        let id = next_id(&mut tables.next_type_id);
        let mut execution_type = execution_type;
        execution_type.id = Some(id);
        tables.execution_types.insert(id, execution_type);
        Ok(id)
    }

    async fn get_execution_type(
        &self,
        type_name: &str,
    ) -> Result<Option<ExecutionType>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .execution_types
            .values()
            .find(|t| t.name == type_name)
            .cloned())
    }

    async fn put_context_type(
        &self,
        context_type: ContextType,
        can_add_fields: bool,
    ) -> Result<i64, StoreError> {
        let mut tables = self.tables.write();
        if let Some((id, existing)) = tables
            .context_types
            .iter_mut()
            .find(|(_, t)| t.name == context_type.name)
        {
            let id = *id;
            evolve_schema(
                &context_type.name,
                &mut existing.properties,
                &context_type.properties,
                can_add_fields,
            )?;
            return Ok(id);
        }
        let id = next_id(&mut tables.next_type_id);
        let mut context_type = context_type;
        context_type.id = Some(id);
        tables.context_types.insert(id, context_type);
        Ok(id)
    }

    async fn put_artifacts(&self, artifacts: Vec<ArtifactRecord>) -> Result<Vec<i64>, StoreError> {
        let mut tables = self.tables.write();
        // Validate the whole batch before mutating; the call is atomic.
        for artifact in &artifacts {
            match artifact.id {
                Some(id) if !tables.artifacts.contains_key(&id) => {
                    return Err(StoreError::NotFound {
                        entity: "artifact",
                        detail: format!("id {id}"),
                    });
                }
                _ => {}
            }
            let type_id = artifact.type_id.ok_or_else(|| {
                StoreError::Invalid("artifact insert requires a type id".to_string())
            })?;
            if !tables.artifact_types.contains_key(&type_id) {
                return Err(StoreError::NotFound {
                    entity: "artifact type",
                    detail: format!("id {type_id}"),
                });
            }
        }
        let mut ids = Vec::with_capacity(artifacts.len());
        for mut artifact in artifacts {
            let id = match artifact.id {
                Some(id) => id,
                None => {
                    let id = next_id(&mut tables.next_artifact_id);
                    artifact.id = Some(id);
                    id
                }
            };
            tables.artifacts.insert(id, artifact);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn get_artifacts(&self) -> Result<Vec<ArtifactRecord>, StoreError> {
        Ok(self.tables.read().artifacts.values().cloned().collect())
    }

    async fn get_artifacts_by_id(
        &self,
        artifact_ids: &[i64],
    ) -> Result<Vec<ArtifactRecord>, StoreError> {
        let tables = self.tables.read();
        artifact_ids
            .iter()
            .map(|id| {
                tables
                    .artifacts
                    .get(id)
                    .cloned()
                    .ok_or(StoreError::NotFound {
                        entity: "artifact",
                        detail: format!("id {id}"),
                    })
            })
            .collect()
    }

    async fn get_artifacts_by_uri(&self, uri: &str) -> Result<Vec<ArtifactRecord>, StoreError> {
        Ok(self
            .tables
            .read()
            .artifacts
            .values()
            .filter(|a| a.uri == uri)
            .cloned()
            .collect())
    }

    async fn get_artifacts_by_type(
        &self,
        type_name: &str,
    ) -> Result<Vec<ArtifactRecord>, StoreError> {
        let tables = self.tables.read();
        let Some(type_id) = tables
            .artifact_types
            .values()
            .find(|t| t.name == type_name)
            .and_then(|t| t.id)
        else {
            return Ok(Vec::new());
        };
        Ok(tables
            .artifacts
            .values()
            .filter(|a| a.type_id == Some(type_id))
            .cloned()
            .collect())
    }

    async fn put_execution(
        &self,
        execution: ExecutionRecord,
        events: Vec<Event>,
        context_ids: Vec<i64>,
    ) -> Result<i64, StoreError> {
        let mut tables = self.tables.write();
        let type_id = execution.type_id.ok_or_else(|| {
            StoreError::Invalid("execution insert requires a type id".to_string())
        })?;
        if !tables.execution_types.contains_key(&type_id) {
            return Err(StoreError::NotFound {
                entity: "execution type",
                detail: format!("id {type_id}"),
            });
        }
        for context_id in &context_ids {
            if !tables.contexts.contains_key(context_id) {
                return Err(StoreError::NotFound {
                    entity: "context",
                    detail: format!("id {context_id}"),
                });
            }
        }
        for event in &events {
            if !tables.artifacts.contains_key(&event.artifact_id) {
                return Err(StoreError::NotFound {
                    entity: "artifact",
                    detail: format!("id {}", event.artifact_id),
                });
            }
        }
        let id = next_id(&mut tables.next_execution_id);
        let mut execution = execution;
        execution.id = Some(id);
        tables.executions.insert(id, execution);
        for context_id in context_ids {
            tables.attributions.push((context_id, id));
        }
        for mut event in events {
            event.execution_id = id;
            tables.events.push(event);
        }
        Ok(id)
    }

    async fn put_executions(
        &self,
        executions: Vec<ExecutionRecord>,
    ) -> Result<Vec<i64>, StoreError> {
        let mut tables = self.tables.write();
        for execution in &executions {
            match execution.id {
                Some(id) if !tables.executions.contains_key(&id) => {
                    return Err(StoreError::NotFound {
                        entity: "execution",
                        detail: format!("id {id}"),
                    });
                }
                _ => {}
            }
            let type_id = execution.type_id.ok_or_else(|| {
                StoreError::Invalid("execution insert requires a type id".to_string())
            })?;
            if !tables.execution_types.contains_key(&type_id) {
                return Err(StoreError::NotFound {
                    entity: "execution type",
                    detail: format!("id {type_id}"),
                });
            }
        }
        let mut ids = Vec::with_capacity(executions.len());
        for mut execution in executions {
            let id = match execution.id {
                Some(id) => id,
                None => {
                    let id = next_id(&mut tables.next_execution_id);
                    execution.id = Some(id);
                    id
                }
            };
            tables.executions.insert(id, execution);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn get_executions_by_id(
        &self,
        execution_ids: &[i64],
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let tables = self.tables.read();
        execution_ids
            .iter()
            .map(|id| {
                tables
                    .executions
                    .get(id)
                    .cloned()
                    .ok_or(StoreError::NotFound {
                        entity: "execution",
                        detail: format!("id {id}"),
                    })
            })
            .collect()
    }

    async fn get_executions_by_context(
        &self,
        context_id: i64,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .attributions
            .iter()
            .filter(|(cid, _)| *cid == context_id)
            .filter_map(|(_, eid)| tables.executions.get(eid).cloned())
            .collect())
    }

    async fn put_events(&self, events: Vec<Event>) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        for event in &events {
            if !tables.executions.contains_key(&event.execution_id) {
                return Err(StoreError::NotFound {
                    entity: "execution",
                    detail: format!("id {}", event.execution_id),
                });
            }
            if !tables.artifacts.contains_key(&event.artifact_id) {
                return Err(StoreError::NotFound {
                    entity: "artifact",
                    detail: format!("id {}", event.artifact_id),
                });
            }
        }
        tables.events.extend(events);
        Ok(())
    }

    async fn get_events_by_execution_ids(
        &self,
        execution_ids: &[i64],
    ) -> Result<Vec<Event>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .events
            .iter()
            .filter(|e| execution_ids.contains(&e.execution_id))
            .cloned()
            .collect())
    }

    async fn put_context(&self, context: ContextRecord) -> Result<ContextInsert, StoreError> {
        let mut tables = self.tables.write();
        let type_id = context
            .type_id
            .ok_or_else(|| StoreError::Invalid("context insert requires a type id".to_string()))?;
        if !tables.context_types.contains_key(&type_id) {
            return Err(StoreError::NotFound {
                entity: "context type",
                detail: format!("id {type_id}"),
            });
        }
        let duplicate = tables
            .contexts
            .values()
            .any(|c| c.type_id == Some(type_id) && c.name == context.name);
        if duplicate {
            return Ok(ContextInsert::Duplicate);
        }
        let id = next_id(&mut tables.next_context_id);
        let mut context = context;
        context.id = Some(id);
        tables.contexts.insert(id, context);
        Ok(ContextInsert::Created(id))
    }

    async fn get_context_by_type_and_name(
        &self,
        type_name: &str,
        context_name: &str,
    ) -> Result<Option<ContextRecord>, StoreError> {
        let tables = self.tables.read();
        let Some(type_id) = tables
            .context_types
            .values()
            .find(|t| t.name == type_name)
            .and_then(|t| t.id)
        else {
            return Ok(None);
        };
        Ok(tables
            .contexts
            .values()
            .find(|c| c.type_id == Some(type_id) && c.name == context_name)
            .cloned())
    }

    async fn get_contexts_by_type(
        &self,
        type_name: &str,
    ) -> Result<Vec<ContextRecord>, StoreError> {
        let tables = self.tables.read();
        let Some(type_id) = tables
            .context_types
            .values()
            .find(|t| t.name == type_name)
            .and_then(|t| t.id)
        else {
            return Ok(Vec::new());
        };
        Ok(tables
            .contexts
            .values()
            .filter(|c| c.type_id == Some(type_id))
            .cloned()
            .collect())
    }
}
