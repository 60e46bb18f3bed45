use crate::GraphAdapter;
use async_trait::async_trait;
use codegraph_core::{
    Entity, EntityId, EntityKind, Justification, JustifyError, Relationship, RelationshipKind,
    Result,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Reference `GraphAdapter` implementation backed entirely by in-process
/// maps. This is the substrate the pipeline is tested against (§4.1), and
/// doubles as a usable default for callers who have no external graph
/// storage engine wired up yet.
#[derive(Default)]
pub struct InMemoryGraphAdapter {
    entities: DashMap<EntityId, Entity>,
    relationships: DashMap<RelationshipKind, Vec<Relationship>>,
    justifications: DashMap<EntityId, Justification>,
}

impl InMemoryGraphAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let adapter = Self::new();
        for entity in entities {
            adapter.entities.insert(entity.id, entity);
        }
        adapter
    }

    pub fn add_entity(&self, entity: Entity) {
        self.entities.insert(entity.id, entity);
    }

    /// Adds a relationship, dropping it silently if either endpoint is not
    /// in the indexed entity set (§4.2 "External references ... are
    /// dropped").
    pub fn add_relationship(&self, relationship: Relationship) {
        if !self.entities.contains_key(&relationship.from)
            || !self.entities.contains_key(&relationship.to)
        {
            return;
        }
        self.relationships
            .entry(relationship.kind)
            .or_default()
            .push(relationship);
    }
}

#[async_trait]
impl GraphAdapter for InMemoryGraphAdapter {
    async fn list_entities_by_kind(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        Ok(self
            .entities
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn list_all_entities(&self) -> Result<Vec<Entity>> {
        Ok(self.entities.iter().map(|e| e.value().clone()).collect())
    }

    async fn get_entity(&self, id: EntityId) -> Result<Option<Entity>> {
        Ok(self.entities.get(&id).map(|e| e.value().clone()))
    }

    async fn get_relationships(&self, kind: RelationshipKind) -> Result<Vec<Relationship>> {
        Ok(self
            .relationships
            .get(&kind)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    async fn get_all_relationships(&self) -> Result<Vec<Relationship>> {
        Ok(self
            .relationships
            .iter()
            .flat_map(|r| r.value().clone())
            .collect())
    }

    async fn get_justification(&self, entity_id: EntityId) -> Result<Option<Justification>> {
        Ok(self.justifications.get(&entity_id).map(|j| j.value().clone()))
    }

    async fn get_justifications(
        &self,
        ids: &[EntityId],
    ) -> Result<HashMap<EntityId, Justification>> {
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.justifications
                    .get(id)
                    .map(|j| (*id, j.value().clone()))
            })
            .collect())
    }

    async fn get_by_file(&self, path: &str) -> Result<Vec<Entity>> {
        Ok(self
            .entities
            .iter()
            .filter(|e| e.file_path == path)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn upsert_justification(&self, record: Justification) -> Result<()> {
        self.justifications.insert(record.entity_id, record);
        Ok(())
    }

    async fn delete_justification(
        &self,
        entity_id: Option<EntityId>,
        file: Option<&str>,
    ) -> Result<()> {
        match (entity_id, file) {
            (Some(id), _) => {
                self.justifications.remove(&id);
                Ok(())
            }
            (None, Some(path)) => {
                let ids: Vec<EntityId> = self
                    .entities
                    .iter()
                    .filter(|e| e.file_path == path)
                    .map(|e| e.id)
                    .collect();
                for id in ids {
                    self.justifications.remove(&id);
                }
                Ok(())
            }
            (None, None) => Err(JustifyError::InvalidOption(
                "delete_justification requires an entity_id or a file path".into(),
            )),
        }
    }

    async fn get_pending_clarifications(&self, limit: usize) -> Result<Vec<Justification>> {
        let mut pending: Vec<Justification> = self
            .justifications
            .iter()
            .filter(|j| j.clarification_pending)
            .map(|j| j.value().clone())
            .collect();
        pending.sort_by_key(|j| j.entity_id);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn text_search(&self, query: &str, limit: usize) -> Result<Vec<Justification>> {
        let needle = query.to_lowercase();
        let mut hits: Vec<Justification> = self
            .justifications
            .iter()
            .filter(|j| {
                j.purpose_summary.to_lowercase().contains(&needle)
                    || j.detailed_description.to_lowercase().contains(&needle)
                    || j.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            })
            .map(|j| j.value().clone())
            .collect();
        hits.sort_by_key(|j| j.entity_id);
        hits.truncate(limit);
        Ok(hits)
    }
}

pub type SharedGraphAdapter = Arc<dyn GraphAdapter>;
