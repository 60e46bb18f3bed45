use async_trait::async_trait;
use codegraph_core::{Entity, EntityId, EntityKind, Justification, Relationship, RelationshipKind, Result};
use std::collections::HashMap;

/// Read-mostly view over entities, relationships and persisted
/// justifications (§4.1, §6 "Graph Adapter interface"). The adapter owns no
/// business logic — it is deliberately thin so the pipeline can be tested
/// against an in-memory fake, and so the real implementation (backed by
/// whatever graph storage engine a caller plugs in) never needs to know
/// about justification semantics.
///
/// Reads are consistent within a single call but the trait makes no
/// cross-call guarantees: callers that need a stable view across multiple
/// queries must re-read rather than assume nothing changed underneath them
/// (§4.1).
#[async_trait]
pub trait GraphAdapter: Send + Sync {
    async fn list_entities_by_kind(&self, kind: EntityKind) -> Result<Vec<Entity>>;
    async fn list_all_entities(&self) -> Result<Vec<Entity>>;
    async fn get_entity(&self, id: EntityId) -> Result<Option<Entity>>;
    async fn get_relationships(&self, kind: RelationshipKind) -> Result<Vec<Relationship>>;
    async fn get_all_relationships(&self) -> Result<Vec<Relationship>>;

    async fn get_justification(&self, entity_id: EntityId) -> Result<Option<Justification>>;
    async fn get_justifications(
        &self,
        ids: &[EntityId],
    ) -> Result<HashMap<EntityId, Justification>>;
    async fn get_by_file(&self, path: &str) -> Result<Vec<Entity>>;

    async fn upsert_justification(&self, record: Justification) -> Result<()>;
    async fn upsert_justifications(&self, records: Vec<Justification>) -> Result<()> {
        for record in records {
            self.upsert_justification(record).await?;
        }
        Ok(())
    }

    /// Deletes a single entity's justification, or (when `file` is given
    /// instead) every justification rooted in that file. §3 "Lifecycles":
    /// the only two ways a justification is ever deleted.
    async fn delete_justification(&self, entity_id: Option<EntityId>, file: Option<&str>)
        -> Result<()>;

    async fn get_pending_clarifications(&self, limit: usize) -> Result<Vec<Justification>>;
    async fn text_search(&self, query: &str, limit: usize) -> Result<Vec<Justification>>;
}
