//! `JustificationPipeline`: the public facade over C2-C6 implementing
//! §6's full surface. Owns no storage of its own — every query and write
//! goes through the injected `GraphAdapter`.

use crate::context::{aggregate_up, build_context as build_context_impl, propagate_down, Hierarchy, JustificationContext};
use crate::options::JustifyOptions;
use crate::orchestrator::InferenceOrchestrator;
use crate::result::JustificationResult;
use chrono::Utc;
use codegraph_ai::LLMProvider;
use codegraph_core::{
    Entity, EntityId, EntityKind, InferredFrom, Justification, JustifyError, PipelineConfig,
    Result, RelationshipKind,
};
use codegraph_graph::{build_dependency_nodes, schedule, GraphAdapter};
use std::collections::HashMap;
use std::sync::Arc;

/// A user-supplied answer to one pending clarification question (§6
/// `apply_clarification_answers(map)`).
#[derive(Debug, Clone)]
pub struct ClarificationAnswer {
    pub question_id: String,
    pub answer: String,
}

/// Manual override a caller can apply directly, bypassing inference
/// entirely (§6 `set_user_justification(id, input)`).
#[derive(Debug, Clone)]
pub struct UserJustificationInput {
    pub purpose_summary: String,
    pub business_value: String,
    pub feature_context: String,
    pub detailed_description: String,
    pub tags: Vec<String>,
}

/// Confidence-distribution and coverage snapshot (§6 "Reporting",
/// supplemented).
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub total_justified: usize,
    pub high_confidence: usize,
    pub medium_confidence: usize,
    pub low_confidence: usize,
    pub pending_clarification: usize,
    pub average_confidence: f32,
}

/// `(justified_count, total_count)` for one file (§6 `get_coverage_by_file`).
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCoverage {
    pub justified_count: usize,
    pub total_count: usize,
}

pub struct JustificationPipeline {
    adapter: Arc<dyn GraphAdapter>,
    orchestrator: InferenceOrchestrator,
    config: PipelineConfig,
}

impl JustificationPipeline {
    pub fn new(adapter: Arc<dyn GraphAdapter>, llm: Option<Arc<dyn LLMProvider>>, config: PipelineConfig) -> Self {
        let orchestrator = InferenceOrchestrator::new(adapter.clone(), llm, config.clone());
        Self { adapter, orchestrator, config }
    }

    /// Justifies exactly the given entities, scheduling them into
    /// dependency-ordered levels first (§4.2, §6 `justify_entities`).
    pub async fn justify_entities(&self, ids: &[EntityId], options: &JustifyOptions) -> Result<JustificationResult> {
        let mut entities = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.adapter.get_entity(*id).await? {
                entities.push(entity);
            }
        }
        self.justify(entities, options).await
    }

    /// Justifies every entity in one file (§6 `justify_file`).
    pub async fn justify_file(&self, path: &str, options: &JustifyOptions) -> Result<JustificationResult> {
        let entities = self.adapter.get_by_file(path).await?;
        self.justify(entities, options).await
    }

    /// Justifies the entire project: every entity the adapter knows about
    /// (§6 `justify_project`).
    pub async fn justify_project(&self, options: &JustifyOptions) -> Result<JustificationResult> {
        let entities = self.adapter.list_all_entities().await?;
        self.justify(entities, options).await
    }

    /// Re-runs inference, restricted to entities whose justification is
    /// below `min_confidence` or still awaiting clarification (§6
    /// `rejustify_uncertain`, undetailed in the distillation — see
    /// SPEC_FULL.md "SUPPLEMENTED FEATURES").
    pub async fn rejustify_uncertain(&self, options: &JustifyOptions) -> Result<JustificationResult> {
        let pending = self.adapter.get_pending_clarifications(usize::MAX).await?;
        let all_entities = self.adapter.list_all_entities().await?;

        let mut uncertain_ids: Vec<EntityId> = pending.iter().map(|j| j.entity_id).collect();
        for entity in &all_entities {
            if let Some(existing) = self.adapter.get_justification(entity.id).await? {
                if existing.confidence_score < options.min_confidence && !uncertain_ids.contains(&entity.id) {
                    uncertain_ids.push(entity.id);
                }
            }
        }

        let forced = JustifyOptions { force: true, ..options.clone() };
        self.justify_entities(&uncertain_ids, &forced).await
    }

    /// Shared scheduling + per-level inference + propagation core behind
    /// `justify_entities`/`justify_file`/`justify_project`/
    /// `rejustify_uncertain` (§4.2 "levels are processed in order"; §4.6
    /// "propagation runs once a level's inference completes").
    async fn justify(&self, entities: Vec<Entity>, options: &JustifyOptions) -> Result<JustificationResult> {
        if entities.is_empty() {
            return Ok(JustificationResult::default());
        }

        if options.is_cancelled() {
            return Err(JustifyError::Cancelled);
        }

        let entities = if options.filter_ignored_paths {
            entities.into_iter().filter(|e| !is_ignored_path(&e.file_path)).collect()
        } else {
            entities
        };

        let all_relationships = self.adapter.get_all_relationships().await?;
        let structural: Vec<_> = all_relationships
            .iter()
            .filter(|r| matches!(r.kind, RelationshipKind::Contains | RelationshipKind::HasMethod))
            .cloned()
            .collect();
        let hierarchy = Hierarchy::build(&structural);

        let nodes = build_dependency_nodes(&entities, &all_relationships);
        let order = schedule(&nodes);

        let entities_by_id: HashMap<EntityId, Entity> = entities.into_iter().map(|e| (e.id, e)).collect();

        let mut aggregate = JustificationResult::default();
        let mut confidence_sum = 0.0f32;

        for level in &order.levels {
            if options.is_cancelled() {
                tracing::info!("cancellation requested, stopping at level boundary");
                aggregate.stats.cancelled = true;
                break;
            }

            let level_entities: Vec<Entity> = level
                .entity_ids
                .iter()
                .filter_map(|id| entities_by_id.get(id).cloned())
                .collect();

            let level_result = self
                .orchestrator
                .justify_entities(&level_entities, &nodes, &hierarchy, &entities_by_id, options)
                .await;

            for id in &level_result.justified {
                if let Ok(Some(j)) = self.adapter.get_justification(*id).await {
                    confidence_sum += j.confidence_score;
                }
            }
            aggregate.merge(level_result);

            if options.propagate_context {
                self.propagate_level(&level_entities, &hierarchy).await?;
            }
        }

        aggregate.finalize_average_confidence(confidence_sum);
        Ok(aggregate)
    }

    /// Runs top-down then bottom-up propagation across a level's parents
    /// (§4.6). Best-effort: a propagation write failure is logged and
    /// skipped rather than failing the whole run, since propagation is an
    /// enrichment pass over records that are already persisted.
    async fn propagate_level(&self, level_entities: &[Entity], hierarchy: &Hierarchy) -> Result<()> {
        let now = Utc::now();
        for entity in level_entities {
            let Some(parent_id) = hierarchy.parent_of(entity.id) else { continue };
            let Some(parent) = self.adapter.get_justification(parent_id).await? else { continue };
            let Some(mut child) = self.adapter.get_justification(entity.id).await? else { continue };

            if propagate_down(&parent, &mut child, &self.config, now) {
                if let Err(e) = self.adapter.upsert_justification(child).await {
                    tracing::warn!(entity_id = %entity.id, error = %e, "top-down propagation write failed");
                }
            }
        }

        let mut parents_touched: Vec<EntityId> = level_entities
            .iter()
            .filter_map(|e| hierarchy.parent_of(e.id))
            .collect();
        parents_touched.sort();
        parents_touched.dedup();

        for parent_id in parents_touched {
            self.aggregate_context_up(parent_id).await?;
        }

        Ok(())
    }

    /// Assembles the context used to prompt the LLM for a single entity,
    /// or to answer a caller's own query (§6 `build_context(id)`).
    pub async fn build_context(&self, entity_id: EntityId) -> Result<JustificationContext> {
        let all_relationships = self.adapter.get_all_relationships().await?;
        let structural: Vec<_> = all_relationships
            .iter()
            .filter(|r| matches!(r.kind, RelationshipKind::Contains | RelationshipKind::HasMethod))
            .cloned()
            .collect();
        let hierarchy = Hierarchy::build(&structural);

        let depends_on: Vec<EntityId> = all_relationships
            .iter()
            .filter(|r| r.from == entity_id && r.kind.implies_dependency())
            .map(|r| r.to)
            .collect();
        let callers: Vec<EntityId> = all_relationships
            .iter()
            .filter(|r| r.to == entity_id && r.kind.implies_dependency())
            .map(|r| r.from)
            .collect();

        let mut related_ids = depends_on.clone();
        related_ids.extend(callers.iter().copied());
        related_ids.push(entity_id);
        if let Some(parent) = hierarchy.parent_of(entity_id) {
            related_ids.push(parent);
        }
        related_ids.sort();
        related_ids.dedup();

        let mut entities_by_id = HashMap::new();
        for id in &related_ids {
            if let Some(entity) = self.adapter.get_entity(*id).await? {
                entities_by_id.insert(*id, entity);
            }
        }

        let justifications = self.adapter.get_justifications(&related_ids).await?;

        Ok(build_context_impl(
            entity_id,
            &depends_on,
            &callers,
            &hierarchy,
            &entities_by_id,
            &justifications,
            None,
        ))
    }

    /// Pushes `parent`'s justification down onto `entity_id`'s, if
    /// `entity_id` is in fact a structural child of a justified parent
    /// (§6 `propagate_context_down(parent_id)`).
    ///
    /// Note: despite the name matching §6's `propagate_context_down(parent_id)`,
    /// this takes the *parent's* id and pushes to every structural child,
    /// matching §4.6's description of propagation as parent-driven.
    pub async fn propagate_context_down(&self, parent_id: EntityId) -> Result<usize> {
        let Some(parent) = self.adapter.get_justification(parent_id).await? else {
            return Ok(0);
        };

        let all_relationships = self.adapter.get_all_relationships().await?;
        let structural: Vec<_> = all_relationships
            .iter()
            .filter(|r| matches!(r.kind, RelationshipKind::Contains | RelationshipKind::HasMethod))
            .cloned()
            .collect();
        let hierarchy = Hierarchy::build(&structural);

        let now = Utc::now();
        let mut changed = 0usize;
        for child_id in hierarchy.children_of(parent_id) {
            let Some(mut child) = self.adapter.get_justification(*child_id).await? else { continue };
            if propagate_down(&parent, &mut child, &self.config, now) {
                self.adapter.upsert_justification(child).await?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Rolls every already-justified structural child up into `parent_id`
    /// (§6 `aggregate_context_up(parent_id)`).
    pub async fn aggregate_context_up(&self, parent_id: EntityId) -> Result<bool> {
        let Some(mut parent) = self.adapter.get_justification(parent_id).await? else {
            return Ok(false);
        };

        let all_relationships = self.adapter.get_all_relationships().await?;
        let structural: Vec<_> = all_relationships
            .iter()
            .filter(|r| matches!(r.kind, RelationshipKind::Contains | RelationshipKind::HasMethod))
            .cloned()
            .collect();
        let hierarchy = Hierarchy::build(&structural);

        let child_ids: Vec<EntityId> = hierarchy.children_of(parent_id).to_vec();
        let children_map = self.adapter.get_justifications(&child_ids).await?;
        let children: Vec<Justification> = child_ids
            .iter()
            .filter_map(|id| children_map.get(id).cloned())
            .collect();

        let now = Utc::now();
        let changed = aggregate_up(&mut parent, &children, &self.config, now);
        if changed {
            self.adapter.upsert_justification(parent).await?;
        }
        Ok(changed)
    }

    // -- Retrieval (§6 "Retrieval") --

    pub async fn get_justification(&self, entity_id: EntityId) -> Result<Option<Justification>> {
        self.adapter.get_justification(entity_id).await
    }

    pub async fn get_justifications(&self, ids: &[EntityId]) -> Result<HashMap<EntityId, Justification>> {
        self.adapter.get_justifications(ids).await
    }

    pub async fn get_file_justifications(&self, path: &str) -> Result<Vec<Justification>> {
        let entities = self.adapter.get_by_file(path).await?;
        let ids: Vec<EntityId> = entities.iter().map(|e| e.id).collect();
        let map = self.adapter.get_justifications(&ids).await?;
        Ok(ids.into_iter().filter_map(|id| map.get(&id).cloned()).collect())
    }

    /// Walks `parent_justification_id` up from `entity_id` to its root
    /// (§6 `get_justification_hierarchy`).
    pub async fn get_justification_hierarchy(&self, entity_id: EntityId) -> Result<Vec<Justification>> {
        let mut chain = Vec::new();
        let Some(mut current) = self.adapter.get_justification(entity_id).await? else {
            return Ok(chain);
        };
        loop {
            let parent_id = current.parent_justification_id;
            chain.push(current);
            let Some(parent_justification_id) = parent_id else { break };
            let Some(next) = self.find_justification_by_id(parent_justification_id).await? else { break };
            current = next;
        }
        Ok(chain)
    }

    async fn find_justification_by_id(&self, justification_id: uuid::Uuid) -> Result<Option<Justification>> {
        let pending = self.adapter.get_pending_clarifications(usize::MAX).await?;
        if let Some(found) = pending.iter().find(|j| j.justification_id == justification_id) {
            return Ok(Some(found.clone()));
        }
        // Fall back to a full scan; the in-memory adapter and most real
        // backends index by entity_id, not justification_id, so this is a
        // worst-case linear lookup used only for hierarchy walks.
        let entities = self.adapter.list_all_entities().await?;
        let ids: Vec<EntityId> = entities.iter().map(|e| e.id).collect();
        let map = self.adapter.get_justifications(&ids).await?;
        Ok(map.into_values().find(|j| j.justification_id == justification_id))
    }

    /// Client-side substring ranking over the adapter's narrow
    /// `text_search` (§6 `search_justifications`, SPEC_FULL.md
    /// "SUPPLEMENTED FEATURES").
    pub async fn search_justifications(&self, query: &str, limit: usize) -> Result<Vec<Justification>> {
        let mut candidates = self.adapter.text_search(query, limit.max(1) * 4).await?;
        let needle = query.to_lowercase();

        candidates.sort_by_key(|j| {
            let mut score = 0i32;
            if j.purpose_summary.to_lowercase().contains(&needle) {
                score -= 3;
            }
            if j.tags.iter().any(|t| t.to_lowercase().contains(&needle)) {
                score -= 2;
            }
            if j.detailed_description.to_lowercase().contains(&needle) {
                score -= 1;
            }
            score
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    // -- Clarification (§6 "Clarification") --

    pub async fn get_next_clarification_batch(&self, limit: usize) -> Result<Vec<Justification>> {
        self.adapter.get_pending_clarifications(limit).await
    }

    /// Applies answers keyed by entity id, clearing `clarification_pending`
    /// and marking the record as user-confirmed (SPEC_FULL.md
    /// "SUPPLEMENTED FEATURES": "answering always increments version,
    /// clears clarification_pending, sets inferred_from = user_provided").
    pub async fn apply_clarification_answers(&self, answers: &HashMap<EntityId, Vec<ClarificationAnswer>>) -> Result<usize> {
        let now = Utc::now();
        let mut applied = 0usize;
        for (entity_id, entity_answers) in answers {
            let Some(mut justification) = self.adapter.get_justification(*entity_id).await? else { continue };
            if entity_answers.is_empty() {
                continue;
            }
            let answered_ids: Vec<&str> = entity_answers.iter().map(|a| a.question_id.as_str()).collect();
            justification.pending_questions.retain(|q| !answered_ids.contains(&q.id.as_str()));
            justification.clarification_pending = !justification.pending_questions.is_empty();
            justification.inferred_from = InferredFrom::UserProvided;
            justification.touch(now);
            self.adapter.upsert_justification(justification).await?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Dismisses every pending question for `entity_id` without recording
    /// an answer (§6 `skip_clarification(id)`).
    pub async fn skip_clarification(&self, entity_id: EntityId) -> Result<()> {
        let Some(mut justification) = self.adapter.get_justification(entity_id).await? else {
            return Err(JustifyError::EntityNotFound(entity_id.to_string()));
        };
        justification.clarification_pending = false;
        justification.pending_questions.clear();
        justification.touch(Utc::now());
        self.adapter.upsert_justification(justification).await
    }

    /// Directly installs a caller-authored justification, bypassing
    /// inference entirely (§6 `set_user_justification(id, input)`).
    pub async fn set_user_justification(&self, entity_id: EntityId, input: UserJustificationInput) -> Result<()> {
        let entity = self
            .adapter
            .get_entity(entity_id)
            .await?
            .ok_or_else(|| JustifyError::EntityNotFound(entity_id.to_string()))?;

        let existing = self.adapter.get_justification(entity_id).await?;
        let now = Utc::now();
        let justification = Justification {
            justification_id: existing.as_ref().map(|j| j.justification_id).unwrap_or_else(uuid::Uuid::new_v4),
            entity_id,
            entity_kind: entity.kind,
            name: entity.name,
            file_path: entity.file_path,
            purpose_summary: input.purpose_summary,
            business_value: input.business_value,
            feature_context: input.feature_context,
            detailed_description: input.detailed_description,
            tags: input.tags.into_iter().collect(),
            inferred_from: InferredFrom::UserProvided,
            evidence_sources: existing.as_ref().map(|j| j.evidence_sources.clone()).unwrap_or_default(),
            reasoning: "Provided directly by a user, bypassing inference.".to_string(),
            confidence_score: 1.0,
            parent_justification_id: existing.as_ref().and_then(|j| j.parent_justification_id),
            hierarchy_depth: existing.as_ref().map(|j| j.hierarchy_depth).unwrap_or(0),
            clarification_pending: false,
            pending_questions: Vec::new(),
            created_at: existing.as_ref().map(|j| j.created_at).unwrap_or(now),
            updated_at: now,
            version: existing.as_ref().map(|j| j.version + 1).unwrap_or(1),
        };
        self.adapter.upsert_justification(justification).await
    }

    // -- Reporting (§6 "Reporting") --

    pub async fn get_stats(&self) -> Result<PipelineStats> {
        let entities = self.adapter.list_all_entities().await?;
        let ids: Vec<EntityId> = entities.iter().map(|e| e.id).collect();
        let map = self.adapter.get_justifications(&ids).await?;

        let mut stats = PipelineStats::default();
        let mut confidence_sum = 0.0f32;
        for justification in map.values() {
            stats.total_justified += 1;
            confidence_sum += justification.confidence_score;
            if justification.clarification_pending {
                stats.pending_clarification += 1;
            }
            match justification.confidence_level() {
                codegraph_core::ConfidenceLevel::High => stats.high_confidence += 1,
                codegraph_core::ConfidenceLevel::Medium => stats.medium_confidence += 1,
                codegraph_core::ConfidenceLevel::Low => stats.low_confidence += 1,
            }
        }
        stats.average_confidence = if stats.total_justified == 0 {
            0.0
        } else {
            confidence_sum / stats.total_justified as f32
        };
        Ok(stats)
    }

    pub async fn get_coverage_by_file(&self) -> Result<HashMap<String, FileCoverage>> {
        let entities = self.adapter.list_all_entities().await?;
        let mut by_file: HashMap<String, Vec<EntityId>> = HashMap::new();
        for entity in &entities {
            by_file.entry(entity.file_path.clone()).or_default().push(entity.id);
        }

        let mut coverage = HashMap::new();
        for (file, ids) in by_file {
            let map = self.adapter.get_justifications(&ids).await?;
            coverage.insert(
                file,
                FileCoverage { justified_count: map.len(), total_count: ids.len() },
            );
        }
        Ok(coverage)
    }

    pub async fn get_feature_justifications(&self) -> Result<HashMap<String, Vec<Justification>>> {
        let entities = self.adapter.list_all_entities().await?;
        let ids: Vec<EntityId> = entities.iter().map(|e| e.id).collect();
        let map = self.adapter.get_justifications(&ids).await?;

        let mut by_feature: HashMap<String, Vec<Justification>> = HashMap::new();
        for justification in map.into_values() {
            by_feature.entry(justification.feature_context.clone()).or_default().push(justification);
        }
        Ok(by_feature)
    }
}

fn is_ignored_path(path: &str) -> bool {
    const IGNORED_SEGMENTS: &[&str] = &["node_modules", "target", "dist", "build", ".git", "vendor"];
    path.split(['/', '\\']).any(|segment| IGNORED_SEGMENTS.contains(&segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::{ClarificationPriority, ClarificationQuestion, Relationship, SourceRange};
    use codegraph_graph::InMemoryGraphAdapter;
    use tokio_util::sync::CancellationToken;

    fn entity(name: &str, kind: EntityKind, file_path: &str) -> Entity {
        Entity::new(
            uuid::Uuid::new_v4(),
            name,
            file_path,
            kind,
            SourceRange::Span { start_line: 1, end_line: 2 },
        )
    }

    fn pipeline(adapter: Arc<InMemoryGraphAdapter>) -> JustificationPipeline {
        JustificationPipeline::new(adapter, None, PipelineConfig::default())
    }

    #[tokio::test]
    async fn justify_project_persists_trivial_entities() {
        let adapter = Arc::new(InMemoryGraphAdapter::new());
        let getter = entity("getName", EntityKind::Function, "src/app.ts");
        adapter.add_entity(getter.clone());

        let pipeline = pipeline(adapter.clone());
        let result = pipeline.justify_project(&JustifyOptions::default()).await.unwrap();

        assert_eq!(result.stats.succeeded, 1);
        assert!(pipeline.get_justification(getter.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn second_run_without_force_skips_confident_entities() {
        let adapter = Arc::new(InMemoryGraphAdapter::new());
        let getter = entity("getName", EntityKind::Function, "src/app.ts");
        adapter.add_entity(getter.clone());
        let pipeline = pipeline(adapter.clone());

        let options = JustifyOptions::default();
        pipeline.justify_entities(&[getter.id], &options).await.unwrap();
        let second = pipeline.justify_entities(&[getter.id], &options).await.unwrap();

        assert_eq!(second.stats.skipped, 1);
        assert_eq!(second.stats.succeeded, 0);
    }

    #[tokio::test]
    async fn propagate_then_aggregate_is_idempotent_on_unchanged_children() {
        let adapter = Arc::new(InMemoryGraphAdapter::new());
        let file = entity("payments.ts", EntityKind::File, "src/billing/payments.ts");
        let method = entity("getTotal", EntityKind::Method, "src/billing/payments.ts");
        adapter.add_entity(file.clone());
        adapter.add_entity(method.clone());
        adapter.add_relationship(Relationship { from: file.id, to: method.id, kind: RelationshipKind::Contains });

        let pipeline = pipeline(adapter.clone());
        pipeline.justify_project(&JustifyOptions::default()).await.unwrap();

        let before = pipeline.get_justification(file.id).await.unwrap().unwrap().feature_context;
        pipeline.aggregate_context_up(file.id).await.unwrap();
        let after = pipeline.get_justification(file.id).await.unwrap().unwrap().feature_context;

        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn set_user_justification_overrides_and_sets_max_confidence() {
        let adapter = Arc::new(InMemoryGraphAdapter::new());
        let e = entity("process", EntityKind::Function, "src/billing/process.ts");
        adapter.add_entity(e.clone());
        let pipeline = pipeline(adapter.clone());

        pipeline
            .set_user_justification(
                e.id,
                UserJustificationInput {
                    purpose_summary: "Processes a billing cycle.".to_string(),
                    business_value: "Drives monthly revenue recognition.".to_string(),
                    feature_context: "Billing".to_string(),
                    detailed_description: String::new(),
                    tags: vec!["billing".to_string()],
                },
            )
            .await
            .unwrap();

        let stored = pipeline.get_justification(e.id).await.unwrap().unwrap();
        assert_eq!(stored.confidence_score, 1.0);
        assert!(matches!(stored.inferred_from, InferredFrom::UserProvided));
    }

    #[tokio::test]
    async fn skip_clarification_clears_pending_state() {
        let adapter = Arc::new(InMemoryGraphAdapter::new());
        let e = entity("getName", EntityKind::Function, "src/app.ts");
        adapter.add_entity(e.clone());
        let pipeline = pipeline(adapter.clone());
        pipeline.justify_project(&JustifyOptions::default()).await.unwrap();

        let mut justification = pipeline.get_justification(e.id).await.unwrap().unwrap();
        justification.clarification_pending = true;
        justification.pending_questions.push(ClarificationQuestion {
            id: uuid::Uuid::new_v4().to_string(),
            text: "Is this function part of the public API?".to_string(),
            category: "scope".to_string(),
            priority: ClarificationPriority::Low,
        });
        adapter.upsert_justification(justification).await.unwrap();

        pipeline.skip_clarification(e.id).await.unwrap();
        let stored = pipeline.get_justification(e.id).await.unwrap().unwrap();
        assert!(!stored.clarification_pending);
        assert!(stored.pending_questions.is_empty());
    }

    #[tokio::test]
    async fn cancellation_requested_before_any_progress_returns_cancelled_error() {
        let adapter = Arc::new(InMemoryGraphAdapter::new());
        let e = entity("getName", EntityKind::Function, "src/app.ts");
        adapter.add_entity(e.clone());
        let pipeline = pipeline(adapter.clone());

        let token = CancellationToken::new();
        token.cancel();
        let options = JustifyOptions { cancellation: Some(token), ..Default::default() };

        let result = pipeline.justify_project(&options).await;
        assert!(matches!(result, Err(JustifyError::Cancelled)));
        assert!(pipeline.get_justification(e.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancellation_mid_run_returns_partial_result() {
        let adapter = Arc::new(InMemoryGraphAdapter::new());
        let file = entity("payments.ts", EntityKind::File, "src/billing/payments.ts");
        let method = entity("getTotal", EntityKind::Method, "src/billing/payments.ts");
        adapter.add_entity(file.clone());
        adapter.add_entity(method.clone());
        adapter.add_relationship(Relationship { from: file.id, to: method.id, kind: RelationshipKind::Contains });
        let pipeline = pipeline(adapter.clone());

        // Cancel as soon as the first level finishes, via the progress
        // callback fired at the end of that level's entity classification.
        let token = CancellationToken::new();
        let cancel_token = token.clone();
        let on_progress: crate::progress::ProgressCallback = Arc::new(move |_event| {
            cancel_token.cancel();
        });
        let options = JustifyOptions {
            cancellation: Some(token),
            on_progress: Some(on_progress),
            ..Default::default()
        };

        let result = pipeline.justify_project(&options).await.unwrap();
        assert!(result.stats.cancelled);
    }

    #[tokio::test]
    async fn get_coverage_by_file_reports_justified_over_total() {
        let adapter = Arc::new(InMemoryGraphAdapter::new());
        let a = entity("getName", EntityKind::Function, "src/app.ts");
        let b = entity("validateInput", EntityKind::Function, "src/app.ts");
        adapter.add_entity(a.clone());
        adapter.add_entity(b.clone());
        let pipeline = pipeline(adapter.clone());

        pipeline.justify_entities(&[a.id], &JustifyOptions { skip_llm: true, ..Default::default() }).await.unwrap();

        let coverage = pipeline.get_coverage_by_file().await.unwrap();
        let file_coverage = coverage.get("src/app.ts").unwrap();
        assert_eq!(file_coverage.total_count, 2);
        assert_eq!(file_coverage.justified_count, 1);
    }
}
