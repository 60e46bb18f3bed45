//! Context Propagator (C6, §4.6). Reconstructs the file/entity hierarchy
//! from `contains`/`has_method` relationships, assembles per-entity context
//! for the Inference Orchestrator, and runs the top-down/bottom-up
//! propagation passes after each scheduler level completes.

use crate::options::ProjectContext;
use chrono::Utc;
use codegraph_core::{Entity, EntityId, Justification, PipelineConfig, Relationship, RelationshipKind};
use std::collections::HashMap;

/// A truncated reference to another entity's justification, used to give
/// the LLM prompt (or a human caller) just enough to orient without
/// pulling the full record.
#[derive(Debug, Clone)]
pub struct ContextSummary {
    pub entity_id: EntityId,
    pub name: String,
    pub purpose_summary: String,
}

const SUMMARY_TRUNCATE_CHARS: usize = 160;

fn truncate_summary(text: &str) -> String {
    if text.chars().count() <= SUMMARY_TRUNCATE_CHARS {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(SUMMARY_TRUNCATE_CHARS).collect();
        format!("{truncated}…")
    }
}

/// Context assembled for a single entity ahead of LLM inference (§4.6
/// `build_context`). Borrows nothing past its own construction — built
/// fresh per batch rather than held across a propagation sweep.
#[derive(Debug, Clone)]
pub struct JustificationContext {
    pub entity_id: EntityId,
    pub parent_context: Option<ContextSummary>,
    pub siblings: Vec<String>,
    pub dependencies: Vec<ContextSummary>,
    pub callers: Vec<ContextSummary>,
    pub callees: Vec<ContextSummary>,
    pub project_context: Option<ProjectContext>,
}

/// Structural hierarchy derived from `contains`/`has_method` edges: file ->
/// classes/interfaces/top-level functions, class -> methods.
pub struct Hierarchy {
    parent_of: HashMap<EntityId, EntityId>,
    children_of: HashMap<EntityId, Vec<EntityId>>,
}

impl Hierarchy {
    pub fn build(relationships: &[Relationship]) -> Self {
        let mut parent_of = HashMap::new();
        let mut children_of: HashMap<EntityId, Vec<EntityId>> = HashMap::new();

        for rel in relationships {
            if !matches!(rel.kind, RelationshipKind::Contains | RelationshipKind::HasMethod) {
                continue;
            }
            parent_of.insert(rel.to, rel.from);
            children_of.entry(rel.from).or_default().push(rel.to);
        }

        Self { parent_of, children_of }
    }

    pub fn parent_of(&self, id: EntityId) -> Option<EntityId> {
        self.parent_of.get(&id).copied()
    }

    pub fn children_of(&self, id: EntityId) -> &[EntityId] {
        self.children_of.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn siblings_of(&self, id: EntityId) -> Vec<EntityId> {
        match self.parent_of(id) {
            Some(parent) => self
                .children_of(parent)
                .iter()
                .copied()
                .filter(|sibling| *sibling != id)
                .collect(),
            None => Vec::new(),
        }
    }
}

fn summarize(
    id: EntityId,
    entities_by_id: &HashMap<EntityId, Entity>,
    justifications: &HashMap<EntityId, Justification>,
) -> Option<ContextSummary> {
    let justification = justifications.get(&id)?;
    let name = entities_by_id
        .get(&id)
        .map(|e| e.name.clone())
        .unwrap_or_else(|| justification.name.clone());
    Some(ContextSummary {
        entity_id: id,
        name,
        purpose_summary: truncate_summary(&justification.purpose_summary),
    })
}

/// Builds the context used to prompt the LLM (or to answer a caller's
/// `build_context` query) for a single entity. Missing prerequisites are
/// silently omitted, never an error (§4.6 "Failure").
pub fn build_context(
    entity_id: EntityId,
    depends_on: &[EntityId],
    callers: &[EntityId],
    hierarchy: &Hierarchy,
    entities_by_id: &HashMap<EntityId, Entity>,
    justifications: &HashMap<EntityId, Justification>,
    project_context: Option<ProjectContext>,
) -> JustificationContext {
    let parent_context = hierarchy
        .parent_of(entity_id)
        .and_then(|parent_id| summarize(parent_id, entities_by_id, justifications));

    let siblings = hierarchy
        .siblings_of(entity_id)
        .into_iter()
        .filter_map(|id| entities_by_id.get(&id).map(|e| e.name.clone()))
        .collect();

    let dependencies = depends_on
        .iter()
        .filter_map(|id| summarize(*id, entities_by_id, justifications))
        .collect();

    let callers = callers
        .iter()
        .filter_map(|id| summarize(*id, entities_by_id, justifications))
        .collect();

    // Callees here are simply `depends_on` restricted to `calls` edges; the
    // caller passes the full dependency set and we reuse it, since §4.6
    // doesn't distinguish "dependency" from "callee" beyond relationship
    // kind, and the orchestrator already filters by kind upstream.
    let callees = depends_on
        .iter()
        .filter_map(|id| summarize(*id, entities_by_id, justifications))
        .collect();

    JustificationContext {
        entity_id,
        parent_context,
        siblings,
        dependencies,
        callers,
        callees,
        project_context,
    }
}

/// Top-down inheritance for a single (parent, child) pair (§4.6
/// "Top-down propagation"). Returns `true` if the child was modified.
pub fn propagate_down(parent: &Justification, child: &mut Justification, config: &PipelineConfig, now: chrono::DateTime<Utc>) -> bool {
    if parent.updated_at < child.updated_at && parent.confidence_score <= child.confidence_score {
        return false;
    }

    let mut changed = false;

    if child.feature_context.is_empty() || child.feature_context == "General" {
        if child.feature_context != parent.feature_context {
            child.feature_context = parent.feature_context.clone();
            changed = true;
        }
    }

    let before_len = child.tags.len();
    for tag in parent.tags.iter().take(config.max_inherited_tags) {
        child.tags.insert(tag.clone());
    }
    if child.tags.len() != before_len {
        changed = true;
    }

    if changed {
        child.confidence_score = (child.confidence_score + config.confidence_delta).min(1.0);
        child.parent_justification_id.get_or_insert(parent.justification_id);
        child.touch(now);
    }

    changed
}

/// Bottom-up aggregation of a parent from its already-justified children
/// (§4.6 "Bottom-up aggregation"). Returns `true` if the parent changed.
pub fn aggregate_up(
    parent: &mut Justification,
    children: &[Justification],
    config: &PipelineConfig,
    now: chrono::DateTime<Utc>,
) -> bool {
    if children.is_empty() {
        return false;
    }

    let mut changed = false;

    if let Some(majority_feature) = majority_feature_context(children) {
        if parent.feature_context != majority_feature {
            parent.feature_context = majority_feature;
            changed = true;
        }
    }

    let mut ranked: Vec<&Justification> = children.iter().collect();
    ranked.sort_by(|a, b| b.confidence_score.partial_cmp(&a.confidence_score).unwrap_or(std::cmp::Ordering::Equal));
    let summary_lines: Vec<String> = ranked
        .iter()
        .take(config.max_aggregated_children)
        .map(|c| format!("- {}: {}", c.name, truncate_summary(&c.purpose_summary)))
        .collect();
    let aggregated_description = summary_lines.join("\n");
    if !aggregated_description.is_empty() && parent.detailed_description != aggregated_description {
        parent.detailed_description = aggregated_description;
        changed = true;
    }

    let mean_confidence = (parent.confidence_score + children.iter().map(|c| c.confidence_score).sum::<f32>())
        / (children.len() as f32 + 1.0);
    if (parent.confidence_score - mean_confidence).abs() > f32::EPSILON {
        parent.confidence_score = mean_confidence.clamp(0.0, 1.0);
        changed = true;
    }

    if changed {
        parent.touch(now);
    }

    changed
}

/// Majority `feature_context` among non-empty children, ties broken by
/// first-seen order (§4.6, §8 "deterministic tiebreak").
fn majority_feature_context(children: &[Justification]) -> Option<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for child in children {
        if child.feature_context.is_empty() {
            continue;
        }
        match counts.iter_mut().find(|(f, _)| f == &child.feature_context) {
            Some((_, count)) => *count += 1,
            None => counts.push((child.feature_context.clone(), 1)),
        }
    }
    // `counts` is in first-seen order; keep the first entry reaching the
    // max count so ties break on first-seen, not last-seen (`max_by_key`
    // returns the last of equal maxima).
    let mut best: Option<(String, usize)> = None;
    for (feature, count) in counts {
        match &best {
            Some((_, best_count)) if count <= *best_count => {}
            _ => best = Some((feature, count)),
        }
    }
    best.map(|(feature, _)| feature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::{EntityKind, InferredFrom};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn justification(entity_id: EntityId, feature_context: &str, confidence: f32) -> Justification {
        let now = Utc::now();
        Justification {
            justification_id: Uuid::new_v4(),
            entity_id,
            entity_kind: EntityKind::Method,
            name: "method".to_string(),
            file_path: "a.ts".to_string(),
            purpose_summary: "Does a thing.".to_string(),
            business_value: "Matters.".to_string(),
            feature_context: feature_context.to_string(),
            detailed_description: String::new(),
            tags: BTreeSet::new(),
            inferred_from: InferredFrom::LlmInferred,
            evidence_sources: Vec::new(),
            reasoning: String::new(),
            confidence_score: confidence,
            parent_justification_id: None,
            hierarchy_depth: 1,
            clarification_pending: false,
            pending_questions: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[test]
    fn scenario_5_top_down_feature_inheritance() {
        let config = PipelineConfig::default();
        let now = Utc::now();

        let mut parent = justification(Uuid::new_v4(), "Authentication", 0.9);
        parent.tags.insert("auth".to_string());

        let mut child = justification(Uuid::new_v4(), "", 0.6);
        let parent_confidence_before = parent.confidence_score;
        let child_confidence_before = child.confidence_score;

        // Ensure parent "wins" the newer/higher-confidence check.
        parent.updated_at = now;
        child.updated_at = now - chrono::Duration::seconds(10);

        let changed = propagate_down(&parent, &mut child, &config, now);

        assert!(changed);
        assert_eq!(child.feature_context, "Authentication");
        assert!(child.confidence_score > child_confidence_before);
        assert!((child.confidence_score - (child_confidence_before + config.confidence_delta)).abs() < 1e-6);
        assert!(child.confidence_score <= 1.0);
        assert_eq!(parent.confidence_score, parent_confidence_before);
    }

    #[test]
    fn bottom_up_majority_feature_context_deterministic_tiebreak() {
        let children = vec![
            justification(Uuid::new_v4(), "Authentication", 0.8),
            justification(Uuid::new_v4(), "Billing", 0.7),
            justification(Uuid::new_v4(), "Authentication", 0.6),
        ];
        let majority = majority_feature_context(&children);
        assert_eq!(majority, Some("Authentication".to_string()));
    }

    #[test]
    fn majority_feature_context_breaks_genuine_tie_by_first_seen() {
        let children = vec![
            justification(Uuid::new_v4(), "Authentication", 0.8),
            justification(Uuid::new_v4(), "Billing", 0.7),
        ];
        let majority = majority_feature_context(&children);
        assert_eq!(majority, Some("Authentication".to_string()));
    }

    #[test]
    fn aggregate_up_sets_mean_confidence() {
        let config = PipelineConfig::default();
        let now = Utc::now();
        let mut parent = justification(Uuid::new_v4(), "General", 0.4);
        let children = vec![
            justification(Uuid::new_v4(), "Authentication", 0.8),
            justification(Uuid::new_v4(), "Authentication", 0.6),
        ];

        let changed = aggregate_up(&mut parent, &children, &config, now);

        assert!(changed);
        assert_eq!(parent.feature_context, "Authentication");
        let expected_mean = (0.4 + 0.8 + 0.6) / 3.0;
        assert!((parent.confidence_score - expected_mean).abs() < 1e-6);
    }

    #[test]
    fn aggregate_up_with_no_children_is_noop() {
        let config = PipelineConfig::default();
        let now = Utc::now();
        let mut parent = justification(Uuid::new_v4(), "General", 0.4);
        assert!(!aggregate_up(&mut parent, &[], &config, now));
    }

    #[test]
    fn hierarchy_reconstructs_parent_and_siblings() {
        let file = Uuid::new_v4();
        let method_a = Uuid::new_v4();
        let method_b = Uuid::new_v4();
        let rels = vec![
            Relationship { from: file, to: method_a, kind: RelationshipKind::Contains },
            Relationship { from: file, to: method_b, kind: RelationshipKind::Contains },
        ];
        let hierarchy = Hierarchy::build(&rels);
        assert_eq!(hierarchy.parent_of(method_a), Some(file));
        assert_eq!(hierarchy.siblings_of(method_a), vec![method_b]);
    }
}
