use crate::EntityId;
use crate::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Provenance of a justification record (§3 "provenance").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferredFrom {
    LlmInferred,
    FileName,
    UserProvided,
    Propagated,
}

impl fmt::Display for InferredFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InferredFrom::LlmInferred => "llm_inferred",
            InferredFrom::FileName => "file_name",
            InferredFrom::UserProvided => "user_provided",
            InferredFrom::Propagated => "propagated",
        };
        write!(f, "{}", s)
    }
}

/// Discrete confidence bucket derived from `confidence_score` (§3, §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    /// `<0.5 low, <0.8 medium, else high` (§8).
    pub fn from_score(score: f32) -> Self {
        if score >= 0.8 {
            ConfidenceLevel::High
        } else if score >= 0.5 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// A single open question attached to a justification pending
/// clarification (§3 "clarification").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationQuestion {
    pub id: String,
    pub text: String,
    pub category: String,
    pub priority: ClarificationPriority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationPriority {
    Low,
    Medium,
    High,
}

/// The persisted, one-per-entity justification record (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Justification {
    // identity
    pub justification_id: uuid::Uuid,
    pub entity_id: EntityId,
    pub entity_kind: EntityKind,
    pub name: String,
    pub file_path: String,

    // content
    pub purpose_summary: String,
    pub business_value: String,
    pub feature_context: String,
    pub detailed_description: String,
    pub tags: BTreeSet<String>,

    // provenance
    pub inferred_from: InferredFrom,
    pub evidence_sources: Vec<String>,
    pub reasoning: String,

    // quality
    pub confidence_score: f32,

    // hierarchy
    pub parent_justification_id: Option<uuid::Uuid>,
    pub hierarchy_depth: u32,

    // clarification
    pub clarification_pending: bool,
    pub pending_questions: Vec<ClarificationQuestion>,

    // timestamps/versioning
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Justification {
    pub fn confidence_level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_score(self.confidence_score)
    }

    /// Bump `updated_at`/`version` for any write (§9 Open Question (b):
    /// version increments on every write, with no exception for
    /// propagation).
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }

    pub fn clamp_confidence(&mut self) {
        self.confidence_score = self.confidence_score.clamp(0.0, 1.0);
    }
}

/// Builder-style defaults used by the triviality filter (§4.3) and the
/// code-analysis fallback (§4.5) to construct a fresh record before it has
/// ever been persisted.
pub struct JustificationDraft {
    pub purpose_summary: String,
    pub business_value: String,
    pub feature_context: String,
    pub detailed_description: String,
    pub tags: BTreeSet<String>,
    pub confidence_score: f32,
    pub inferred_from: InferredFrom,
    pub reasoning: String,
    pub evidence_sources: Vec<String>,
}

impl JustificationDraft {
    pub fn into_justification(
        self,
        entity_id: EntityId,
        entity_kind: EntityKind,
        name: String,
        file_path: String,
        parent_justification_id: Option<uuid::Uuid>,
        hierarchy_depth: u32,
        now: DateTime<Utc>,
    ) -> Justification {
        Justification {
            justification_id: uuid::Uuid::new_v4(),
            entity_id,
            entity_kind,
            name,
            file_path,
            purpose_summary: self.purpose_summary,
            business_value: self.business_value,
            feature_context: self.feature_context,
            detailed_description: self.detailed_description,
            tags: self.tags,
            inferred_from: self.inferred_from,
            evidence_sources: self.evidence_sources,
            reasoning: self.reasoning,
            confidence_score: self.confidence_score.clamp(0.0, 1.0),
            parent_justification_id,
            hierarchy_depth,
            clarification_pending: false,
            pending_questions: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}
