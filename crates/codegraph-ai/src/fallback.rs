//! Code-analysis fallback heuristics (§4.5, supplemented): used when the LLM
//! is unavailable or per-entity retries are exhausted. Produces a low/medium
//! confidence justification draft from path segments and name patterns
//! alone, with `inferred_from = file_name` (§8 scenario 6).

use codegraph_core::{Entity, JustificationDraft};

/// path segment -> feature context, checked against every `/`-delimited
/// segment of the entity's file path, first match wins (earliest segment).
const PATH_FEATURE_TABLE: &[(&str, &str)] = &[
    ("auth", "Authentication"),
    ("authz", "Authorization"),
    ("api", "API"),
    ("ui", "UI"),
    ("components", "UI"),
    ("views", "UI"),
    ("db", "Data Access"),
    ("database", "Data Access"),
    ("models", "Data Access"),
    ("repository", "Data Access"),
    ("routes", "Routing"),
    ("router", "Routing"),
    ("middleware", "Middleware"),
    ("utils", "Utilities"),
    ("lib", "Core Library"),
    ("config", "Configuration"),
    ("tests", "Testing"),
    ("test", "Testing"),
];

/// name suffix/prefix -> phrase, checked case-sensitively against the
/// entity name, longest match wins.
const NAME_PHRASE_TABLE: &[(&str, &str)] = &[
    ("Handler", "Handles {subject} operations"),
    ("Controller", "Controls {subject} request flow"),
    ("Service", "Provides {subject} business logic"),
    ("Repository", "Persists and retrieves {subject} data"),
    ("Validator", "Validates {subject} input"),
    ("Factory", "Constructs {subject} instances"),
    ("Provider", "Supplies {subject} to dependents"),
    ("Manager", "Coordinates {subject} lifecycle"),
];

fn feature_context_for_path(file_path: &str) -> Option<&'static str> {
    let segments: Vec<&str> = file_path.split(['/', '\\']).collect();
    for segment in &segments {
        let normalized = segment.to_lowercase();
        for (pattern, feature) in PATH_FEATURE_TABLE {
            if normalized == *pattern {
                return Some(feature);
            }
        }
    }
    None
}

fn phrase_for_name(name: &str) -> Option<String> {
    for (suffix, template) in NAME_PHRASE_TABLE {
        if let Some(subject) = name.strip_suffix(suffix) {
            if subject.is_empty() {
                continue;
            }
            return Some(template.replace("{subject}", subject));
        }
    }
    None
}

fn tags_for(entity: &Entity, feature: Option<&str>) -> Vec<String> {
    let mut tags = Vec::new();
    if let Some(feature) = feature {
        tags.push(feature.to_lowercase());
    }
    tags.push(entity.kind.to_string());
    tags
}

/// Builds a justification draft from path/name heuristics alone, with no
/// LLM call. Confidence is deliberately kept in the low-to-medium band
/// (§8 scenario 6: `confidence_score ∈ [0.3, 0.7]`).
pub fn code_analysis_fallback(entity: &Entity) -> JustificationDraft {
    let feature = feature_context_for_path(&entity.file_path);
    let phrase = phrase_for_name(&entity.name);

    let purpose_summary = phrase.clone().unwrap_or_else(|| {
        format!(
            "{} `{}` defined in {}.",
            entity.kind, entity.name, entity.file_path
        )
    });

    let business_value = match feature {
        Some(feature) => format!("Supports the {} area of the codebase.", feature),
        None => "Supports application functionality inferred from naming conventions.".to_string(),
    };

    let confidence_score = if feature.is_some() && phrase.is_some() {
        0.6
    } else if feature.is_some() || phrase.is_some() {
        0.45
    } else {
        0.3
    };

    JustificationDraft {
        purpose_summary,
        business_value,
        feature_context: feature.map(|f| f.to_string()).unwrap_or_else(|| "General".to_string()),
        detailed_description: String::new(),
        tags: tags_for(entity, feature).into_iter().collect(),
        confidence_score,
        inferred_from: codegraph_core::InferredFrom::FileName,
        reasoning: "Derived from file path and naming conventions without an LLM call."
            .to_string(),
        evidence_sources: vec![entity.file_path.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::{Entity, EntityKind, SourceRange};

    fn entity(name: &str, file_path: &str) -> Entity {
        Entity::new(
            uuid::Uuid::new_v4(),
            name,
            file_path,
            EntityKind::Function,
            SourceRange::Span {
                start_line: 1,
                end_line: 1,
            },
        )
    }

    #[test]
    fn scenario_6_llm_unavailable_fallback_for_ui_button() {
        let entity = entity("renderButton", "src/ui/Button.tsx");
        let draft = code_analysis_fallback(&entity);

        assert_eq!(draft.feature_context, "UI");
        assert!(draft.tags.contains("ui"));
        assert!(draft.confidence_score >= 0.3 && draft.confidence_score <= 0.7);
        assert!(matches!(draft.inferred_from, codegraph_core::InferredFrom::FileName));
    }

    #[test]
    fn handler_suffix_produces_handles_phrase() {
        let entity = entity("PaymentHandler", "src/api/payments.ts");
        let draft = code_analysis_fallback(&entity);
        assert!(draft.purpose_summary.contains("Handles Payment operations"));
    }

    #[test]
    fn unmatched_path_and_name_falls_back_to_lowest_confidence() {
        let entity = entity("xyz123", "src/weird/nested/thing.ts");
        let draft = code_analysis_fallback(&entity);
        assert_eq!(draft.feature_context, "General");
        assert_eq!(draft.confidence_score, 0.3);
    }
}
