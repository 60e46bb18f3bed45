//! Model descriptors and token budget derivation (§4.4, §6 "Model descriptor").

use codegraph_core::Entity;
use serde::{Deserialize, Serialize};

/// Known characteristics of an LLM the batcher needs to size batches
/// against. Unknown model ids fall back to a conservative default
/// (§6: "unknown models fall back to conservative default {4096,2048}").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub context_window: usize,
    pub max_output_tokens: usize,
    pub provider: String,
}

const FALLBACK_CONTEXT_WINDOW: usize = 4096;
const FALLBACK_MAX_OUTPUT_TOKENS: usize = 2048;

impl ModelDescriptor {
    pub fn fallback() -> Self {
        Self {
            id: "unknown".to_string(),
            context_window: FALLBACK_CONTEXT_WINDOW,
            max_output_tokens: FALLBACK_MAX_OUTPUT_TOKENS,
            provider: "unknown".to_string(),
        }
    }

    pub fn known(id: &str) -> Self {
        match id {
            "claude-3-5-sonnet-20241022" | "claude-3-5-sonnet-latest" => Self {
                id: id.to_string(),
                context_window: 200_000,
                max_output_tokens: 8_192,
                provider: "anthropic".to_string(),
            },
            "claude-3-opus-20240229" => Self {
                id: id.to_string(),
                context_window: 200_000,
                max_output_tokens: 4_096,
                provider: "anthropic".to_string(),
            },
            "claude-3-haiku-20240307" => Self {
                id: id.to_string(),
                context_window: 200_000,
                max_output_tokens: 4_096,
                provider: "anthropic".to_string(),
            },
            _ => {
                let mut fallback = Self::fallback();
                fallback.id = id.to_string();
                fallback
            }
        }
    }
}

/// Derived budgets for a single justification run, combining a
/// `ModelDescriptor` with `PipelineConfig::safety_margin` (§4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenBudget {
    pub reserved_output: usize,
    pub max_input: usize,
    pub max_entities_per_batch_by_output: usize,
}

impl TokenBudget {
    pub fn derive(
        model: &ModelDescriptor,
        system_prompt_tokens: usize,
        safety_margin: f32,
        output_tokens_per_entity: usize,
    ) -> Self {
        let safety_margin = safety_margin.clamp(0.0, 0.99);

        let reserved_output =
            ((model.max_output_tokens as f64) * (1.0 - safety_margin as f64)).floor() as usize;

        let available_for_input = model
            .context_window
            .saturating_sub(system_prompt_tokens)
            .saturating_sub(reserved_output);
        let max_input = (1000usize).max(
            ((available_for_input as f64) * (1.0 - safety_margin as f64)).floor() as usize,
        );

        let max_entities_per_batch_by_output = if output_tokens_per_entity == 0 {
            usize::MAX
        } else {
            reserved_output / output_tokens_per_entity
        };

        Self {
            reserved_output,
            max_input,
            max_entities_per_batch_by_output,
        }
    }
}

/// Estimates tokens via the `ceil(chars / 3.5)` heuristic from §4.4.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    ((chars as f64) / 3.5).ceil() as usize
}

/// Structural markup overhead per entity added on top of the content
/// fields below (§4.4: "~25 structural markup constant").
const STRUCTURAL_MARKUP_TOKENS: usize = 25;

/// Estimated input token cost of presenting a single entity in a batch
/// prompt: name, kind, file path, signature, first doc line, up to the
/// first ten snippet lines, plus the structural markup constant.
pub fn estimate_entity_input_tokens(entity: &Entity) -> usize {
    let mut total = STRUCTURAL_MARKUP_TOKENS;
    total += estimate_tokens(&entity.name);
    total += estimate_tokens(entity.kind.to_string().as_str());
    total += estimate_tokens(&entity.file_path);

    if let Some(signature) = &entity.signature {
        total += estimate_tokens(signature);
    }

    if let Some(doc_line) = entity.first_doc_line() {
        total += estimate_tokens(doc_line);
    }

    for line in entity.snippet.iter().take(10) {
        total += estimate_tokens(line);
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_id_falls_back_to_conservative_default() {
        let model = ModelDescriptor::known("some-experimental-model-v9");
        assert_eq!(model.context_window, FALLBACK_CONTEXT_WINDOW);
        assert_eq!(model.max_output_tokens, FALLBACK_MAX_OUTPUT_TOKENS);
    }

    #[test]
    fn estimate_tokens_matches_ceil_chars_over_3_5() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1); // ceil(3/3.5) = 1
        assert_eq!(estimate_tokens("abcdefg"), 2); // ceil(7/3.5) = 2
    }

    #[test]
    fn budget_scenario_3_output_limited_batch_of_four() {
        // §8 scenario 3: max_output=2048, output_tokens_per_entity=500 -> floor(2048/500)=4
        let model = ModelDescriptor {
            id: "test".to_string(),
            context_window: 200_000,
            max_output_tokens: 2048,
            provider: "test".to_string(),
        };
        let budget = TokenBudget::derive(&model, 400, 0.0, 500);
        assert_eq!(budget.reserved_output, 2048);
        assert_eq!(budget.max_entities_per_batch_by_output, 4);
    }

    #[test]
    fn max_input_never_drops_below_one_thousand() {
        let model = ModelDescriptor {
            id: "tiny".to_string(),
            context_window: 500,
            max_output_tokens: 400,
            provider: "test".to_string(),
        };
        let budget = TokenBudget::derive(&model, 400, 0.8, 500);
        assert_eq!(budget.max_input, 1000);
    }
}
