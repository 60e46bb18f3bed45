use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Budget and threshold knobs for the Justification Pipeline (§4.4, §6
/// `JustifyOptions`). Deliberately plain and `serde`-deserializable so it
/// can be layered from files/env without the pipeline needing to know
/// where it came from.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    /// Fraction of model capacity left unused, per §4.4 (`0.80` means the
    /// pipeline only spends 20% of the model's advertised capacity).
    #[serde(default = "PipelineConfig::default_safety_margin")]
    pub safety_margin: f32,

    /// Hard ceiling on entities per batch, independent of token budgets.
    #[serde(default = "PipelineConfig::default_hard_cap")]
    pub hard_cap: usize,

    /// Assumed output tokens consumed per justified entity, used to derive
    /// `max_entities_per_batch_by_output`.
    #[serde(default = "PipelineConfig::default_output_tokens_per_entity")]
    pub output_tokens_per_entity: usize,

    /// Estimated token cost of the fixed batch system prompt.
    #[serde(default = "PipelineConfig::default_system_prompt_tokens")]
    pub system_prompt_tokens: usize,

    /// Below this confidence, an existing justification is still
    /// eligible for re-inference (§4.5 step 1, §6 `JustifyOptions`).
    #[serde(default = "PipelineConfig::default_min_confidence")]
    pub min_confidence: f32,

    /// Confidence boost applied to a child on top-down inheritance (§4.6).
    #[serde(default = "PipelineConfig::default_confidence_delta")]
    pub confidence_delta: f32,

    /// Cap on tags inherited from a parent during top-down propagation.
    #[serde(default = "PipelineConfig::default_max_inherited_tags")]
    pub max_inherited_tags: usize,

    /// Bounded number of children's purpose summaries folded into a
    /// parent's `detailed_description` during bottom-up aggregation.
    #[serde(default = "PipelineConfig::default_max_aggregated_children")]
    pub max_aggregated_children: usize,

    /// Bounded retry attempts for per-entity LLM fallback (§4.5).
    #[serde(default = "PipelineConfig::default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Bounded retry attempts for storage writes (§4.5, §7).
    #[serde(default = "PipelineConfig::default_max_storage_retries")]
    pub max_storage_retries: u32,

    /// Upper bound on batches dispatched concurrently within a level (§5).
    #[serde(default = "PipelineConfig::default_in_flight_batches")]
    pub in_flight_batches: usize,
}

impl PipelineConfig {
    fn default_safety_margin() -> f32 {
        0.80
    }
    fn default_hard_cap() -> usize {
        25
    }
    fn default_output_tokens_per_entity() -> usize {
        500
    }
    fn default_system_prompt_tokens() -> usize {
        400
    }
    fn default_min_confidence() -> f32 {
        0.3
    }
    fn default_confidence_delta() -> f32 {
        0.05
    }
    fn default_max_inherited_tags() -> usize {
        5
    }
    fn default_max_aggregated_children() -> usize {
        5
    }
    fn default_max_retry_attempts() -> u32 {
        2
    }
    fn default_max_storage_retries() -> u32 {
        3
    }
    fn default_in_flight_batches() -> usize {
        4
    }

    /// Layer defaults, an optional `codegraph.toml` next to `config_dir`,
    /// and `CODEGRAPH_`-prefixed environment variables, matching the
    /// donor's `Settings::load_from_sources` layering (minus the
    /// encrypted-secrets source, which this crate has no use for).
    pub fn load(config_dir: &Path) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(
                config::File::from(config_dir.join("codegraph.toml")).required(false),
            )
            .add_source(config::Environment::with_prefix("CODEGRAPH").separator("__"));

        let raw = builder.build().context("building pipeline configuration")?;
        match raw.try_deserialize::<Self>() {
            Ok(cfg) => Ok(cfg),
            // An empty/absent config source still needs to produce defaults.
            Err(_) => Ok(Self::default()),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            safety_margin: Self::default_safety_margin(),
            hard_cap: Self::default_hard_cap(),
            output_tokens_per_entity: Self::default_output_tokens_per_entity(),
            system_prompt_tokens: Self::default_system_prompt_tokens(),
            min_confidence: Self::default_min_confidence(),
            confidence_delta: Self::default_confidence_delta(),
            max_inherited_tags: Self::default_max_inherited_tags(),
            max_aggregated_children: Self::default_max_aggregated_children(),
            max_retry_attempts: Self::default_max_retry_attempts(),
            max_storage_retries: Self::default_max_storage_retries(),
            in_flight_batches: Self::default_in_flight_batches(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.hard_cap, 25);
        assert_eq!(cfg.output_tokens_per_entity, 500);
        assert!((cfg.safety_margin - 0.80).abs() < f32::EPSILON);
    }

    #[test]
    fn load_falls_back_to_defaults_when_dir_missing() {
        let cfg = PipelineConfig::load(Path::new("/nonexistent/dir")).unwrap();
        assert_eq!(cfg.hard_cap, PipelineConfig::default().hard_cap);
    }
}
