use crate::llm_provider::LLMProvider;
use anyhow::{anyhow, Result};
use std::sync::Arc;

#[cfg(feature = "anthropic")]
use crate::anthropic_provider::{AnthropicConfig, AnthropicProvider};

/// Builds the LLM transport the Inference Orchestrator (C5) calls out to.
///
/// The pipeline never constructs a provider directly; it depends only on
/// the `LLMProvider` trait object so the code-analysis fallback (§4.5) can
/// run identically whether no provider was configured at all or a real one
/// timed out mid-run.
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    /// Build the default provider from environment configuration, if the
    /// `anthropic` feature is compiled in and `ANTHROPIC_API_KEY` is set.
    pub fn from_env() -> Result<Arc<dyn LLMProvider>> {
        #[cfg(feature = "anthropic")]
        {
            let provider = AnthropicProvider::new(AnthropicConfig::default())?;
            return Ok(Arc::new(provider));
        }

        #[cfg(not(feature = "anthropic"))]
        {
            Err(anyhow!(
                "no LLM provider compiled in; rebuild with --features anthropic \
                 or pass skip_llm: true to run the pipeline on trivial/fallback justifications only"
            ))
        }
    }

    pub fn supported_providers() -> Vec<&'static str> {
        let mut providers = Vec::new();

        #[cfg(feature = "anthropic")]
        providers.push("anthropic");

        providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_providers_reflects_compiled_features() {
        let providers = LLMProviderFactory::supported_providers();
        if cfg!(feature = "anthropic") {
            assert!(providers.contains(&"anthropic"));
        } else {
            assert!(providers.is_empty());
        }
    }
}
