pub mod fallback;
pub mod justification_schema;
pub mod llm_factory;
pub mod llm_provider;
pub mod token_budget;

#[cfg(feature = "anthropic")]
pub mod anthropic_provider;

pub use fallback::code_analysis_fallback;
pub use justification_schema::{
    justification_response_format, JustificationBatchResponse, JustificationResponseItem,
};
pub use llm_factory::LLMProviderFactory;
pub use llm_provider::*;
pub use token_budget::{estimate_entity_input_tokens, estimate_tokens, ModelDescriptor, TokenBudget};
