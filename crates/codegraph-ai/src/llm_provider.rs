use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for LLM operations. Transport failures stay `anyhow`-typed
/// at this seam; the orchestrator (C5) is responsible for mapping them
/// into `codegraph_core::JustifyError::{LlmUnavailable,LlmParse}` before
/// they reach the rest of the pipeline.
pub type LLMResult<T> = anyhow::Result<T>;

/// Performance characteristics of an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCharacteristics {
    pub max_tokens: usize,
    pub avg_latency_ms: u64,
    pub supports_streaming: bool,
}

/// JSON schema for structured output (§4.5 "JSON-schema constraint").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSchema {
    pub name: String,
    pub schema: serde_json::Value,
    pub strict: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema { json_schema: JsonSchema },
}

/// Generation parameters for a single call (§6 "LLM transport interface").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub response_format: Option<ResponseFormat>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: Some(4096),
            response_format: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Response from the LLM (§6: `{text, model_id, ...}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub text: String,
    pub model_id: String,
    pub prompt_tokens: Option<usize>,
    pub completion_tokens: Option<usize>,
}

/// The LLM transport seam consumed by C5 (§6). Deliberately narrow: one
/// call shape, plus a readiness probe used by the unavailable-fallback
/// path (§4.5, §8 scenario 6).
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> LLMResult<LLMResponse> {
        let messages = vec![Message {
            role: MessageRole::User,
            content: prompt.to_string(),
        }];
        self.complete(&messages, &GenerationConfig::default()).await
    }

    async fn complete(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LLMResult<LLMResponse>;

    async fn is_ready(&self) -> bool;

    fn provider_name(&self) -> &str;
    fn model_name(&self) -> &str;
    fn characteristics(&self) -> ProviderCharacteristics;
    fn context_window(&self) -> usize {
        self.characteristics().max_tokens
    }
}
