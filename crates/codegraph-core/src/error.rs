use thiserror::Error;

/// Error taxonomy (§7). `oversized_entity` is deliberately absent — the
/// spec calls it out as "not an error for the caller"; it is surfaced via
/// `BatchStats` instead.
#[derive(Error, Debug)]
pub enum JustifyError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM response could not be parsed: {0}")]
    LlmParse(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, JustifyError>;
