//! `JustifyOptions` and related request-shaping types (§6).

use crate::progress::ProgressCallback;
use tokio_util::sync::CancellationToken;

/// Project-level context threaded into LLM prompts so batches don't need
/// to re-derive "what kind of project is this" per entity (§6
/// `JustifyOptions.project_context`).
#[derive(Debug, Clone, Default)]
pub struct ProjectContext {
    pub name: Option<String>,
    pub description: Option<String>,
    pub domain: Option<String>,
    pub features: Vec<String>,
}

/// Options accepted by every `justify_*` entry point (§6 `JustifyOptions`).
#[derive(Clone)]
pub struct JustifyOptions {
    pub force: bool,
    pub min_confidence: f32,
    pub skip_llm: bool,
    pub propagate_context: bool,
    pub batch_size: usize,
    pub use_dynamic_batching: bool,
    pub filter_ignored_paths: bool,
    pub model_id: Option<String>,
    pub on_progress: Option<ProgressCallback>,
    pub project_context: Option<ProjectContext>,
    /// Cooperative cancellation signal, checked at batch boundaries and at
    /// entity boundaries within the trivial phase (§5).
    pub cancellation: Option<CancellationToken>,
}

impl JustifyOptions {
    /// True once the caller's cancellation token (if any) has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

impl std::fmt::Debug for JustifyOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JustifyOptions")
            .field("force", &self.force)
            .field("min_confidence", &self.min_confidence)
            .field("skip_llm", &self.skip_llm)
            .field("propagate_context", &self.propagate_context)
            .field("batch_size", &self.batch_size)
            .field("use_dynamic_batching", &self.use_dynamic_batching)
            .field("filter_ignored_paths", &self.filter_ignored_paths)
            .field("model_id", &self.model_id)
            .field("on_progress", &self.on_progress.is_some())
            .field("cancellation", &self.cancellation.is_some())
            .finish()
    }
}

impl Default for JustifyOptions {
    fn default() -> Self {
        Self {
            force: false,
            min_confidence: 0.3,
            skip_llm: false,
            propagate_context: true,
            batch_size: 10,
            use_dynamic_batching: true,
            filter_ignored_paths: true,
            model_id: None,
            on_progress: None,
            project_context: None,
            cancellation: None,
        }
    }
}
