//! Progress events (§6 "Progress events"). A separate, purely informational
//! channel from logging: callers observe run progress through this, never
//! by scraping `tracing` output, and nothing in the pipeline's control flow
//! may depend on whether a callback is registered.

/// The four phases a justification run passes through, in order, once per
/// processing level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    BuildingContext,
    Inferring,
    Propagating,
    Storing,
}

impl ProgressPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressPhase::BuildingContext => "building_context",
            ProgressPhase::Inferring => "inferring",
            ProgressPhase::Propagating => "propagating",
            ProgressPhase::Storing => "storing",
        }
    }
}

/// A single progress notification (§6).
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    pub current: usize,
    pub total: usize,
    pub current_entity: Option<String>,
    pub message: Option<String>,
}

impl ProgressEvent {
    pub fn new(phase: ProgressPhase, current: usize, total: usize) -> Self {
        Self {
            phase,
            current,
            total,
            current_entity: None,
            message: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.current_entity = Some(entity.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// A progress callback, boxed so `JustifyOptions` stays `Send` and cheap to
/// move around between async tasks.
pub type ProgressCallback = std::sync::Arc<dyn Fn(ProgressEvent) + Send + Sync>;
