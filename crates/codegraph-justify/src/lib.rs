//! The Justification Pipeline: triviality filtering (C3), token batching
//! (C4), inference orchestration (C5), context propagation (C6), and the
//! `JustificationPipeline` facade tying them to a `GraphAdapter`.

pub mod batcher;
pub mod context;
pub mod options;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod result;
pub mod triviality;

pub use batcher::{pack, Batch, BatchStats, LimitingConstraint};
pub use context::{aggregate_up, build_context, propagate_down, Hierarchy, JustificationContext};
pub use options::{JustifyOptions, ProjectContext};
pub use orchestrator::InferenceOrchestrator;
pub use pipeline::{ClarificationAnswer, FileCoverage, JustificationPipeline, PipelineStats, UserJustificationInput};
pub use progress::{ProgressCallback, ProgressEvent, ProgressPhase};
pub use result::{EntityFailure, JustificationResult, JustificationStats};
pub use triviality::{classify as classify_triviality, default_justification as default_trivial_justification, TrivialReason};
