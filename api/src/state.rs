use std::sync::Arc;

use crate::pipeline::TutorPipeline;

/// Shared, read-only state. Each request runs its own pipeline pass; nothing
/// here is mutated after startup.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<TutorPipeline>,
}
