use std::sync::Arc;

use crate::services::{queue::JobQueue, targets::TargetStore};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn JobQueue>,
    pub targets: Arc<dyn TargetStore>,
}

impl AppState {
    pub fn new(queue: impl JobQueue + 'static, targets: impl TargetStore + 'static) -> Self {
        Self {
            queue: Arc::new(queue),
            targets: Arc::new(targets),
        }
    }
}
