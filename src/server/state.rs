//! Shared router state

use crate::service::SegmentationService;
use std::sync::Arc;

/// State handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: Arc<SegmentationService>,
}

impl AppState {
    #[must_use]
    pub fn new(service: SegmentationService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
