//! Shared application state.

use std::sync::Arc;

use narravo_catalog::Catalog;
use narravo_queue::{ProgressChannel, TaskQueue};

use crate::config::ApiConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub catalog: Catalog,
    pub queue: Arc<TaskQueue>,
    pub progress: ProgressChannel,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        catalog: Catalog,
        queue: TaskQueue,
        progress: ProgressChannel,
    ) -> Self {
        Self {
            config: Arc::new(config),
            catalog,
            queue: Arc::new(queue),
            progress,
        }
    }
}
