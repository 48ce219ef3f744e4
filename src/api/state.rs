use std::sync::Arc;

use crate::config::Config;
use crate::observability::Metrics;
use crate::queue::JobQueue;
use crate::storage::StorageClient;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<StorageClient>,
    pub queue: Arc<dyn JobQueue>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Config,
        storage: Arc<StorageClient>,
        queue: Arc<dyn JobQueue>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            queue,
            metrics,
        }
    }
}
