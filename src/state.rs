use std::sync::Arc;

use crate::config::settings::AppConfig;
use crate::infrastructure::queue::JobQueue;
use crate::infrastructure::storage::artifacts::ArtifactStore;
use crate::modules::content::repository::AssetRepository;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub assets: Arc<dyn AssetRepository>,
    pub queue: Arc<dyn JobQueue>,
    pub store: ArtifactStore,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        assets: Arc<dyn AssetRepository>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        let store = ArtifactStore::new(config.media_root.clone());
        Self {
            config,
            assets,
            queue,
            store,
        }
    }
}
