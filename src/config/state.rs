// Application state module
// Shared, read-only state handed to every connection

use super::types::Config;
use crate::upload::UploadStore;

/// Application state
#[derive(Debug)]
pub struct AppState {
    pub config: Config,
    pub uploads: UploadStore,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let uploads = UploadStore::new(config.storage.upload_dir.clone());
        Self { config, uploads }
    }
}
