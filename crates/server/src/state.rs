use std::sync::Arc;

use reprocess_core::service::LocalStatusService;
use reprocess_core::{Config, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    service: Arc<LocalStatusService>,
}

impl AppState {
    pub fn new(config: Config, service: Arc<LocalStatusService>) -> Self {
        Self { config, service }
    }

    pub fn service(&self) -> &LocalStatusService {
        self.service.as_ref()
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }
}
