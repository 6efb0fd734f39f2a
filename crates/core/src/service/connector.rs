use std::sync::Arc;
use std::time::Duration;

use super::{HttpStatusClient, ServiceError, StatusService};

/// Opens a Status Service handle for a record's callback address.
pub trait StatusConnector: Send + Sync {
    fn connect(&self, callback_address: &str) -> Result<Arc<dyn StatusService>, ServiceError>;
}

/// Connects over HTTP with a fixed request timeout.
pub struct HttpStatusConnector {
    timeout: Duration,
}

impl HttpStatusConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl StatusConnector for HttpStatusConnector {
    fn connect(&self, callback_address: &str) -> Result<Arc<dyn StatusService>, ServiceError> {
        if !callback_address.starts_with("http://") && !callback_address.starts_with("https://") {
            return Err(ServiceError::Rejected(format!(
                "callback address is not an http(s) url: {}",
                callback_address
            )));
        }
        Ok(Arc::new(HttpStatusClient::new(callback_address, self.timeout)?))
    }
}

/// Always hands out the same service, whatever the address.
pub struct FixedConnector {
    service: Arc<dyn StatusService>,
}

impl FixedConnector {
    pub fn new(service: Arc<dyn StatusService>) -> Self {
        Self { service }
    }
}

impl StatusConnector for FixedConnector {
    fn connect(&self, _callback_address: &str) -> Result<Arc<dyn StatusService>, ServiceError> {
        Ok(self.service.clone())
    }
}
