//! Status Service: the one channel through which components move scene state.

mod client;
mod connector;
mod error;
mod local;
mod retry;
mod traits;
mod types;

pub use client::HttpStatusClient;
pub use connector::{FixedConnector, HttpStatusConnector, StatusConnector};
pub use error::ServiceError;
pub use local::LocalStatusService;
pub use retry::{with_service_retry, ServiceRetry};
pub use traits::StatusService;
pub use types::*;
