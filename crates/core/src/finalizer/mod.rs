//! Order finalizer and purge.
//!
//! Runs periodically, independent of scene processing: moves submitted
//! scenes onto the cache, resets stale `processing` scenes, completes and
//! announces finished orders, and removes products past retention.

mod error;
mod intake;
mod notifier;
mod runner;

use std::sync::Arc;
use std::time::Duration;

pub use error::{FinalizeError, NotifyError};
pub use intake::{Availability, InputAvailability, LocalInputCache};
pub use notifier::{CompletionNotice, LogNotifier, Notifier, WebhookNotifier};
pub use runner::{FinalizeReport, FinalizeStep, Finalizer, IntakeReport};

use crate::config::FinalizerConfig;

/// Webhook notifier when `notify_url` is set, log-only otherwise.
pub fn notifier_for(
    config: &FinalizerConfig,
    timeout: Duration,
) -> Result<Arc<dyn Notifier>, NotifyError> {
    match &config.notify_url {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url.clone(), timeout)?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
