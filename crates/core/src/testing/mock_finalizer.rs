//! Mock notifier and input availability for finalizer tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{read, write};
use crate::finalizer::{Availability, FinalizeError, InputAvailability, Notifier, NotifyError};
use crate::sensor::SceneId;
use crate::status::Order;

/// Mock implementation of the Notifier trait.
#[derive(Debug, Default)]
pub struct MockNotifier {
    notified: Arc<RwLock<Vec<String>>>,
    failures: Arc<RwLock<u32>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` notifications.
    pub fn fail_next(&self, count: u32) {
        *write(&self.failures) = count;
    }

    /// Ids of orders successfully notified, in order.
    pub fn notified(&self) -> Vec<String> {
        read(&self.notified).clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, order: &Order) -> Result<(), NotifyError> {
        {
            let mut failures = write(&self.failures);
            if *failures > 0 {
                *failures -= 1;
                return Err(NotifyError::Rejected {
                    status: 503,
                    body: "mock: mail relay down".to_string(),
                });
            }
        }
        write(&self.notified).push(order.id.clone());
        Ok(())
    }
}

/// Mock implementation of the InputAvailability trait.
///
/// Answers per scene id, falling back to a default.
#[derive(Debug)]
pub struct MockInputAvailability {
    default: Availability,
    answers: Arc<RwLock<HashMap<String, Availability>>>,
    error: Arc<RwLock<Option<String>>>,
}

impl MockInputAvailability {
    pub fn new(default: Availability) -> Self {
        Self {
            default,
            answers: Arc::new(RwLock::new(HashMap::new())),
            error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn set(&self, scene_id: &str, availability: Availability) {
        write(&self.answers).insert(scene_id.to_string(), availability);
    }

    /// Fail every check with `message` from now on.
    pub fn fail_with(&self, message: &str) {
        *write(&self.error) = Some(message.to_string());
    }
}

#[async_trait]
impl InputAvailability for MockInputAvailability {
    async fn check(&self, scene: &SceneId) -> Result<Availability, FinalizeError> {
        if let Some(message) = read(&self.error).clone() {
            return Err(FinalizeError::Input(message));
        }
        Ok(read(&self.answers)
            .get(scene.as_str())
            .copied()
            .unwrap_or(self.default))
    }
}
