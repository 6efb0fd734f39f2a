//! Mock distribution transport for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::{read, write};
use crate::config::ChecksumKind;
use crate::distribution::{file_digest, DistributionError, Transport};

/// A successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDelivery {
    pub local: PathBuf,
    pub dest: String,
}

/// Mock implementation of the Transport trait.
///
/// Deliveries are only recorded, never copied. The digest reported for a
/// delivered path is computed from the local file, unless digests are set
/// to come back corrupted.
#[derive(Debug, Default)]
pub struct MockTransport {
    delivered: Arc<RwLock<Vec<RecordedDelivery>>>,
    sources: Arc<RwLock<HashMap<String, PathBuf>>>,
    removed: Arc<RwLock<Vec<String>>>,
    failing_deliveries: Arc<RwLock<u32>>,
    corrupt_digests: Arc<RwLock<bool>>,
    fail_removals: Arc<RwLock<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` deliveries with a retryable error.
    pub fn fail_deliveries(&self, count: u32) {
        *write(&self.failing_deliveries) = count;
    }

    /// Report a wrong digest for every delivered file.
    pub fn corrupt_digests(&self, corrupt: bool) {
        *write(&self.corrupt_digests) = corrupt;
    }

    pub fn fail_removals(&self, fail: bool) {
        *write(&self.fail_removals) = fail;
    }

    pub fn delivered(&self) -> Vec<RecordedDelivery> {
        read(&self.delivered).clone()
    }

    pub fn removed(&self) -> Vec<String> {
        read(&self.removed).clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn prepare(&self, _dest_dir: &str) -> Result<(), DistributionError> {
        Ok(())
    }

    async fn deliver(&self, local: &Path, dest_dir: &str) -> Result<String, DistributionError> {
        {
            let mut failing = write(&self.failing_deliveries);
            if *failing > 0 {
                *failing -= 1;
                return Err(DistributionError::Transport(
                    "mock: connection reset during copy".to_string(),
                ));
            }
        }

        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dest = format!("{}/{}", dest_dir.trim_end_matches('/'), name);
        write(&self.sources).insert(dest.clone(), local.to_path_buf());
        write(&self.delivered).push(RecordedDelivery {
            local: local.to_path_buf(),
            dest: dest.clone(),
        });
        Ok(dest)
    }

    async fn remote_digest(
        &self,
        path: &str,
        kind: ChecksumKind,
    ) -> Result<String, DistributionError> {
        if *read(&self.corrupt_digests) {
            return Ok("0".repeat(32));
        }
        let source = read(&self.sources).get(path).cloned().ok_or_else(|| {
            DistributionError::Transport(format!("mock: nothing delivered at {}", path))
        })?;
        file_digest(&source, kind).await
    }

    async fn remove(&self, path: &str) -> Result<(), DistributionError> {
        if *read(&self.fail_removals) {
            return Err(DistributionError::Transport(format!(
                "mock: permission denied removing {}",
                path
            )));
        }
        write(&self.removed).push(path.to_string());
        Ok(())
    }

    fn location(&self, path: &str) -> String {
        path.to_string()
    }
}
