use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::checksum::file_digest;
use super::DistributionError;
use crate::config::ChecksumKind;

/// Moves packaged files into the distribution cache.
///
/// Destination paths are plain strings because they may live on another host.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Make sure `dest_dir` exists.
    async fn prepare(&self, dest_dir: &str) -> Result<(), DistributionError>;

    /// Copy `local` into `dest_dir`, replacing any earlier copy in one step.
    /// Returns the destination path.
    async fn deliver(&self, local: &Path, dest_dir: &str) -> Result<String, DistributionError>;

    /// Digest of a delivered file as seen at the destination.
    async fn remote_digest(&self, path: &str, kind: ChecksumKind)
        -> Result<String, DistributionError>;

    /// Delete a delivered file. Deleting a missing file succeeds.
    async fn remove(&self, path: &str) -> Result<(), DistributionError>;

    /// How a destination path is reported when no public base URL is set.
    fn location(&self, path: &str) -> String;
}

pub(crate) fn join_remote(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

pub(crate) fn local_file_name(local: &Path) -> Result<String, DistributionError> {
    local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| DistributionError::Transport(format!("{} has no file name", local.display())))
}

/// Delivers into a directory on this host (or a mounted share).
#[derive(Debug, Clone, Default)]
pub struct LocalTransport;

impl LocalTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn prepare(&self, dest_dir: &str) -> Result<(), DistributionError> {
        fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| DistributionError::io(format!("failed to create {}", dest_dir), e))
    }

    async fn deliver(&self, local: &Path, dest_dir: &str) -> Result<String, DistributionError> {
        let name = local_file_name(local)?;
        let dest = join_remote(dest_dir, &name);
        let part = format!("{}.part", dest);

        fs::copy(local, &part).await.map_err(|e| {
            DistributionError::io(format!("failed to copy {} to {}", local.display(), part), e)
        })?;
        if let Err(e) = fs::rename(&part, &dest).await {
            let _ = fs::remove_file(&part).await;
            return Err(DistributionError::io(
                format!("failed to rename {} to {}", part, dest),
                e,
            ));
        }
        debug!(dest = %dest, "Delivered file");
        Ok(dest)
    }

    async fn remote_digest(
        &self,
        path: &str,
        kind: ChecksumKind,
    ) -> Result<String, DistributionError> {
        file_digest(Path::new(path), kind).await
    }

    async fn remove(&self, path: &str) -> Result<(), DistributionError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DistributionError::io(format!("failed to remove {}", path), e)),
        }
    }

    fn location(&self, path: &str) -> String {
        path.to_string()
    }
}
