use std::path::PathBuf;

use async_trait::async_trait;

use super::FinalizeError;
use crate::sensor::SceneId;

/// Where a scene's input stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// In the local input cache; ready to dispatch.
    OnCache,
    /// Missing but can be ordered from the upstream archive.
    Orderable,
    /// Missing and will never arrive.
    Unavailable,
}

/// Decides whether a scene's input can be processed.
#[async_trait]
pub trait InputAvailability: Send + Sync {
    async fn check(&self, scene: &SceneId) -> Result<Availability, FinalizeError>;
}

/// Checks the input cache directory the workers stage from.
pub struct LocalInputCache {
    input_dir: PathBuf,
}

impl LocalInputCache {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
        }
    }
}

#[async_trait]
impl InputAvailability for LocalInputCache {
    async fn check(&self, scene: &SceneId) -> Result<Availability, FinalizeError> {
        // A missing root means the cache is not mounted, not that every
        // scene is gone.
        if !tokio::fs::try_exists(&self.input_dir).await.unwrap_or(false) {
            return Err(FinalizeError::Input(format!(
                "input cache {} does not exist",
                self.input_dir.display()
            )));
        }

        let path = self.input_dir.join(scene.input_relative_path());
        let present = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| FinalizeError::Input(format!("{}: {}", path.display(), e)))?;
        Ok(if present {
            Availability::OnCache
        } else if scene.input_orderable() {
            Availability::Orderable
        } else {
            Availability::Unavailable
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_cache() {
        let input = TempDir::new().unwrap();
        let cache = LocalInputCache::new(input.path());
        let landsat = SceneId::parse(fixtures::LANDSAT_SCENE).unwrap();
        let modis = SceneId::parse(fixtures::MODIS_SCENE).unwrap();

        assert_eq!(cache.check(&landsat).await.unwrap(), Availability::Orderable);
        assert_eq!(cache.check(&modis).await.unwrap(), Availability::Unavailable);

        fixtures::write_input(input.path(), &modis);
        assert_eq!(cache.check(&modis).await.unwrap(), Availability::OnCache);
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let cache = LocalInputCache::new("/nonexistent/input");
        let scene = SceneId::parse(fixtures::MODIS_SCENE).unwrap();
        assert!(matches!(
            cache.check(&scene).await,
            Err(FinalizeError::Input(_))
        ));
    }
}
