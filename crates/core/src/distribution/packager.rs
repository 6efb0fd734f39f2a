//! Product archive creation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use super::checksum::{checksum_line, file_digest};
use super::DistributionError;
use crate::config::ChecksumKind;
use crate::process::{CommandRunner, CommandSpec};

/// A packaged product and its checksum file, both in the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub archive: PathBuf,
    pub checksum_file: PathBuf,
    pub digest: String,
}

impl Package {
    pub fn archive_name(&self) -> String {
        file_name(&self.archive)
    }

    pub fn checksum_name(&self) -> String {
        file_name(&self.checksum_file)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Builds `<product>.tar.gz` plus its checksum file.
pub struct Packager {
    runner: Arc<dyn CommandRunner>,
    checksum: ChecksumKind,
}

impl Packager {
    pub fn new(runner: Arc<dyn CommandRunner>, checksum: ChecksumKind) -> Self {
        Self { runner, checksum }
    }

    /// Archive the contents of `source_dir` as `product_name` into `staging_dir`.
    ///
    /// Both files are written under temporary names and renamed into place
    /// once the archive lists cleanly, so a failed attempt leaves nothing
    /// that looks like a finished product.
    pub async fn package(
        &self,
        source_dir: &Path,
        product_name: &str,
        staging_dir: &Path,
    ) -> Result<Package, DistributionError> {
        if !has_entries(source_dir).await {
            return Err(DistributionError::MissingOutput(source_dir.to_path_buf()));
        }
        fs::create_dir_all(staging_dir).await.map_err(|e| {
            DistributionError::io(format!("failed to create {}", staging_dir.display()), e)
        })?;

        let archive_name = format!("{}.tar.gz", product_name);
        let checksum_name = format!("{}.{}", product_name, self.checksum.extension());
        let tag = Uuid::new_v4().simple().to_string();
        let tmp_archive = staging_dir.join(format!(".{}.{}.tmp", archive_name, tag));
        let tmp_checksum = staging_dir.join(format!(".{}.{}.tmp", checksum_name, tag));

        let result = self
            .build(source_dir, &tmp_archive, &tmp_checksum, &archive_name)
            .await;
        let digest = match result {
            Ok(digest) => digest,
            Err(e) => {
                let _ = fs::remove_file(&tmp_archive).await;
                let _ = fs::remove_file(&tmp_checksum).await;
                return Err(e);
            }
        };

        let archive = staging_dir.join(&archive_name);
        let checksum_file = staging_dir.join(&checksum_name);
        rename(&tmp_archive, &archive).await?;
        rename(&tmp_checksum, &checksum_file).await?;

        info!(product = %product_name, digest = %digest, "Packaged product");
        Ok(Package {
            archive,
            checksum_file,
            digest,
        })
    }

    async fn build(
        &self,
        source_dir: &Path,
        tmp_archive: &Path,
        tmp_checksum: &Path,
        archive_name: &str,
    ) -> Result<String, DistributionError> {
        let create = CommandSpec::new("tar")
            .arg("-czf")
            .path_arg(tmp_archive)
            .arg("-C")
            .path_arg(source_dir)
            .arg(".");
        self.runner.run(&create).await?.check("tar")?;

        // A truncated or corrupt archive fails to list.
        let verify = CommandSpec::new("tar").arg("-tzf").path_arg(tmp_archive);
        let listing = self.runner.run(&verify).await?.check("tar")?;
        debug!(entries = listing.stdout.lines().count(), "Archive verified");

        let digest = file_digest(tmp_archive, self.checksum).await?;
        fs::write(tmp_checksum, checksum_line(&digest, archive_name))
            .await
            .map_err(|e| {
                DistributionError::io(format!("failed to write {}", tmp_checksum.display()), e)
            })?;
        Ok(digest)
    }
}

async fn has_entries(dir: &Path) -> bool {
    match fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

async fn rename(from: &Path, to: &Path) -> Result<(), DistributionError> {
    fs::rename(from, to).await.map_err(|e| {
        DistributionError::io(
            format!("failed to rename {} to {}", from.display(), to.display()),
            e,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::checksum::parse_digest;
    use crate::process::TokioCommandRunner;
    use crate::testing::MockCommandRunner;
    use tempfile::TempDir;

    fn output_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("LT50440341996220_sr.img"), b"reflectance").unwrap();
        std::fs::write(dir.path().join("LT50440341996220.xml"), b"<espa/>").unwrap();
        dir
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_package_with_real_tar() {
        let source = output_dir();
        let staging = TempDir::new().unwrap();
        let packager = Packager::new(Arc::new(TokioCommandRunner::new()), ChecksumKind::Md5);

        let package = packager
            .package(source.path(), "LT50440341996220-SC20141019093015", staging.path())
            .await
            .unwrap();

        assert_eq!(package.archive_name(), "LT50440341996220-SC20141019093015.tar.gz");
        assert_eq!(package.checksum_name(), "LT50440341996220-SC20141019093015.md5");
        assert!(package.archive.exists());

        let checksum = std::fs::read_to_string(&package.checksum_file).unwrap();
        assert_eq!(parse_digest(&checksum), Some(package.digest.clone()));
        assert!(checksum.ends_with("  LT50440341996220-SC20141019093015.tar.gz\n"));
        assert_eq!(
            file_digest(&package.archive, ChecksumKind::Md5).await.unwrap(),
            package.digest
        );

        // Only the two final files remain.
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_empty_output_is_not_retryable() {
        let source = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let packager = Packager::new(Arc::new(MockCommandRunner::new()), ChecksumKind::Md5);

        let err = packager
            .package(source.path(), "product", staging.path())
            .await
            .unwrap_err();
        assert!(matches!(err, DistributionError::MissingOutput(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_failed_verification_leaves_no_files() {
        let source = output_dir();
        let staging = TempDir::new().unwrap();
        let runner = Arc::new(MockCommandRunner::new());
        runner.push_exit("tar", 0);
        runner.push_failure("tar", 2, "gzip: stdin: unexpected end of file");
        let packager = Packager::new(runner.clone(), ChecksumKind::Md5);

        let err = packager
            .package(source.path(), "product", staging.path())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args[0], "-czf");
        assert_eq!(calls[1].args[0], "-tzf");
    }
}
