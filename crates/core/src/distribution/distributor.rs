use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use super::{
    retry_with_backoff, DistributionError, LocalTransport, Package, Packager, Phase,
    RemoteTransport, RetryPolicy, Transport,
};
use crate::config::{DistributionConfig, DistributionMethod};
use crate::process::CommandRunner;

/// Where a scene's product ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub product_location: String,
    pub checksum_location: String,
    pub digest: String,
}

/// Packages a scene's output and delivers it into the order's cache directory.
pub struct Distributor {
    config: DistributionConfig,
    packager: Packager,
    transport: Arc<dyn Transport>,
    packaging: RetryPolicy,
    delivery: RetryPolicy,
    distribution: RetryPolicy,
}

impl Distributor {
    pub fn new(
        config: DistributionConfig,
        runner: Arc<dyn CommandRunner>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            packager: Packager::new(runner, config.checksum),
            transport,
            packaging: RetryPolicy::from(&config.packaging),
            delivery: RetryPolicy::from(&config.delivery),
            distribution: RetryPolicy::from(&config.distribution),
            config,
        }
    }

    /// Pick the transport named by the configuration.
    pub fn from_config(
        config: DistributionConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, DistributionError> {
        let transport = transport_for(&config, runner.clone())?;
        Ok(Self::new(config, runner, transport))
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// `<cache_dir>/orders/<order_id>`
    pub fn order_dir(&self, order_id: &str) -> String {
        format!(
            "{}/orders/{}",
            self.config.cache_dir.trim_end_matches('/'),
            order_id
        )
    }

    fn public_location(&self, order_id: &str, dest_path: &str) -> String {
        match &self.config.base_url {
            Some(base) => {
                let name = dest_path.rsplit('/').next().unwrap_or(dest_path);
                format!("{}/orders/{}/{}", base.trim_end_matches('/'), order_id, name)
            }
            None => self.transport.location(dest_path),
        }
    }

    /// Package `output_dir` as `product_name` (staging in `staging_dir`) and
    /// deliver it for `order_id`.
    pub async fn distribute(
        &self,
        order_id: &str,
        product_name: &str,
        output_dir: &Path,
        staging_dir: &Path,
    ) -> Result<Delivered, DistributionError> {
        let delivered = retry_with_backoff(Phase::Distribution, &self.distribution, |_| async move {
            let package = retry_with_backoff(Phase::Packaging, &self.packaging, |_| {
                self.packager.package(output_dir, product_name, staging_dir)
            })
            .await?;

            retry_with_backoff(Phase::Delivery, &self.delivery, |_| {
                self.deliver(order_id, &package)
            })
            .await
        })
        .await?;

        info!(
            order_id = %order_id,
            product = %product_name,
            location = %delivered.product_location,
            "Product distributed"
        );
        Ok(delivered)
    }

    async fn deliver(
        &self,
        order_id: &str,
        package: &Package,
    ) -> Result<Delivered, DistributionError> {
        let dest_dir = self.order_dir(order_id);
        self.transport.prepare(&dest_dir).await?;

        let product_path = self.transport.deliver(&package.archive, &dest_dir).await?;
        let checksum_path = self
            .transport
            .deliver(&package.checksum_file, &dest_dir)
            .await?;

        let actual = self
            .transport
            .remote_digest(&product_path, self.config.checksum)
            .await?;
        if actual != package.digest {
            warn!(order_id = %order_id, path = %product_path, "Delivered product checksum mismatch");
            return Err(DistributionError::ChecksumMismatch {
                location: product_path,
                expected: package.digest.clone(),
                actual,
            });
        }

        Ok(Delivered {
            product_location: self.public_location(order_id, &product_path),
            checksum_location: self.public_location(order_id, &checksum_path),
            digest: package.digest.clone(),
        })
    }

    /// Remove a scene's delivered files, given the locations reported at
    /// completion. Locations are mapped back to files in the order directory.
    pub async fn purge(
        &self,
        order_id: &str,
        locations: &[Option<&str>],
    ) -> Result<usize, DistributionError> {
        let dest_dir = self.order_dir(order_id);
        let mut removed = 0;
        for location in locations.iter().flatten() {
            let name = location
                .rsplit(['/', ':'])
                .next()
                .filter(|n| !n.is_empty())
                .ok_or_else(|| {
                    DistributionError::Transport(format!("cannot purge location {}", location))
                })?;
            self.transport
                .remove(&format!("{}/{}", dest_dir, name))
                .await?;
            removed += 1;
        }
        Ok(removed)
    }
}

/// Build the transport for a distribution configuration.
pub fn transport_for(
    config: &DistributionConfig,
    runner: Arc<dyn CommandRunner>,
) -> Result<Arc<dyn Transport>, DistributionError> {
    match config.method {
        DistributionMethod::Local => Ok(Arc::new(LocalTransport::new())),
        DistributionMethod::Remote => {
            let host = config.host.clone().ok_or_else(|| {
                DistributionError::Transport("remote distribution needs a host".to_string())
            })?;
            Ok(Arc::new(RemoteTransport::new(
                host,
                config.user.clone(),
                runner,
            )))
        }
    }
}
