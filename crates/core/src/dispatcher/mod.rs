//! Dispatcher: turns eligible scenes into batch jobs on a substrate.
//!
//! A cycle polls the Status Service, writes a padded batch file, submits
//! it, and only then marks the dispatched scenes `queued`. If submission
//! fails nothing is marked, so dispatch is at-least-once.

mod batch;
mod error;
mod hadoop;
mod local_substrate;
mod runner;
mod substrate;

use std::sync::Arc;

pub use batch::{job_name, write_batch, Batch};
pub use error::{DispatchError, SubstrateError};
pub use hadoop::HadoopStreaming;
pub use local_substrate::LocalSubstrate;
pub use runner::{DispatchMode, DispatchPhase, DispatchReport, Dispatcher};
pub use substrate::{BatchJob, BatchSubstrate, JobOutcome, SubmittedJob};

use crate::config::{ClusterConfig, SubstrateKind};
use crate::process::CommandRunner;

/// Build the substrate named by the cluster configuration.
pub fn substrate_for(
    config: &ClusterConfig,
    runner: Arc<dyn CommandRunner>,
) -> Result<Arc<dyn BatchSubstrate>, SubstrateError> {
    match config.substrate {
        SubstrateKind::Hadoop => Ok(Arc::new(HadoopStreaming::new(config.clone(), runner)?)),
        SubstrateKind::Local => Ok(Arc::new(LocalSubstrate::new(config.clone(), runner))),
    }
}
