//! Packaging and delivery of finished products.
//!
//! Each stage retries transient failures under its own [`RetryPolicy`], and
//! the whole package-then-deliver sequence is wrapped in a third policy.

mod checksum;
mod distributor;
mod error;
mod packager;
mod remote;
mod retry;
mod transport;

pub use checksum::{checksum_line, file_digest, parse_digest};
pub use distributor::{transport_for, Delivered, Distributor};
pub use error::{DistributionError, Phase};
pub use packager::{Package, Packager};
pub use remote::RemoteTransport;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use transport::{LocalTransport, Transport};
