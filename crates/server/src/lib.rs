//! Status service HTTP server and the process entry points built on
//! `reprocess-core`.

pub mod api;
pub mod bootstrap;
pub mod metrics;
pub mod state;
