//! Worker entry point: processes one work record per scene.
//!
//! A worker decodes its record, reports `processing`, stages input, runs the
//! science tools, distributes the product and reports the outcome. The
//! per-scene directory is torn down on every exit path, and a panic inside
//! the pipeline is still reported as a scene error.

mod error;
mod result;
mod runner;
mod science;
mod staging;
mod workdir;

pub use error::WorkerError;
pub use result::{parse_result_line, WorkerResult, RESULT_PREFIX};
pub use runner::{Worker, WorkerOutcome, WorkerSummary};
pub use science::{collect_output, plan, run_plan, ScienceContext, ScienceStep, ANCILLARY_ENV};
pub use staging::{stage_input, StagedInput};
pub use workdir::WorkDir;
