//! Work record codec.
//!
//! A work record is one line of a batch file: a compact JSON object followed
//! by `#` filler and a newline, padded so every line is exactly
//! `block_size` bytes. Fixed-size lines let the batch substrate split the
//! input into even map tasks.

mod codec;

pub use codec::{decode, RecordCodec, FILLER};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::options::ProductOptions;
use crate::sensor::SensorError;

/// Errors from encoding or decoding work records.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Block size {0} is too small to hold a record")]
    InvalidBlockSize(usize),

    #[error("Encoded record is {length} bytes but the block only holds {capacity}")]
    TooLong { length: usize, capacity: usize },

    #[error("Failed to serialize record: {0}")]
    Serialize(String),

    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("Unexpected data after record: {0:?}")]
    TrailingData(String),

    #[error("Record has an empty {0}")]
    EmptyField(&'static str),

    #[error("Record scene is invalid: {0}")]
    InvalidScene(#[from] SensorError),
}

impl RecordError {
    /// Block size problems are configuration mistakes, not bad input.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::InvalidBlockSize(_) | Self::TooLong { .. })
    }
}

/// One unit of work: a single scene of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRecord {
    #[serde(rename = "orderid")]
    pub order_id: String,
    pub scene: String,
    pub options: ProductOptions,
    /// Status service endpoint the worker reports back to.
    pub callback_address: String,
}

impl WorkRecord {
    pub fn new(
        order_id: impl Into<String>,
        scene: impl Into<String>,
        options: ProductOptions,
        callback_address: impl Into<String>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            scene: scene.into(),
            options,
            callback_address: callback_address.into(),
        }
    }
}
