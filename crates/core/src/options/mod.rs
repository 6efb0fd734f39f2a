//! Order option sets.
//!
//! Options are a flat map of named booleans and strings shared by every
//! scene of an order. The map keeps a stable key order so a record encodes
//! to the same bytes every time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::sensor::SensorKind;

/// Default browse resolution in meters when browse imagery is requested.
pub const DEFAULT_BROWSE_RESOLUTION: u32 = 50;

/// Products only the Landsat science chain can build.
const LANDSAT_PRODUCTS: &[&str] = &[
    "include_sr",
    "include_sr_toa",
    "include_sr_thermal",
    "include_sr_browse",
    "include_cfmask",
    "include_sr_nbr",
    "include_sr_nbr2",
    "include_sr_ndvi",
    "include_sr_ndmi",
    "include_sr_savi",
    "include_sr_msavi",
    "include_sr_evi",
    "include_dswe",
    "include_dem",
];

/// Products every sensor can build.
const COMMON_PRODUCTS: &[&str] = &["include_source_data", "include_customized_source_data"];

/// Flags that add to a product but do not request one on their own.
const MODIFIER_FLAGS: &[&str] = &["include_source_metadata"];

/// Spectral index flags mapped to their `do_spectral_indices.py` switches.
pub const SPECTRAL_INDICES: &[(&str, &str)] = &[
    ("include_sr_nbr", "--nbr"),
    ("include_sr_nbr2", "--nbr2"),
    ("include_sr_ndvi", "--ndvi"),
    ("include_sr_ndmi", "--ndmi"),
    ("include_sr_savi", "--savi"),
    ("include_sr_msavi", "--msavi"),
    ("include_sr_evi", "--evi"),
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Option {option} is not available for {sensor} scenes")]
    NotSupported { option: String, sensor: SensorKind },

    #[error("Invalid value for {option}: {reason}")]
    InvalidValue { option: String, reason: String },

    #[error("No products requested")]
    NothingRequested,
}

/// A single option value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Integer(i64),
    Text(String),
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Integer(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Text(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Text(v)
    }
}

/// Output raster format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Envi,
    Gtiff,
    HdfEos2,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "envi" => Some(OutputFormat::Envi),
            "gtiff" => Some(OutputFormat::Gtiff),
            "hdf-eos2" => Some(OutputFormat::HdfEos2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Envi => "envi",
            OutputFormat::Gtiff => "gtiff",
            OutputFormat::HdfEos2 => "hdf-eos2",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options requested for every scene of an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductOptions(BTreeMap<String, OptionValue>);

impl ProductOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True only for an explicit boolean `true`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(OptionValue::Bool(true)))
    }

    pub fn any_flag(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.flag(k))
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(OptionValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Requested output format, `envi` when unset or unrecognized.
    pub fn output_format(&self) -> OutputFormat {
        self.text("output_format")
            .and_then(OutputFormat::parse)
            .unwrap_or_default()
    }

    pub fn browse_resolution(&self) -> u32 {
        match self.0.get("browse_resolution") {
            Some(OptionValue::Integer(v)) if *v > 0 => *v as u32,
            Some(OptionValue::Text(s)) => s.parse().unwrap_or(DEFAULT_BROWSE_RESOLUTION),
            _ => DEFAULT_BROWSE_RESOLUTION,
        }
    }

    /// Check the option set against what `sensor` can produce.
    pub fn validate_for(&self, sensor: SensorKind) -> Result<(), OptionsError> {
        for (key, value) in &self.0 {
            match key.as_str() {
                "output_format" => {
                    let valid = matches!(value, OptionValue::Text(s) if OutputFormat::parse(s).is_some());
                    if !valid {
                        return Err(OptionsError::InvalidValue {
                            option: key.clone(),
                            reason: "expected one of envi, gtiff, hdf-eos2".to_string(),
                        });
                    }
                }
                "browse_resolution" => {
                    let resolution = match value {
                        OptionValue::Integer(v) => *v,
                        OptionValue::Text(s) => s.parse().unwrap_or(0),
                        OptionValue::Bool(_) => 0,
                    };
                    if resolution <= 0 {
                        return Err(OptionsError::InvalidValue {
                            option: key.clone(),
                            reason: "expected a positive number of meters".to_string(),
                        });
                    }
                }
                k if LANDSAT_PRODUCTS.contains(&k)
                    || COMMON_PRODUCTS.contains(&k)
                    || MODIFIER_FLAGS.contains(&k) =>
                {
                    if !matches!(value, OptionValue::Bool(_)) {
                        return Err(OptionsError::InvalidValue {
                            option: key.clone(),
                            reason: "expected a boolean".to_string(),
                        });
                    }
                    if sensor.is_modis() && LANDSAT_PRODUCTS.contains(&k) && self.flag(k) {
                        return Err(OptionsError::NotSupported {
                            option: key.clone(),
                            sensor,
                        });
                    }
                }
                _ => return Err(OptionsError::UnknownOption(key.clone())),
            }
        }

        let requested = self.any_flag(COMMON_PRODUCTS)
            || (sensor.is_landsat() && self.any_flag(LANDSAT_PRODUCTS));
        if !requested {
            return Err(OptionsError::NothingRequested);
        }

        Ok(())
    }
}

impl FromIterator<(String, OptionValue)> for ProductOptions {
    fn from_iter<T: IntoIterator<Item = (String, OptionValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
