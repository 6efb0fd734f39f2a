//! Scene identifier grammar and sensor classification.
//!
//! Every scene id belongs to exactly one [`SensorKind`]. Parsing is a closed
//! match over the supported families; each family carries its own fields
//! and knows how to name its products and where its input lives.

mod landsat;
mod modis;

pub use landsat::{LandsatPlatform, LandsatScene};
pub use modis::{ModisPlatform, ModisScene};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from scene id parsing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SensorError {
    #[error("Scene id is empty")]
    Empty,

    #[error("Scene id '{0}' does not match any supported sensor")]
    Unrecognized(String),

    #[error("Scene id '{id}' has an invalid {field}")]
    InvalidField { id: String, field: &'static str },
}

/// Supported sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Landsat 4/5 Thematic Mapper.
    LandsatTm,
    /// Landsat 7 Enhanced Thematic Mapper Plus.
    LandsatEtm,
    ModisTerra,
    ModisAqua,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::LandsatTm => "tm",
            SensorKind::LandsatEtm => "etm",
            SensorKind::ModisTerra => "terra",
            SensorKind::ModisAqua => "aqua",
        }
    }

    pub fn is_landsat(&self) -> bool {
        matches!(self, SensorKind::LandsatTm | SensorKind::LandsatEtm)
    }

    pub fn is_modis(&self) -> bool {
        !self.is_landsat()
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed scene identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneId {
    Landsat(LandsatScene),
    Modis(ModisScene),
}

impl SceneId {
    /// Parse a scene id, trying each sensor family in turn.
    pub fn parse(id: &str) -> Result<Self, SensorError> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(SensorError::Empty);
        }

        if let Some(scene) = LandsatScene::parse(trimmed)? {
            return Ok(SceneId::Landsat(scene));
        }
        if let Some(scene) = ModisScene::parse(trimmed)? {
            return Ok(SceneId::Modis(scene));
        }

        Err(SensorError::Unrecognized(trimmed.to_string()))
    }

    /// Whether `id` matches a supported sensor grammar.
    pub fn is_valid(id: &str) -> bool {
        Self::parse(id).is_ok()
    }

    /// The id as it was supplied.
    pub fn as_str(&self) -> &str {
        match self {
            SceneId::Landsat(s) => &s.id,
            SceneId::Modis(s) => &s.id,
        }
    }

    pub fn sensor(&self) -> SensorKind {
        match self {
            SceneId::Landsat(s) => s.sensor(),
            SceneId::Modis(s) => s.sensor(),
        }
    }

    /// Short uppercase code used in product names (`LT5`, `MOD09GA`).
    pub fn sensor_code(&self) -> String {
        match self {
            SceneId::Landsat(s) => s.sensor_code(),
            SceneId::Modis(s) => s.short_name(),
        }
    }

    pub fn year(&self) -> u16 {
        match self {
            SceneId::Landsat(s) => s.year,
            SceneId::Modis(s) => s.year,
        }
    }

    pub fn day_of_year(&self) -> u16 {
        match self {
            SceneId::Landsat(s) => s.doy,
            SceneId::Modis(s) => s.doy,
        }
    }

    /// Product name stem without the processing timestamp.
    pub fn product_stem(&self) -> String {
        match self {
            SceneId::Landsat(s) => s.product_stem(),
            SceneId::Modis(s) => s.product_stem(),
        }
    }

    /// Product name for a run started at `at`, e.g. `LT50440341996220-SC20141023145012`.
    pub fn product_name(&self, at: DateTime<Utc>) -> String {
        format!("{}-SC{}", self.product_stem(), at.format("%Y%m%d%H%M%S"))
    }

    /// Location of the scene's input below the input cache root.
    pub fn input_relative_path(&self) -> String {
        match self {
            SceneId::Landsat(s) => s.input_relative_path(),
            SceneId::Modis(s) => s.input_relative_path(),
        }
    }

    /// Whether missing input can still be ordered from the upstream archive.
    pub fn input_orderable(&self) -> bool {
        matches!(self, SceneId::Landsat(_))
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SceneId {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SceneId::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_landsat_tm() {
        let scene = SceneId::parse("LT50440341996220XXX01").unwrap();
        assert_eq!(scene.sensor(), SensorKind::LandsatTm);
        assert_eq!(scene.sensor_code(), "LT5");
        assert_eq!(scene.year(), 1996);
        assert_eq!(scene.day_of_year(), 220);
        assert_eq!(scene.as_str(), "LT50440341996220XXX01");
    }

    #[test]
    fn test_parse_landsat_etm() {
        let scene = SceneId::parse("le70290302003123EDC00").unwrap();
        assert_eq!(scene.sensor(), SensorKind::LandsatEtm);
        assert!(scene.input_orderable());
    }

    #[test]
    fn test_parse_modis() {
        let scene = SceneId::parse("MOD09GA.A2014001.h10v04.005.2014002032553").unwrap();
        assert_eq!(scene.sensor(), SensorKind::ModisTerra);
        assert_eq!(scene.sensor_code(), "MOD09GA");
        assert!(!scene.input_orderable());

        let aqua = SceneId::parse("MYD13Q1.A2013353.h08v05.005.2014006081234").unwrap();
        assert_eq!(aqua.sensor(), SensorKind::ModisAqua);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(SceneId::parse(""), Err(SensorError::Empty));
        assert!(matches!(
            SceneId::parse("not-a-scene"),
            Err(SensorError::Unrecognized(_))
        ));
        // Landsat 8 is not a supported sensor
        assert!(SceneId::parse("LC80440342013220LGN00").is_err());
        assert!(!SceneId::is_valid("LT5044034"));
    }

    #[test]
    fn test_product_name() {
        let scene = SceneId::parse("LT50440341996220XXX01").unwrap();
        let at = Utc.with_ymd_and_hms(2014, 10, 23, 14, 50, 12).unwrap();
        assert_eq!(scene.product_name(at), "LT50440341996220-SC20141023145012");

        let modis = SceneId::parse("MOD09GA.A2014001.h10v04.005.2014002032553").unwrap();
        assert_eq!(modis.product_name(at), "MOD09GAh10v042014001-SC20141023145012");
    }

    #[test]
    fn test_sensor_kind_display() {
        assert_eq!(SensorKind::LandsatTm.to_string(), "tm");
        assert!(SensorKind::ModisAqua.is_modis());
        assert!(SensorKind::LandsatEtm.is_landsat());
    }
}
