use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::{SensorError, SensorKind};

static LANDSAT_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(lt4|lt5|le7)(\d{3})(\d{3})(\d{4})(\d{3})([a-z0-9]{3})([a-z0-9]{2})$")
        .expect("landsat scene pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandsatPlatform {
    Landsat4,
    Landsat5,
    Landsat7,
}

/// A Landsat scene: platform, WRS path/row and acquisition date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandsatScene {
    pub id: String,
    pub platform: LandsatPlatform,
    pub path: u16,
    pub row: u16,
    pub year: u16,
    pub doy: u16,
    pub station: String,
    pub version: String,
}

impl LandsatScene {
    /// Returns `Ok(None)` when `id` is not a Landsat id at all.
    pub(super) fn parse(id: &str) -> Result<Option<Self>, SensorError> {
        let lower = id.to_lowercase();
        let Some(caps) = LANDSAT_ID.captures(&lower) else {
            return Ok(None);
        };

        let platform = match &caps[1] {
            "lt4" => LandsatPlatform::Landsat4,
            "lt5" => LandsatPlatform::Landsat5,
            _ => LandsatPlatform::Landsat7,
        };
        let number = |idx: usize, field: &'static str| -> Result<u16, SensorError> {
            caps[idx].parse().map_err(|_| SensorError::InvalidField {
                id: id.to_string(),
                field,
            })
        };

        let doy = number(5, "day of year")?;
        if doy == 0 || doy > 366 {
            return Err(SensorError::InvalidField {
                id: id.to_string(),
                field: "day of year",
            });
        }

        Ok(Some(Self {
            id: id.to_string(),
            platform,
            path: number(2, "path")?,
            row: number(3, "row")?,
            year: number(4, "year")?,
            doy,
            station: caps[6].to_string(),
            version: caps[7].to_string(),
        }))
    }

    pub fn sensor(&self) -> SensorKind {
        match self.platform {
            LandsatPlatform::Landsat4 | LandsatPlatform::Landsat5 => SensorKind::LandsatTm,
            LandsatPlatform::Landsat7 => SensorKind::LandsatEtm,
        }
    }

    pub fn sensor_code(&self) -> String {
        match self.platform {
            LandsatPlatform::Landsat4 => "LT4",
            LandsatPlatform::Landsat5 => "LT5",
            LandsatPlatform::Landsat7 => "LE7",
        }
        .to_string()
    }

    pub(super) fn product_stem(&self) -> String {
        format!(
            "{}{:03}{:03}{:04}{:03}",
            self.sensor_code(),
            self.path,
            self.row,
            self.year,
            self.doy
        )
    }

    pub(super) fn input_relative_path(&self) -> String {
        format!(
            "{}/{:03}/{:03}/{:04}/{}.tar.gz",
            self.sensor(),
            self.path,
            self.row,
            self.year,
            self.id.to_lowercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields() {
        let scene = LandsatScene::parse("LT40440341989123PAC02")
            .unwrap()
            .unwrap();
        assert_eq!(scene.platform, LandsatPlatform::Landsat4);
        assert_eq!(scene.path, 44);
        assert_eq!(scene.row, 34);
        assert_eq!(scene.year, 1989);
        assert_eq!(scene.doy, 123);
        assert_eq!(scene.station, "pac");
        assert_eq!(scene.version, "02");
    }

    #[test]
    fn test_not_landsat() {
        assert!(LandsatScene::parse("MOD09GA.A2014001.h10v04.005.2014002032553")
            .unwrap()
            .is_none());
        assert!(LandsatScene::parse("LT50440341996220XXX0").unwrap().is_none());
    }

    #[test]
    fn test_day_of_year_out_of_range() {
        let result = LandsatScene::parse("LT50440341996400XXX01");
        assert!(matches!(result, Err(SensorError::InvalidField { .. })));
    }

    #[test]
    fn test_input_path() {
        let scene = LandsatScene::parse("LE70290302003123EDC00").unwrap().unwrap();
        assert_eq!(
            scene.input_relative_path(),
            "etm/029/030/2003/le70290302003123edc00.tar.gz"
        );
    }
}
