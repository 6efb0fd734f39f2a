use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::{SensorError, SensorKind};

static MODIS_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(mod|myd)(09a1|09ga|09gq|09q1|13a1|13a2|13a3|13q1)\.a(\d{4})(\d{3})\.h(\d{2})v(\d{2})\.(005)\.(\d{13})$",
    )
    .expect("modis scene pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModisPlatform {
    Terra,
    Aqua,
}

/// A MODIS tile product for one acquisition date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModisScene {
    pub id: String,
    pub platform: ModisPlatform,
    /// Product code after the platform prefix, e.g. `09ga`.
    pub product: String,
    pub year: u16,
    pub doy: u16,
    pub horizontal: u8,
    pub vertical: u8,
    pub collection: String,
    /// Production timestamp, `YYYYDDDHHMMSS`.
    pub produced: String,
}

impl ModisScene {
    pub(super) fn parse(id: &str) -> Result<Option<Self>, SensorError> {
        let lower = id.to_lowercase();
        let Some(caps) = MODIS_ID.captures(&lower) else {
            return Ok(None);
        };

        let invalid = |field: &'static str| SensorError::InvalidField {
            id: id.to_string(),
            field,
        };

        let platform = if &caps[1] == "mod" {
            ModisPlatform::Terra
        } else {
            ModisPlatform::Aqua
        };
        let year: u16 = caps[3].parse().map_err(|_| invalid("year"))?;
        let doy: u16 = caps[4].parse().map_err(|_| invalid("day of year"))?;
        if doy == 0 || doy > 366 {
            return Err(invalid("day of year"));
        }
        let horizontal: u8 = caps[5].parse().map_err(|_| invalid("horizontal tile"))?;
        let vertical: u8 = caps[6].parse().map_err(|_| invalid("vertical tile"))?;
        if horizontal > 35 || vertical > 17 {
            return Err(invalid("tile"));
        }

        Ok(Some(Self {
            id: id.to_string(),
            platform,
            product: caps[2].to_string(),
            year,
            doy,
            horizontal,
            vertical,
            collection: caps[7].to_string(),
            produced: caps[8].to_string(),
        }))
    }

    pub fn sensor(&self) -> SensorKind {
        match self.platform {
            ModisPlatform::Terra => SensorKind::ModisTerra,
            ModisPlatform::Aqua => SensorKind::ModisAqua,
        }
    }

    /// e.g. `MOD09GA`
    pub fn short_name(&self) -> String {
        let prefix = match self.platform {
            ModisPlatform::Terra => "MOD",
            ModisPlatform::Aqua => "MYD",
        };
        format!("{}{}", prefix, self.product.to_uppercase())
    }

    pub(super) fn product_stem(&self) -> String {
        format!(
            "{}h{:02}v{:02}{:04}{:03}",
            self.short_name(),
            self.horizontal,
            self.vertical,
            self.year,
            self.doy
        )
    }

    pub(super) fn input_relative_path(&self) -> String {
        format!(
            "modis/{}.{}/{:04}/{:03}/{}.hdf",
            self.short_name(),
            self.collection,
            self.year,
            self.doy,
            self.id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields() {
        let scene = ModisScene::parse("MYD09A1.A2010185.h21v09.005.2010194115442")
            .unwrap()
            .unwrap();
        assert_eq!(scene.platform, ModisPlatform::Aqua);
        assert_eq!(scene.product, "09a1");
        assert_eq!(scene.year, 2010);
        assert_eq!(scene.doy, 185);
        assert_eq!(scene.horizontal, 21);
        assert_eq!(scene.vertical, 9);
        assert_eq!(scene.produced, "2010194115442");
        assert_eq!(scene.short_name(), "MYD09A1");
    }

    #[test]
    fn test_unknown_product() {
        assert!(ModisScene::parse("MOD11A1.A2014001.h10v04.005.2014002032553")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_tile_out_of_range() {
        let result = ModisScene::parse("MOD09GA.A2014001.h40v04.005.2014002032553");
        assert!(matches!(result, Err(SensorError::InvalidField { .. })));
    }

    #[test]
    fn test_input_path() {
        let scene = ModisScene::parse("MOD13Q1.A2014001.h10v04.005.2014002032553")
            .unwrap()
            .unwrap();
        assert_eq!(
            scene.input_relative_path(),
            "modis/MOD13Q1.005/2014/001/MOD13Q1.A2014001.h10v04.005.2014002032553.hdf"
        );
    }
}
