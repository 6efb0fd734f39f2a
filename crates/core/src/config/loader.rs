use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix for environment overrides, e.g. `REPROCESS_WORKER__WORK_DIR`.
pub const ENV_PREFIX: &str = "REPROCESS_";

/// Load configuration from file with environment variable overrides.
///
/// Nested keys are separated by a double underscore so that key names
/// containing underscores survive the split.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DistributionMethod, SubstrateKind};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_full() {
        let toml = r#"
[server]
port = 9000

[record]
block_size = 2048

[settings]
"distribution.cache.home.url" = "http://cache.example.org"

[status]
url = "http://status:9000/api/v1"

[cluster]
substrate = "hadoop"
streaming_jar = "/opt/hadoop/contrib/streaming/hadoop-streaming.jar"
queue = "ondemand-low"

[worker]
work_dir = "/scratch/work"
ancillary_path = "/usr/local/ancillary"

[distribution]
method = "remote"
cache_dir = "/data/cache"
host = "cache.example.org"

[distribution.delivery]
max_attempts = 7
sleep_secs = 0.5
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.record.block_size, 2048);
        assert_eq!(
            config.settings.get("distribution.cache.home.url").unwrap(),
            "http://cache.example.org"
        );

        let cluster = config.cluster.unwrap();
        assert_eq!(cluster.substrate, SubstrateKind::Hadoop);
        assert_eq!(cluster.queue, "ondemand-low");

        let dist = config.distribution.unwrap();
        assert_eq!(dist.method, DistributionMethod::Remote);
        assert_eq!(dist.delivery.max_attempts, 7);
        assert_eq!(dist.packaging.max_attempts, 3);
    }

    #[test]
    fn test_load_config_from_str_worker_missing_work_dir() {
        let toml = r#"
[worker]
ancillary_path = "/anc"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[server]
host = "127.0.0.1"
port = 3000

[retention]
days = 30
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.retention.days, 30);
        assert_eq!(config.retention.stale_processing_hours, 72);
    }
}
