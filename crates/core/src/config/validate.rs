use std::fmt;

use super::{
    types::{
        ClusterConfig, Config, DistributionConfig, DistributionMethod, PhaseRetryConfig,
        StatusClientConfig, SubstrateKind, WorkerConfig,
    },
    ConfigError,
};

/// Smallest block size that fits a realistic work record.
const MIN_BLOCK_SIZE: usize = 256;

/// The process a configuration is loaded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    StatusService,
    Dispatcher,
    Worker,
    Finalizer,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::StatusService => "status service",
            Component::Dispatcher => "dispatcher",
            Component::Worker => "worker",
            Component::Finalizer => "finalizer",
        };
        f.write_str(name)
    }
}

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Record block size leaves room for a record
/// - Every retry phase allows at least one attempt
/// - Remote distribution names a host
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.record.block_size < MIN_BLOCK_SIZE {
        return Err(ConfigError::ValidationError(format!(
            "record.block_size must be at least {}",
            MIN_BLOCK_SIZE
        )));
    }

    if config.retention.days == 0 {
        return Err(ConfigError::ValidationError(
            "retention.days cannot be 0".to_string(),
        ));
    }

    if let Some(status) = &config.status {
        if status.retry_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "status.retry_attempts must be at least 1".to_string(),
            ));
        }
    }

    if let Some(dist) = &config.distribution {
        check_phase("distribution.packaging", &dist.packaging)?;
        check_phase("distribution.delivery", &dist.delivery)?;
        check_phase("distribution.distribution", &dist.distribution)?;

        if dist.method == DistributionMethod::Remote && dist.host.is_none() {
            return Err(ConfigError::ValidationError(
                "distribution.host is required for remote distribution".to_string(),
            ));
        }
    }

    if let Some(cluster) = &config.cluster {
        if cluster.max_parallel == 0 {
            return Err(ConfigError::ValidationError(
                "cluster.max_parallel must be at least 1".to_string(),
            ));
        }
    }

    Ok(())
}

fn check_phase(name: &str, phase: &PhaseRetryConfig) -> Result<(), ConfigError> {
    if phase.max_attempts == 0 {
        return Err(ConfigError::ValidationError(format!(
            "{}.max_attempts must be at least 1",
            name
        )));
    }
    if phase.sleep_secs < 0.0 || phase.backoff_multiplier < 1.0 {
        return Err(ConfigError::ValidationError(format!(
            "{} needs a non-negative sleep and a backoff multiplier of at least 1",
            name
        )));
    }
    Ok(())
}

/// Validate the general constraints plus everything `component` requires.
pub fn validate_for(config: &Config, component: Component) -> Result<(), ConfigError> {
    validate_config(config)?;

    match component {
        Component::StatusService => {}
        Component::Dispatcher => {
            config.require_status()?;
            let cluster = config.require_cluster()?;
            if cluster.substrate == SubstrateKind::Hadoop && cluster.streaming_jar.is_none() {
                return Err(missing(component, "cluster.streaming_jar"));
            }
        }
        Component::Worker => {
            config.require_worker()?;
            config.require_distribution()?;
        }
        Component::Finalizer => {
            config.require_status()?;
            config.require_distribution()?;
        }
    }

    Ok(())
}

fn missing(component: Component, key: &str) -> ConfigError {
    ConfigError::ValidationError(format!("{} requires {}", component, key))
}

fn missing_section(section: &str) -> ConfigError {
    ConfigError::ValidationError(format!("missing required section [{}]", section))
}

impl Config {
    pub fn require_status(&self) -> Result<&StatusClientConfig, ConfigError> {
        let status = self.status.as_ref().ok_or_else(|| missing_section("status"))?;
        if status.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "status.url cannot be empty".to_string(),
            ));
        }
        Ok(status)
    }

    pub fn require_cluster(&self) -> Result<&ClusterConfig, ConfigError> {
        self.cluster.as_ref().ok_or_else(|| missing_section("cluster"))
    }

    pub fn require_worker(&self) -> Result<&WorkerConfig, ConfigError> {
        self.worker.as_ref().ok_or_else(|| missing_section("worker"))
    }

    pub fn require_distribution(&self) -> Result<&DistributionConfig, ConfigError> {
        let dist = self
            .distribution
            .as_ref()
            .ok_or_else(|| missing_section("distribution"))?;
        if dist.cache_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "distribution.cache_dir cannot be empty".to_string(),
            ));
        }
        Ok(dist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config_from_str, StatusClientConfig};
    use std::path::PathBuf;

    fn status() -> StatusClientConfig {
        StatusClientConfig {
            url: "http://localhost:8080/api/v1".to_string(),
            timeout_secs: 30,
            retry_attempts: 3,
            retry_sleep_secs: 1,
        }
    }

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_tiny_block_size_fails() {
        let mut config = Config::default();
        config.record.block_size = 64;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_attempts_fails() {
        let mut config = Config::default();
        let mut dist = DistributionConfig::local("/cache");
        dist.delivery.max_attempts = 0;
        config.distribution = Some(dist);

        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("distribution.delivery"));
    }

    #[test]
    fn test_validate_remote_without_host_fails() {
        let mut config = Config::default();
        let mut dist = DistributionConfig::local("/cache");
        dist.method = DistributionMethod::Remote;
        config.distribution = Some(dist);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_worker_requires_sections() {
        let mut config = Config::default();
        let err = validate_for(&config, Component::Worker).unwrap_err();
        assert!(err.to_string().contains("[worker]"));

        config.worker = Some(WorkerConfig {
            work_dir: PathBuf::from("/work"),
            ancillary_path: PathBuf::from("/anc"),
            input_dir: PathBuf::from("/input"),
            keep_work_dir: false,
            command_timeout_secs: 60,
        });
        let err = validate_for(&config, Component::Worker).unwrap_err();
        assert!(err.to_string().contains("[distribution]"));

        config.distribution = Some(DistributionConfig::local("/cache"));
        assert!(validate_for(&config, Component::Worker).is_ok());
    }

    #[test]
    fn test_dispatcher_requires_streaming_jar_for_hadoop() {
        let mut config = Config::default();
        config.status = Some(status());
        config.cluster = Some(ClusterConfig::default());

        let err = validate_for(&config, Component::Dispatcher).unwrap_err();
        assert!(err.to_string().contains("cluster.streaming_jar"));

        config.cluster = Some(ClusterConfig {
            substrate: SubstrateKind::Local,
            ..Default::default()
        });
        assert!(validate_for(&config, Component::Dispatcher).is_ok());
    }

    #[test]
    fn test_finalizer_rejects_empty_status_url() {
        let config = load_config_from_str(
            r#"
[status]
url = "  "

[distribution]
cache_dir = "/cache"
"#,
        )
        .unwrap();
        let err = validate_for(&config, Component::Finalizer).unwrap_err();
        assert!(err.to_string().contains("status.url"));
    }

    #[test]
    fn test_status_service_needs_nothing_extra() {
        assert!(validate_for(&Config::default(), Component::StatusService).is_ok());
    }
}
