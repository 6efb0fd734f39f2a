use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration.
///
/// Sections that only some processes need are optional here; each binary
/// checks its own requirements through [`super::validate_for`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub record: RecordConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Flat key/value table served by `get_configuration`.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    #[serde(default)]
    pub status: Option<StatusClientConfig>,
    #[serde(default)]
    pub cluster: Option<ClusterConfig>,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub worker: Option<WorkerConfig>,
    #[serde(default)]
    pub distribution: Option<DistributionConfig>,
    #[serde(default)]
    pub finalizer: FinalizerConfig,
}

/// Status service listen address.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("reprocess.db")
}

/// Work record layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordConfig {
    /// Total length of one padded record line, separator included.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
        }
    }
}

fn default_block_size() -> usize {
    1024
}

/// Retention and reconciliation windows applied by the status service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Completed scenes older than this are eligible for purge.
    #[serde(default = "default_retention_days")]
    pub days: u32,
    /// Scenes left in `processing` longer than this are moved to `error`.
    #[serde(default = "default_stale_processing_hours")]
    pub stale_processing_hours: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
            stale_processing_hours: default_stale_processing_hours(),
        }
    }
}

fn default_retention_days() -> u32 {
    14
}

fn default_stale_processing_hours() -> u32 {
    72
}

/// How clients reach the status service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusClientConfig {
    /// Base URL including the API prefix, e.g. `http://status:8080/api/v1`.
    pub url: String,
    #[serde(default = "default_status_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_status_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_status_retry_sleep")]
    pub retry_sleep_secs: u64,
}

fn default_status_timeout() -> u64 {
    30
}

fn default_status_retry_attempts() -> u32 {
    5
}

fn default_status_retry_sleep() -> u64 {
    5
}

/// Which batch execution substrate the dispatcher submits to.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubstrateKind {
    Hadoop,
    Local,
}

/// Compute cluster endpoint and job settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    #[serde(default = "default_substrate")]
    pub substrate: SubstrateKind,
    #[serde(default = "default_hadoop_path")]
    pub hadoop_path: PathBuf,
    /// Hadoop streaming jar, required for the hadoop substrate.
    #[serde(default)]
    pub streaming_jar: Option<PathBuf>,
    /// Worker executable run once per record.
    #[serde(default = "default_mapper")]
    pub mapper: PathBuf,
    #[serde(default = "default_queue")]
    pub queue: String,
    #[serde(default)]
    pub name_node: Option<String>,
    #[serde(default)]
    pub job_tracker: Option<String>,
    /// Submitting user, passed as `HADOOP_USER_NAME`.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
    /// Substrate-side directory for job input and output.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
    /// Concurrent workers for the local substrate.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            substrate: default_substrate(),
            hadoop_path: default_hadoop_path(),
            streaming_jar: None,
            mapper: default_mapper(),
            queue: default_queue(),
            name_node: None,
            job_tracker: None,
            user: None,
            task_timeout_ms: default_task_timeout_ms(),
            staging_dir: default_staging_dir(),
            max_parallel: default_max_parallel(),
        }
    }
}

fn default_substrate() -> SubstrateKind {
    SubstrateKind::Hadoop
}

fn default_hadoop_path() -> PathBuf {
    PathBuf::from("hadoop")
}

fn default_mapper() -> PathBuf {
    PathBuf::from("reprocess-worker")
}

fn default_queue() -> String {
    "ondemand".to_string()
}

fn default_task_timeout_ms() -> u64 {
    // two days
    172_800_000
}

fn default_staging_dir() -> String {
    "reprocess-jobs".to_string()
}

fn default_max_parallel() -> usize {
    4
}

/// Dispatcher cycle settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_batch_dir")]
    pub batch_dir: PathBuf,
    #[serde(default = "default_scene_limit")]
    pub scene_limit: usize,
    #[serde(default = "default_dispatch_interval")]
    pub poll_interval_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_dir: default_batch_dir(),
            scene_limit: default_scene_limit(),
            poll_interval_secs: default_dispatch_interval(),
        }
    }
}

fn default_batch_dir() -> PathBuf {
    std::env::temp_dir().join("reprocess-batches")
}

fn default_scene_limit() -> usize {
    500
}

fn default_dispatch_interval() -> u64 {
    300
}

/// Worker node settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Base working directory; per-scene directories live below it.
    pub work_dir: PathBuf,
    /// Ancillary data handed to the science tools.
    pub ancillary_path: PathBuf,
    /// Local input cache the worker stages scenes from.
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    #[serde(default)]
    pub keep_work_dir: bool,
    /// Per-command timeout. Generous because science chains run for hours.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("/data/input")
}

fn default_command_timeout() -> u64 {
    // one day
    86_400
}

/// Where packaged products are delivered.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMethod {
    Local,
    Remote,
}

/// Checksum algorithm written next to each product.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumKind {
    #[default]
    Md5,
    Sha256,
}

impl ChecksumKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ChecksumKind::Md5 => "md5",
            ChecksumKind::Sha256 => "sha256",
        }
    }

    /// Remote tool producing the same digest.
    pub fn remote_tool(&self) -> &'static str {
        match self {
            ChecksumKind::Md5 => "md5sum",
            ChecksumKind::Sha256 => "sha256sum",
        }
    }
}

/// Retry ceiling and sleep for one distribution phase.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PhaseRetryConfig {
    pub max_attempts: u32,
    pub sleep_secs: f64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

impl PhaseRetryConfig {
    pub fn new(max_attempts: u32, sleep_secs: f64) -> Self {
        Self {
            max_attempts,
            sleep_secs,
            backoff_multiplier: 1.0,
        }
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }
}

/// Product distribution settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DistributionConfig {
    #[serde(default = "default_method")]
    pub method: DistributionMethod,
    /// Root of the distribution cache; products land in `<cache_dir>/orders/<order_id>`.
    pub cache_dir: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    /// Public URL of `cache_dir`. When set, completed scenes record download URLs.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub checksum: ChecksumKind,
    #[serde(default = "default_packaging_retry")]
    pub packaging: PhaseRetryConfig,
    #[serde(default = "default_delivery_retry")]
    pub delivery: PhaseRetryConfig,
    #[serde(default = "default_distribution_retry")]
    pub distribution: PhaseRetryConfig,
}

impl DistributionConfig {
    /// Local distribution into `cache_dir` with default retries.
    pub fn local(cache_dir: impl Into<String>) -> Self {
        Self {
            method: DistributionMethod::Local,
            cache_dir: cache_dir.into(),
            host: None,
            user: None,
            base_url: None,
            checksum: ChecksumKind::default(),
            packaging: default_packaging_retry(),
            delivery: default_delivery_retry(),
            distribution: default_distribution_retry(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_retries(
        mut self,
        packaging: PhaseRetryConfig,
        delivery: PhaseRetryConfig,
        distribution: PhaseRetryConfig,
    ) -> Self {
        self.packaging = packaging;
        self.delivery = delivery;
        self.distribution = distribution;
        self
    }
}

fn default_method() -> DistributionMethod {
    DistributionMethod::Local
}

fn default_packaging_retry() -> PhaseRetryConfig {
    PhaseRetryConfig::new(3, 2.0)
}

fn default_delivery_retry() -> PhaseRetryConfig {
    PhaseRetryConfig::new(3, 2.0)
}

fn default_distribution_retry() -> PhaseRetryConfig {
    PhaseRetryConfig::new(5, 2.0).with_backoff_multiplier(1.5)
}

/// Finalizer settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FinalizerConfig {
    #[serde(default = "default_finalize_interval")]
    pub poll_interval_secs: u64,
    /// Webhook receiving order completion notifications.
    #[serde(default)]
    pub notify_url: Option<String>,
    /// Input cache checked during intake; the same tree workers stage from.
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
}

impl Default for FinalizerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_finalize_interval(),
            notify_url: None,
            input_dir: default_input_dir(),
        }
    }
}

fn default_finalize_interval() -> u64 {
    600
}

/// Sanitized config for API responses (credentials and user names hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub record: RecordConfig,
    pub retention: RetentionConfig,
    pub settings_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<SanitizedClusterConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<SanitizedDistributionConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedClusterConfig {
    pub substrate: SubstrateKind,
    pub queue: String,
    pub task_timeout_ms: u64,
    pub user_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedDistributionConfig {
    pub method: DistributionMethod,
    pub cache_dir: String,
    pub host: Option<String>,
    pub user_configured: bool,
    pub base_url: Option<String>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            record: config.record.clone(),
            retention: config.retention.clone(),
            settings_keys: config.settings.keys().cloned().collect(),
            cluster: config.cluster.as_ref().map(|c| SanitizedClusterConfig {
                substrate: c.substrate,
                queue: c.queue.clone(),
                task_timeout_ms: c.task_timeout_ms,
                user_configured: c.user.is_some(),
            }),
            distribution: config
                .distribution
                .as_ref()
                .map(|d| SanitizedDistributionConfig {
                    method: d.method,
                    cache_dir: d.cache_dir.clone(),
                    host: d.host.clone(),
                    user_configured: d.user.is_some(),
                    base_url: d.base_url.clone(),
                }),
        }
    }
}
