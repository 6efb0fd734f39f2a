pub mod config;
pub mod dispatcher;
pub mod distribution;
pub mod finalizer;
pub mod options;
pub mod process;
pub mod record;
pub mod sensor;
pub mod service;
pub mod status;
pub mod testing;
pub mod worker;

pub use config::{
    load_config, load_config_from_str, validate_config, validate_for, Component, Config,
    ConfigError, SanitizedConfig,
};
pub use record::{RecordCodec, RecordError, WorkRecord};
pub use sensor::{SceneId, SensorKind};
pub use service::{ServiceError, StatusService};
pub use status::{SceneRef, SceneStatus};
