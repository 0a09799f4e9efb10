//! # ringswitch configuration
//!
//! Hierarchical configuration for a switch engine: engine behaviour, the
//! linked interface, the channel pipeline, leaf filters, telemetry and the
//! in-memory simulator.
//!
//! Sources, later ones overriding earlier ones:
//! 1. Built-in defaults
//! 2. `config/ringswitch.yaml`
//! 3. `config/<RINGSWITCH_ENV>.yaml`
//! 4. `RINGSWITCH_*` environment variables, `__` separating nested keys
//!    (`RINGSWITCH_ENGINE__TX_RETRIES=4`)

#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use ringswitch_core::engine::EngineSettings;

mod engine;
mod error;
mod pipeline;
mod simulator;
mod telemetry;
pub mod validation;

pub use engine::{EngineConfig, LinkConfig};
pub use error::ConfigError;
pub use pipeline::{ChannelConfig, FilterConfig};
pub use simulator::SimulatorConfig;
pub use telemetry::TelemetryConfig;

const BASE_FILE: &str = "config/ringswitch.yaml";
const ENV_PREFIX: &str = "RINGSWITCH_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
#[validate(schema(function = validation::validate_topology))]
pub struct SwitchConfig {
    #[validate(nested)]
    pub engine: EngineConfig,

    #[validate(nested)]
    pub link: LinkConfig,

    /// Channels created in order once the engine is linked.
    #[validate(nested)]
    pub pipeline: Vec<ChannelConfig>,

    /// Filters attached after the pipeline is built.
    #[validate(nested)]
    pub filters: Vec<FilterConfig>,

    #[validate(nested)]
    pub telemetry: TelemetryConfig,

    #[validate(nested)]
    pub simulator: SimulatorConfig,
}

impl SwitchConfig {
    /// Loads defaults, the YAML files under `config/` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(SwitchConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        }

        let env = std::env::var("RINGSWITCH_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{env}.yaml");
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::extract(figment)
    }

    /// Loads defaults, the file at `path` and the environment.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        let figment =
            Figment::from(Serialized::defaults(SwitchConfig::default())).merge(Yaml::file(path));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        self.engine.settings()
    }
}
