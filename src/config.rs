//! Configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Regions queried when neither flags nor configuration name any.
pub const DEFAULT_REGIONS: [&str; 4] = [
    "eu-west-1",
    "us-east-1",
    "ap-southeast-1",
    "ap-northeast-1",
];

/// Fleet-wide defaults merged from configuration files and environment
/// variables (prefix `NIMBUS`). AWS credentials themselves are resolved by
/// the provider's standard chain; only the profile selection lives here.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "NIMBUS")]
pub struct FleetConfig {
    /// Named profile in `~/.aws/config` to authenticate with. When absent
    /// the `AWS_*` environment variables apply.
    pub profile: Option<String>,
    /// Regions to hold handles for. Defaults to [`DEFAULT_REGIONS`].
    pub regions: Option<Vec<String>>,
    /// Flavor used by `scale` when none is given on the command line.
    #[ortho_config(default = "m1.large".to_owned())]
    pub default_flavor: String,
}

impl FleetConfig {
    /// Loads configuration without parsing CLI arguments; values merge
    /// defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("nimbus")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the configured regions, falling back to [`DEFAULT_REGIONS`].
    #[must_use]
    pub fn regions(&self) -> Vec<String> {
        self.regions.clone().unwrap_or_else(|| {
            DEFAULT_REGIONS
                .iter()
                .map(|region| (*region).to_owned())
                .collect()
        })
    }
}

/// Errors raised during configuration loading.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
