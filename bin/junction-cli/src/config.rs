//! Configuration management for the junction command line client.
//!
//! This module provides configuration loading from both base configuration file
//! and environment variables. Environment variables override the base configuration
//! and use the prefix `JUNCTION_`.

use core::time::Duration;

use config::{ConfigError, Environment, File, FileFormat};
use junction_wallet_domain::psbt::SignatureCounting;
use serde::Deserialize;

/// Loads the configuration from base config and environment variables.
///
/// Environment variables use double underscores `__` to denote nested keys.
/// For example, `JUNCTION_BACKEND__URL` corresponds to `backend.url`.
///
/// # Errors
///
/// If the configuration could not be loaded or parsed
pub fn get_configuration() -> Result<Config, ConfigError> {
    config::Config::builder()
        .add_source(File::from_str(include_str!("base_config.ron"), FileFormat::Ron))
        .add_source(
            Environment::with_prefix(Config::CONFIG_ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize()
}

/// Root configuration structure containing all client settings.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Wallet backend connection
    pub backend: BackendConfig,

    /// Lifecycle controller settings
    pub engine: EngineConfig,
}

/// Wallet backend connection settings.
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    /// The base URL of the backend (e.g., "http://localhost:37128")
    pub url: String,

    /// Timeout of a single backend request
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Lifecycle controller settings.
#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    /// Interval between two device enumerations while watching
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// How signatures are counted against a wallet threshold, `first_input` or `every_input`
    pub signature_counting: SignatureCounting,
}

impl Config {
    const CONFIG_ENV_PREFIX: &str = "JUNCTION";
}
