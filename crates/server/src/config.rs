//! Server configuration, read from environment variables at startup.
//!
//! Only the HTTP listener and the stdout log level live here. The telemetry
//! keys (`newrelicLicenseKey`, `newrelicOtlpEndpoint`) are resolved by
//! [`telemetry::env::Resolver`] so they can also come from `-D` properties.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Default log filter (e.g. `"info"`, `"debug"`); `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("PORT must be a non-zero TCP port");
        }
        if self.log_level.trim().is_empty() {
            anyhow::bail!("LOG_LEVEL must not be empty");
        }
        Ok(())
    }
}
