#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! # Smog Settings
//!
//! Configuration is specified in several ways, with later methods overriding earlier ones.
//!
//! 1. A base configuration checked into the repository, in `config/base.yaml`.
//!    This provides the default values for most settings.
//! 2. Per-environment configuration files in the `config` directory. The
//!    environment is selected using the environment variable `SMOG_ENV`. The
//!    settings for that environment are then loaded from `config/${env}.yaml`, if
//!    it exists. The default environment is "development". A "production"
//!    environment is also provided.
//! 3. A local configuration file not checked into the repository, at
//!    `config/local.yaml`. This file is in `.gitignore` and is safe to use for
//!    local configuration and secrets, such as the pollution API credentials.
//! 4. Environment variables that begin with `SMOG_` and have a separator for
//!    `__`. For example, `Settings::http::listen` can be controlled from the
//!    environment variable `SMOG_HTTP__LISTEN`.
//!
//! Tests should use `Settings::load_for_tests` which only reads from
//! `config/base.yaml`, `config/test.yaml`, and `config/local_test.yaml` (if it
//! exists). It does not read from environment variables.
//!
//! Configuration files are canonically YAML files. However, any format supported
//! by the [config] crate can be used, including JSON and TOML. To choose another
//! format, simply use a different extension for your file, like
//! `config/local.toml`.

mod logging;

pub use logging::{DirectiveWrapper, LogFormat, LoggingSettings};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use std::{net::SocketAddr, time::Duration};

/// Top level settings object for Smog.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[doc(inline)]
pub struct Settings {
    /// The environment Smog is running in. Should only be set with the
    /// `SMOG_ENV` environment variable.
    pub env: String,

    /// Enable additional features to debug the application. This should not be
    /// set to true in production environments.
    pub debug: bool,

    /// Settings for the HTTP server.
    pub http: HttpSettings,

    /// Logging settings.
    pub logging: LoggingSettings,

    /// Metrics settings.
    pub metrics: MetricsSettings,

    /// Settings for the upstream pollution API.
    pub pollution: PollutionSettings,

    /// Settings for the Wikipedia summary lookups.
    pub wikipedia: WikipediaSettings,

    /// Settings for the city listing served to clients.
    pub cities: CitiesSettings,
}

/// Settings for the HTTP server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpSettings {
    /// The host and port to listen on, such as "127.0.0.1:8080" or "0.0.0.0:80".
    pub listen: SocketAddr,

    /// The number of workers to use. Optional. If no value is provided, the
    /// number of logical cores will be used.
    pub workers: Option<usize>,
}

/// Settings for the StatsD metrics sink.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// The host to send metrics to, such as "127.0.0.1".
    pub sink_host: String,

    /// The UDP port to send metrics to.
    pub sink_port: u16,

    /// The maximum number of metrics that can be queued before new ones are
    /// dropped. If not set, the queue is unbounded.
    pub max_queue_size: Option<usize>,
}

/// Settings for the upstream pollution API.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollutionSettings {
    /// The root of the API, such as "https://be-recruitment-task.onrender.com".
    /// The login and listing paths are appended to it.
    pub base_url: String,

    /// The service account used to request a bearer token.
    pub username: String,

    /// The password of the service account.
    pub password: String,

    /// The number of records requested per listing page.
    pub page_size: u32,

    /// The minimum time between two requests to the API, across all countries.
    #[serde_as(as = "DurationMilliSeconds")]
    #[serde(rename = "min_interval_ms")]
    pub min_interval: Duration,

    /// Request timeout. If not set, requests wait as long as the transport allows.
    #[serde_as(as = "Option<DurationSeconds>")]
    #[serde(rename = "timeout_sec", default)]
    pub timeout: Option<Duration>,
}

/// Settings for Wikipedia description lookups.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WikipediaSettings {
    /// The page summary endpoint. The city name is appended as the last path segment.
    pub summary_endpoint: String,

    /// The minimum time between two lookups, across all cities.
    #[serde_as(as = "DurationMilliSeconds")]
    #[serde(rename = "min_interval_ms")]
    pub min_interval: Duration,

    /// Request timeout. If not set, requests wait as long as the transport allows.
    #[serde_as(as = "Option<DurationSeconds>")]
    #[serde(rename = "timeout_sec", default)]
    pub timeout: Option<Duration>,
}

/// Settings for the city listing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CitiesSettings {
    /// The number of cities returned per page.
    pub page_size: usize,
}

impl Settings {
    /// Load settings from configuration files and environment variables.
    ///
    /// # Errors
    /// If any of the configured values are invalid, or if any of the required
    /// configuration files are missing.
    pub fn load() -> Result<Self, ConfigError> {
        let mut s = Config::new();

        // Start off with the base config.
        s.merge(File::with_name("./config/base"))?;

        // Merge in an environment specific config.
        let smog_env = std::env::var("SMOG_ENV").unwrap_or_else(|_| "development".to_string());
        s.set("env", smog_env.as_str())?;
        s.merge(File::with_name(&format!("config/{}", s.get::<String>("env")?)).required(false))?;

        // Add a local configuration file that is `.gitignore`ed.
        s.merge(File::with_name("config/local").required(false))?;

        // Add environment variables that start with "SMOG_" and have "__" to
        // separate levels. For example, `SMOG_HTTP__LISTEN` maps to
        // `Settings::http::listen`.
        s.merge(Environment::with_prefix("SMOG").separator("__"))?;

        s.try_into()
    }

    /// Load settings from configuration files for tests.
    ///
    /// # Panics
    /// If the test configuration files are missing or invalid.
    #[must_use]
    pub fn load_for_tests() -> Self {
        let mut s = Config::new();

        // Start off with the base config.
        s.merge(File::with_name("../config/base"))
            .expect("Could not load base settings");

        // Merge in test specific config.
        s.set("env", "test").expect("Could not set env for tests");
        s.merge(File::with_name("../config/test"))
            .expect("Could not load test settings");

        // Add a local configuration file that is `.gitignore`ed.
        s.merge(File::with_name("../config/local_test").required(false))
            .expect("Could not load local settings for tests");

        s.try_into().expect("Could not convert settings")
    }
}
