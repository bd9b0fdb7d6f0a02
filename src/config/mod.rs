use anyhow::{ensure, Result};
use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
    pub rate_limiting: RateLimitingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log every request passing through the middleware chain.
    pub enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Where the rate limiter takes a client's identity from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    /// TCP peer address.
    #[default]
    Peer,
    /// `forwarded_header`, set by a trusted reverse proxy.
    Forwarded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    pub enabled: bool,
    pub requests_per_window: u32,
    pub window_seconds: u64,
    /// Tracker map shard count, a power of two greater than one.
    pub shards: usize,
    /// Seconds between eviction sweeps. 0 disables eviction entirely.
    pub sweep_interval_seconds: u64,
    /// How long after its window closes a tracker may be evicted.
    pub eviction_grace_seconds: u64,
    pub key_source: KeySource,
    pub forwarded_header: String,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: 10,
            window_seconds: 60,
            shards: crate::ratelimit::DEFAULT_SHARDS,
            sweep_interval_seconds: 60,
            eviction_grace_seconds: 60,
            key_source: KeySource::Peer,
            forwarded_header: "x-forwarded-for".to_string(),
        }
    }
}

impl RateLimitingConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_seconds > 0).then(|| Duration::from_secs(self.sweep_interval_seconds))
    }

    pub fn eviction_grace(&self) -> Duration {
        Duration::from_secs(self.eviction_grace_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.requests_per_window > 0,
            "rate_limiting.requests_per_window must be greater than zero"
        );
        ensure!(
            self.window_seconds > 0,
            "rate_limiting.window_seconds must be greater than zero"
        );
        ensure!(
            self.shards > 1 && self.shards.is_power_of_two(),
            "rate_limiting.shards must be a power of two greater than one: {}",
            self.shards
        );
        ensure!(
            HeaderName::from_bytes(self.forwarded_header.as_bytes()).is_ok(),
            "rate_limiting.forwarded_header is not a valid header name: {}",
            self.forwarded_header
        );
        Ok(())
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CONFIG_PATH")
            .unwrap_or_else(|_| "config/default.yaml".to_string());

        let mut builder = config::Config::builder()
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(
                config::Environment::with_prefix("RETURNS")
                    .separator("__")
                    .try_parsing(true),
            );

        // Override with environment variables if present
        if let Ok(host) = std::env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }
        if let Ok(port) = std::env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>()?)?;
        }

        let settings = builder.build()?;
        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.server.timeout_seconds > 0,
            "server.timeout_seconds must be greater than zero"
        );
        self.rate_limiting.validate()
    }
}
