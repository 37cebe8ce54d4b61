//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. The
//! expiry sweep can be switched and retimed from the environment, which is
//! how deployments drive it without editing the file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;

use crate::engine::StartRequest;

/// Env var that turns the expiry sweep on or off.
pub const SWEEP_ENABLED_ENV: &str = "RUN_SESSION_CRON";
/// Env var overriding the sweep interval in seconds.
pub const SWEEP_INTERVAL_ENV: &str = "SESSION_SWEEP_INTERVAL_SECS";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Agents launched at boot.
    #[serde(default)]
    pub agents: Vec<StartRequest>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SweepConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_sweep_interval(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://tender.db?mode=rwc".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    60
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RUN_SESSION_CRON` and `SESSION_SWEEP_INTERVAL_SECS` if set.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(SWEEP_ENABLED_ENV) {
            self.sweep.enabled = parse_flag(&raw)
                .with_context(|| format!("Invalid {SWEEP_ENABLED_ENV}: {raw}"))?;
        }
        if let Ok(raw) = std::env::var(SWEEP_INTERVAL_ENV) {
            self.sweep.interval_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid {SWEEP_INTERVAL_ENV}: {raw}"))?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.sweep.enabled && self.sweep.interval_secs == 0 {
            bail!("sweep.interval_secs must be positive");
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}
