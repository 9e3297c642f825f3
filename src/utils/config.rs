// src/utils/config.rs
//! Capture configuration
//!
//! Sources are layered in this order, later ones winning:
//!
//! 1. Built-in defaults
//! 2. Optional TOML file (`harcap.toml` unless a path is given)
//! 3. `HARCAP_*` environment variables (`__` separates nested keys)
//! 4. Command-line overrides

use crate::utils::errors::{CaptureError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "harcap.toml";

/// Extra trigger that must resolve before the capture window closes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CompletionCondition {
    /// Navigation reaching network idle is enough
    NetworkIdle,

    /// A response whose URL contains the pattern has been received
    ResponseUrlContains(String),

    /// An element matching the CSS selector exists in the document
    SelectorAppears(String),
}

impl Default for CompletionCondition {
    fn default() -> Self {
        CompletionCondition::NetworkIdle
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Configuration for one capture run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Chromium binary; detected on PATH when unset
    pub executable_path: Option<PathBuf>,

    /// Page to profile
    pub target_url: String,

    /// Trigger closing the capture window besides network idle
    pub completion_condition: CompletionCondition,

    /// Root of the `{host}/{path}/{timestamp}` output layout
    pub output_root: PathBuf,

    /// Upper bound on the capture window (seconds)
    pub capture_timeout_secs: u64,

    /// Launch the browser without a window
    pub headless: bool,

    /// Lighthouse CLI; looked up on PATH when unset
    pub lighthouse_path: Option<PathBuf>,

    /// Skip the Lighthouse audit
    pub skip_audit: bool,

    /// Skip the manual pause before profiling
    pub skip_gate: bool,

    /// Log output format
    pub log_format: LogFormat,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            executable_path: None,
            target_url: String::new(),
            completion_condition: CompletionCondition::NetworkIdle,
            output_root: PathBuf::from("dist"),
            capture_timeout_secs: 120,
            headless: false,
            lighthouse_path: None,
            skip_audit: false,
            skip_gate: false,
            log_format: LogFormat::Pretty,
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub executable_path: Option<PathBuf>,
    pub target_url: Option<String>,
    pub completion_condition: Option<CompletionCondition>,
    pub output_root: Option<PathBuf>,
    pub capture_timeout_secs: Option<u64>,
    pub headless: Option<bool>,
    pub lighthouse_path: Option<PathBuf>,
    pub skip_audit: Option<bool>,
    pub skip_gate: Option<bool>,
    pub log_format: Option<LogFormat>,
}

impl CaptureConfig {
    /// Load configuration from file and environment, then apply overrides
    pub fn load(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let defaults = CaptureConfig::default();

        let file = match path {
            Some(p) => File::from(p.to_path_buf()).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let mut config: CaptureConfig = Config::builder()
            .set_default("target_url", defaults.target_url)?
            .set_default("completion_condition.kind", "network_idle")?
            .set_default("output_root", defaults.output_root.to_string_lossy().to_string())?
            .set_default("capture_timeout_secs", defaults.capture_timeout_secs)?
            .set_default("headless", defaults.headless)?
            .set_default("skip_audit", defaults.skip_audit)?
            .set_default("skip_gate", defaults.skip_gate)?
            .set_default("log_format", "pretty")?
            .add_source(file)
            .add_source(
                Environment::with_prefix("HARCAP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.apply(overrides);
        config.validate()?;

        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Apply command-line overrides on top of loaded values
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(v) = overrides.executable_path {
            self.executable_path = Some(v);
        }
        if let Some(v) = overrides.target_url {
            self.target_url = v;
        }
        if let Some(v) = overrides.completion_condition {
            self.completion_condition = v;
        }
        if let Some(v) = overrides.output_root {
            self.output_root = v;
        }
        if let Some(v) = overrides.capture_timeout_secs {
            self.capture_timeout_secs = v;
        }
        if let Some(v) = overrides.headless {
            self.headless = v;
        }
        if let Some(v) = overrides.lighthouse_path {
            self.lighthouse_path = Some(v);
        }
        if let Some(v) = overrides.skip_audit {
            self.skip_audit = v;
        }
        if let Some(v) = overrides.skip_gate {
            self.skip_gate = v;
        }
        if let Some(v) = overrides.log_format {
            self.log_format = v;
        }
    }

    /// Check that the configuration describes a runnable capture
    pub fn validate(&self) -> Result<()> {
        let url = self.target()?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CaptureError::ConfigError(format!(
                "target_url must be http or https, got {}",
                url.scheme()
            )));
        }

        if self.capture_timeout_secs == 0 {
            return Err(CaptureError::ConfigError(
                "capture_timeout_secs must be greater than zero".to_string(),
            ));
        }

        match &self.completion_condition {
            CompletionCondition::ResponseUrlContains(p) | CompletionCondition::SelectorAppears(p)
                if p.trim().is_empty() =>
            {
                Err(CaptureError::ConfigError(
                    "completion_condition value must not be empty".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Parsed target URL
    pub fn target(&self) -> Result<Url> {
        if self.target_url.is_empty() {
            return Err(CaptureError::ConfigError("target_url is required".to_string()));
        }
        Url::parse(&self.target_url)
            .map_err(|e| CaptureError::ConfigError(format!("Invalid target_url: {}", e)))
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }
}
