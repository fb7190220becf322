//! Configuration loaded from `crispi.toml`.
//!
//! [`CrispiConfig`] holds every tunable. Values missing from the file fall
//! back to defaults. The `OPENAI_API_KEY` environment variable takes
//! precedence over the file's `api_key`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::openai::ChatSettings;
use crate::openai::client::API_URL;

pub const CONFIG_FILE: &str = "crispi.toml";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Top-level configuration loaded from `crispi.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct CrispiConfig {
    /// OpenAI API key. Empty disables question generation and scoring by model.
    #[serde(default)]
    pub api_key: String,

    /// Chat model used for question generation and scoring.
    #[serde(default = "default_model")]
    pub model: String,

    /// Chat completions endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Where sessions are persisted.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Upper bound on waiting for a generated question set before the
    /// built-in set is used.
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_base_url() -> String {
    API_URL.to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_state_path() -> PathBuf {
    PathBuf::from("crispi-state.json")
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_generation_timeout_secs() -> u64 {
    20
}

impl Default for CrispiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            state_path: default_state_path(),
            request_timeout_secs: default_request_timeout_secs(),
            generation_timeout_secs: default_generation_timeout_secs(),
        }
    }
}

impl CrispiConfig {
    /// Loads `crispi.toml` from the current directory, then applies the
    /// environment override.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(Path::new(CONFIG_FILE))?;
        config.apply_api_key_override(std::env::var(API_KEY_ENV).ok());
        Ok(config)
    }

    /// Reads `path`, or returns defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str::<CrispiConfig>(&contents)
            .with_context(|| format!("parsing {}", path.display()))
    }

    /// A non-empty key replaces the configured one.
    pub fn apply_api_key_override(&mut self, key: Option<String>) {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.api_key = key;
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            model: self.model.clone(),
            temperature: self.temperature,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}
