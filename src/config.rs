use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{
    BackendKind, InferenceBackend, LocalModelBackend, ModelSource, OllamaLoader, RemoteApiBackend,
};

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which backend drives the conversation
    pub backend: BackendKind,

    /// Locally served model settings
    pub local: LocalConfig,

    /// Remote chat endpoint settings
    pub remote: RemoteConfig,

    /// UI preferences
    pub ui: UiConfig,
}

/// Locally served model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub base_url: String,
    pub model_id: String,
    pub allow_local_models: bool,
    pub allow_remote_models: bool,
}

/// Remote chat endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub endpoint: String,
}

/// UI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub tick_rate_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: BackendKind::Local,
            local: LocalConfig::default(),
            remote: RemoteConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        let source = ModelSource::default();
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model_id: "tinyllama".to_string(),
            allow_local_models: source.allow_local_models,
            allow_remote_models: source.allow_remote_models,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000/api/chat".to_string(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { tick_rate_ms: 250 }
    }
}

impl Config {
    /// Directory holding the config file and log
    pub fn home_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".chatline"))
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    /// Load configuration from `path`, falling back to defaults when the file is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ui.tick_rate_ms == 0 {
            bail!("ui.tick_rate_ms must be greater than zero");
        }
        Ok(())
    }

    /// Replace file values with whichever command-line flags were given
    pub fn apply_overrides(
        &mut self,
        backend: Option<BackendKind>,
        endpoint: Option<String>,
        model: Option<String>,
    ) {
        if let Some(backend) = backend {
            self.backend = backend;
        }
        if let Some(endpoint) = endpoint {
            self.remote.endpoint = endpoint;
        }
        if let Some(model) = model {
            self.local.model_id = model;
        }
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = self.to_toml()?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path()?)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.ui.tick_rate_ms.max(1))
    }

    pub fn model_source(&self) -> ModelSource {
        ModelSource {
            allow_local_models: self.local.allow_local_models,
            allow_remote_models: self.local.allow_remote_models,
        }
    }

    /// Construct the backend selected by `backend`
    pub fn build_backend(&self) -> Arc<dyn InferenceBackend> {
        match self.backend {
            BackendKind::Local => Arc::new(LocalModelBackend::new(
                self.local.model_id.clone(),
                self.model_source(),
                Box::new(OllamaLoader::new(&self.local.base_url)),
            )),
            BackendKind::Remote => Arc::new(RemoteApiBackend::new(&self.remote.endpoint)),
        }
    }
}
