use crate::models::Settings;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;

pub mod store;

pub use store::ConfigStore;

/// Default settings file name, looked up in the working directory.
pub const SETTINGS_FILE: &str = "conda-provision.yaml";

/// Prefix of environment variables that override settings
/// (e.g. `CONDA_PROVISION_TOOL_TIMEOUT_SECS=600`).
pub const ENV_PREFIX: &str = "CONDA_PROVISION";

/// Configuration manager for the application settings file.
///
/// Settings are layered: built-in defaults, then the YAML file (optional), then
/// `CONDA_PROVISION_*` environment variables. The package sidecar is handled separately by
/// [`ConfigStore`] because it lives inside the provisioning tree, not next to the binary.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager reading settings from `settings_path`.
    pub fn new<P: AsRef<Utf8Path>>(settings_path: P) -> Self {
        Self {
            settings_path: settings_path.as_ref().to_path_buf(),
        }
    }

    /// Load settings from the file and the process environment.
    pub fn load_settings(&self) -> Result<Settings> {
        self.load_settings_with_env(None)
    }

    /// Load settings, reading overrides from `env` instead of the process environment
    /// when given.
    pub fn load_settings_with_env(
        &self,
        env: Option<config::Map<String, String>>,
    ) -> Result<Settings> {
        if !self.settings_path.exists() {
            tracing::debug!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let environment = Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("targets")
            .source(env);

        let settings: Settings = Config::builder()
            .add_source(File::new(self.settings_path.as_str(), FileFormat::Yaml).required(false))
            .add_source(environment)
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::debug!("Loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    /// Write `settings` to the settings file as YAML.
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        if let Some(parent) = self.settings_path.parent() {
            if !parent.as_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create settings directory: {}", parent))?;
            }
        }

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Render settings the way they would be saved.
    pub fn render_settings(settings: &Settings) -> Result<String> {
        serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new(SETTINGS_FILE)
    }
}
