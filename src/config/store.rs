use crate::models::{PackageConfig, PackageDescriptor};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// The package sidecar (`.config.json`) with its in-memory copy.
///
/// Loaded once when constructed and rewritten wholesale after every mutation;
/// there is no partial patching of the file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: Utf8PathBuf,
    config: PackageConfig,
}

impl ConfigStore {
    /// Load the sidecar at `path`. A missing file yields an empty package list.
    pub fn load<P: AsRef<Utf8Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            tracing::debug!("Package config not found at {}, starting empty", path);
            return Ok(Self {
                path,
                config: PackageConfig::default(),
            });
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read package config: {}", path))?;

        let config: PackageConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse package config: {}", path))?;

        tracing::info!(
            "Loaded package config from {} ({} packages)",
            path,
            config.packages.len()
        );

        Ok(Self { path, config })
    }

    /// Write the whole package list back to disk.
    pub fn save(&self) -> Result<()> {
        write_config(&self.path, &self.config)
    }

    /// Insert or replace `descriptor` by name, then persist.
    ///
    /// The in-memory list only changes once the file has been written.
    pub fn upsert(&mut self, descriptor: PackageDescriptor) -> Result<()> {
        let name = descriptor.name.clone();
        let mut updated = self.config.clone();
        let replaced = updated.upsert(descriptor);

        write_config(&self.path, &updated)?;
        self.config = updated;

        if replaced {
            tracing::info!("Updated package descriptor '{}'", name);
        } else {
            tracing::info!("Registered package descriptor '{}'", name);
        }
        Ok(())
    }

    pub fn packages(&self) -> &[PackageDescriptor] {
        &self.config.packages
    }

    pub fn config(&self) -> &PackageConfig {
        &self.config
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

fn write_config(path: &Utf8Path, config: &PackageConfig) -> Result<()> {
    let json =
        serde_json::to_string_pretty(config).context("Failed to serialize package config to JSON")?;

    // Create the provisioning root on first save
    if let Some(parent) = path.parent() {
        if !parent.as_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent))?;
        }
    }

    fs::write(path, json).with_context(|| format!("Failed to write package config: {}", path))?;

    tracing::debug!("Saved package config to {}", path);
    Ok(())
}
