use crate::models::platform::{Platform, RESOLVER_PLATFORMS};
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable that redirects the install target to another platform.
pub const DEFAULT_ARCH_OVERRIDE_VAR: &str = "CONDA_ARCH_OVERRIDE";

/// Application settings from `conda-provision.yaml` and `CONDA_PROVISION_*` variables.
///
/// Every field has a default, so an absent settings file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Application project directory that owns the provisioning tree.
    pub project_dir: Utf8PathBuf,

    /// Name of the provisioning root beneath `project_dir`.
    pub conda_dir: String,

    /// Runtime asset directory that receives shared data.
    pub asset_dir: Utf8PathBuf,

    /// Platforms written into the resolver manifest on `init` and `add`.
    pub targets: Vec<Platform>,

    pub arch_override_var: String,

    /// Deadline for a single resolver invocation.
    pub tool_timeout_secs: u64,

    pub download_timeout_secs: u64,

    /// Route resolver calls through PowerShell / bash instead of executing directly.
    pub use_host_shell: bool,

    /// Per-host replacements for the resolver download URL.
    pub download_urls: IndexMap<Platform, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_dir: Utf8PathBuf::from("Assets"),
            conda_dir: "Conda".to_string(),
            asset_dir: Utf8PathBuf::from("Assets/StreamingAssets"),
            targets: RESOLVER_PLATFORMS.to_vec(),
            arch_override_var: DEFAULT_ARCH_OVERRIDE_VAR.to_string(),
            tool_timeout_secs: 1800,
            download_timeout_secs: 300,
            use_host_shell: false,
            download_urls: IndexMap::new(),
        }
    }
}

impl Settings {
    /// The provisioning root: `<project_dir>/<conda_dir>`.
    pub fn conda_path(&self) -> Utf8PathBuf {
        self.project_dir.join(&self.conda_dir)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.conda_path(), Utf8PathBuf::from("Assets/Conda"));
        assert_eq!(settings.targets.len(), 5);
        assert_eq!(settings.arch_override_var, "CONDA_ARCH_OVERRIDE");
        assert_eq!(settings.tool_timeout(), Duration::from_secs(1800));
        assert!(!settings.use_host_shell);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "tool_timeout_secs: 60\ntargets: [win-64, osx-arm64]\n";
        let settings: Settings = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(settings.tool_timeout_secs, 60);
        assert_eq!(settings.targets, vec![Platform::WindowsX64, Platform::MacArm64]);
        assert_eq!(settings.conda_dir, "Conda");
    }

    #[test]
    fn test_download_url_overrides_keyed_by_platform() {
        let yaml = "download_urls:\n  linux-64: https://mirror.example/pixi\n";
        let settings: Settings = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(
            settings.download_urls.get(&Platform::LinuxX64).map(String::as_str),
            Some("https://mirror.example/pixi")
        );
    }
}
