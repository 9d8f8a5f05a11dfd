use camino::{Utf8Component, Utf8Path};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Package sidecar stored as `.config.json` next to the resolver manifest.
///
/// Field names follow the on-disk format (`Packages`, `Name`, `Cleans`, `Shared_Datas`),
/// which is shared with hand-written configs, so they must not change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageConfig {
    #[serde(rename = "Packages", default, deserialize_with = "null_as_default")]
    pub packages: Vec<PackageDescriptor>,
}

/// Pruning rules and shared-data folders declared for one package.
///
/// Identity is `name` (exact, case-sensitive).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Cleans", default, deserialize_with = "null_as_default")]
    pub cleans: Vec<CleanRule>,

    #[serde(rename = "Shared_Datas", default, deserialize_with = "null_as_default")]
    pub shared_data: Vec<String>,
}

/// One directory to prune and the patterns that decide what survives.
///
/// `path` mixes symbolic tokens (`conda_library`, `conda_bin`, `conda_shared`) with
/// literal segments; see [`crate::services::prune::resolve_rule_path`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanRule {
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub includes: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub excludes: Vec<String>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PackageError {
    #[error("Install specification is empty")]
    EmptyInstallSpec,

    #[error("Package descriptor has an empty name")]
    EmptyName,

    #[error("Package {package}: shared data '{folder}' must be a single folder name")]
    InvalidSharedData { package: String, folder: String },

    #[error("Package {package}: invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        package: String,
        pattern: String,
        reason: String,
    },
}

impl PackageConfig {
    pub fn find(&self, name: &str) -> Option<&PackageDescriptor> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Insert `descriptor`, replacing an existing entry with the same name in place.
    ///
    /// Returns `true` when an existing entry was replaced.
    pub fn upsert(&mut self, descriptor: PackageDescriptor) -> bool {
        match self.packages.iter_mut().find(|p| p.name == descriptor.name) {
            Some(existing) => {
                *existing = descriptor;
                true
            }
            None => {
                self.packages.push(descriptor);
                false
            }
        }
    }
}

impl PackageDescriptor {
    /// Check that the descriptor is usable: a name, plain shared-data folder names, and
    /// patterns that compile.
    pub fn validate(&self) -> Result<(), PackageError> {
        if self.name.trim().is_empty() {
            return Err(PackageError::EmptyName);
        }

        for folder in &self.shared_data {
            if !is_plain_folder_name(folder) {
                return Err(PackageError::InvalidSharedData {
                    package: self.name.clone(),
                    folder: folder.clone(),
                });
            }
        }

        for rule in &self.cleans {
            for pattern in rule.excludes.iter().chain(rule.includes.iter()) {
                if let Err(e) = regex::Regex::new(pattern) {
                    return Err(PackageError::InvalidPattern {
                        package: self.name.clone(),
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// True if `folder` is a single ordinary path component (no separators, `..` or roots).
pub fn is_plain_folder_name(folder: &str) -> bool {
    let mut components = Utf8Path::new(folder).components();
    matches!(
        (components.next(), components.next()),
        (Some(Utf8Component::Normal(_)), None)
    )
}

/// One row of the resolver's `list --json` output.
///
/// Never persisted; only used to answer "is X@version installed".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledItem {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,

    #[serde(rename = "build", default, deserialize_with = "null_as_default")]
    pub build_string: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub is_explicit: bool,

    #[serde(default)]
    pub source: Option<String>,
}

impl InstalledItem {
    /// Packages the user asked for, as opposed to pulled-in dependencies.
    pub fn is_primary(&self) -> bool {
        self.is_explicit
    }

    /// Compiler runtimes and .NET redistributables that clutter dependency listings.
    pub fn is_runtime_redistributable(&self) -> bool {
        self.name.contains("dotnet") || self.name.starts_with("vc") || self.name.starts_with("vs")
    }
}

/// Output of the resolver's `info --json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverInfo {
    #[serde(default)]
    pub platform: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub project_info: Option<ProjectInfo>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub environments_info: Vec<EnvironmentInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub manifest_path: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub features: Vec<String>,
    #[serde(default)]
    pub solve_group: Option<String>,
    #[serde(default)]
    pub environment_size: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dependencies: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub platforms: Vec<String>,
}

/// Hand-edited sidecars write `null` for empty arrays.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
