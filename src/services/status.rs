use crate::models::{Platform, ProvisioningContext};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::fmt;
use std::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    Installed,
    NotInstalled,
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallStatus::Installed => write!(f, "installed"),
            InstallStatus::NotInstalled => write!(f, "not installed"),
        }
    }
}

/// Install status of every configured target, in target order.
///
/// A platform counts as installed when its install root directory exists.
pub fn platform_status(ctx: &ProvisioningContext) -> IndexMap<Platform, InstallStatus> {
    ctx.targets
        .iter()
        .map(|&platform| {
            let status = if ctx.layout(platform).root.is_dir() {
                InstallStatus::Installed
            } else {
                InstallStatus::NotInstalled
            };
            (platform, status)
        })
        .collect()
}

/// Remove the install root of `platform`, then its OS directory if nothing else is left
/// in it. Returns `false` when there was nothing to remove.
pub fn uninstall(ctx: &ProvisioningContext, platform: Platform) -> Result<bool> {
    let root = ctx.layout(platform).root;
    if !root.is_dir() {
        tracing::info!("{} is not installed, nothing to remove", platform);
        return Ok(false);
    }

    fs::remove_dir_all(&root).with_context(|| format!("Failed to remove {}", root))?;
    tracing::info!("Removed {}", root);

    if let Some(os_dir) = root.parent() {
        let is_empty = os_dir
            .read_dir_utf8()
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            fs::remove_dir(os_dir).with_context(|| format!("Failed to remove {}", os_dir))?;
            tracing::debug!("Removed empty {}", os_dir);
        }
    }

    Ok(true)
}
