//! Command-line protocol of the resolver binary (pixi).
//!
//! | Operation | Arguments |
//! |-----------|-----------|
//! | init      | `init --platform <p>... <root>` |
//! | add       | `add --no-install --platform <p>... <spec>...` |
//! | install   | `exec pixi-install-to-prefix --no-activation-scripts --platform <p> <prefix>` |
//! | list      | `list --json` |
//! | info      | `info --json` |

use crate::models::{InstalledItem, PackageError, Platform, ResolverInfo};
use crate::services::platform::PlatformError;
use anyhow::{Context, Result};
use camino::Utf8Path;

/// `--platform <id>` pairs for every target the resolver can solve for.
pub fn platform_flags(targets: &[Platform]) -> Vec<String> {
    targets
        .iter()
        .filter_map(|p| p.resolver_id())
        .flat_map(|id| ["--platform".to_string(), id.to_string()])
        .collect()
}

pub fn init_args(targets: &[Platform], root: &Utf8Path) -> Vec<String> {
    let mut args = vec!["init".to_string()];
    args.extend(platform_flags(targets));
    args.push(root.to_string());
    args
}

/// Arguments registering `install_spec` in the manifest without materializing it.
///
/// The spec is split on whitespace, so `"gdal>=3.9 libtiff"` adds two dependencies.
pub fn add_args(targets: &[Platform], install_spec: &str) -> Result<Vec<String>, PackageError> {
    let specs: Vec<String> = install_spec.split_whitespace().map(str::to_string).collect();
    if specs.is_empty() {
        return Err(PackageError::EmptyInstallSpec);
    }

    let mut args = vec!["add".to_string(), "--no-install".to_string()];
    args.extend(platform_flags(targets));
    args.extend(specs);
    Ok(args)
}

pub fn install_args(target: Platform, prefix: &Utf8Path) -> Result<Vec<String>, PlatformError> {
    let id = target
        .resolver_id()
        .ok_or(PlatformError::NoResolverPlatform(target))?;

    Ok(vec![
        "exec".to_string(),
        "pixi-install-to-prefix".to_string(),
        "--no-activation-scripts".to_string(),
        "--platform".to_string(),
        id.to_string(),
        prefix.to_string(),
    ])
}

pub fn list_args() -> Vec<String> {
    vec!["list".to_string(), "--json".to_string()]
}

pub fn info_args() -> Vec<String> {
    vec!["info".to_string(), "--json".to_string()]
}

/// Parse `list --json` output. Empty output means nothing is installed.
pub fn parse_list(stdout: &str) -> Result<Vec<InstalledItem>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(stdout).context("Failed to parse resolver package list")
}

pub fn parse_info(stdout: &str) -> Result<ResolverInfo> {
    if stdout.trim().is_empty() {
        return Ok(ResolverInfo::default());
    }
    serde_json::from_str(stdout).context("Failed to parse resolver info")
}
