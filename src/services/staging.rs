use crate::models::package::is_plain_folder_name;
use crate::models::{InstallLayout, PackageDescriptor};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Files copied into the asset directory, shared-data folders the platform lacked, and
/// folder names refused because they would leave the asset directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingReport {
    pub copied: Vec<Utf8PathBuf>,
    pub missing_sources: Vec<String>,
    pub rejected: Vec<String>,
}

/// Copy each package's shared-data folders from the environment's share directory into
/// `asset_root/<folder>`.
///
/// Copies are flat (files only, no sub-directories) and overwrite existing files. The
/// destination folder is always created; a missing source folder is skipped, since not
/// every platform ships every folder.
///
/// Folder names come from a hand-editable sidecar, so anything other than a single plain
/// name is skipped with a warning and nothing is written for it.
pub fn stage_shared_data(
    layout: &InstallLayout,
    packages: &[PackageDescriptor],
    asset_root: &Utf8Path,
) -> Result<StagingReport> {
    let mut report = StagingReport::default();

    fs::create_dir_all(asset_root)
        .with_context(|| format!("Failed to create asset directory: {}", asset_root))?;

    for folder in packages.iter().flat_map(|p| p.shared_data.iter()) {
        if !is_plain_folder_name(folder) {
            tracing::warn!("Ignoring shared data entry '{}': not a plain folder name", folder);
            report.rejected.push(folder.clone());
            continue;
        }

        let dest = asset_root.join(folder);
        fs::create_dir_all(&dest)
            .with_context(|| format!("Failed to create shared data directory: {}", dest))?;

        let source = layout.share.join(folder);
        if !source.is_dir() {
            tracing::debug!("No shared data at {}, skipping", source);
            report.missing_sources.push(folder.clone());
            continue;
        }

        for entry in source
            .read_dir_utf8()
            .with_context(|| format!("Failed to read {}", source))?
        {
            let entry = entry.with_context(|| format!("Failed to read {}", source))?;
            let is_file = entry
                .file_type()
                .with_context(|| format!("Failed to stat {}", entry.path()))?
                .is_file();
            if !is_file {
                continue;
            }

            let target = dest.join(entry.file_name());
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {} to {}", entry.path(), target))?;
            report.copied.push(target);
        }

        tracing::info!("Staged shared data {} into {}", folder, dest);
    }

    Ok(report)
}
