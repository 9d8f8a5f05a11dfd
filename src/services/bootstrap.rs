use crate::metrics::Metrics;
use crate::models::{OsFamily, Platform, ProvisioningContext};
use crate::services::download::Fetcher;
use crate::services::resolver;
use crate::services::tool::{ToolError, ToolRunner};
use crate::services::vcs_ignore::{update_ignore_file, IGNORE_ENTRIES};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use thiserror::Error;

/// Failure of one bootstrap transition.
///
/// Attached as context on top of the underlying cause, so both this and the cause
/// (for example a [`ToolError`]) can be recovered with `downcast_ref`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("Failed to download the resolver from {url}")]
    Download { url: String },

    #[error("Failed to make {path} executable")]
    MakeExecutable { path: Utf8PathBuf },

    #[error("Failed to remove the quarantine attribute from {path}")]
    Unquarantine { path: Utf8PathBuf },

    #[error("Failed to initialize the environment at {root}")]
    Init { root: Utf8PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryState {
    NoBinary,
    BinaryPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvState {
    EnvUninitialized,
    EnvReady,
}

/// Where bootstrap currently stands, read from the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapStatus {
    pub binary: BinaryState,
    pub environment: EnvState,
}

impl BootstrapStatus {
    pub fn is_ready(&self) -> bool {
        self.binary == BinaryState::BinaryPresent && self.environment == EnvState::EnvReady
    }
}

/// Which transitions a bootstrap run actually performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapOutcome {
    pub downloaded: bool,
    pub initialized: bool,
}

/// Brings a provisioning root to the ready state: resolver binary present and manifest
/// initialized.
///
/// Readiness is decided by file existence only, so a run after a partial failure picks
/// up where the previous one stopped and a completed bootstrap is a no-op.
pub struct BootstrapManager<'a, R, F> {
    ctx: &'a ProvisioningContext,
    runner: &'a R,
    fetcher: &'a F,
    metrics: &'a Metrics,
}

impl<'a, R: ToolRunner, F: Fetcher> BootstrapManager<'a, R, F> {
    pub fn new(
        ctx: &'a ProvisioningContext,
        runner: &'a R,
        fetcher: &'a F,
        metrics: &'a Metrics,
    ) -> Self {
        Self {
            ctx,
            runner,
            fetcher,
            metrics,
        }
    }

    pub fn status(&self) -> BootstrapStatus {
        BootstrapStatus {
            binary: if self.ctx.binary().is_file() {
                BinaryState::BinaryPresent
            } else {
                BinaryState::NoBinary
            },
            environment: if self.ctx.manifest_path().is_file() {
                EnvState::EnvReady
            } else {
                EnvState::EnvUninitialized
            },
        }
    }

    /// Perform whichever transitions are still outstanding.
    pub async fn run(&self) -> Result<BootstrapOutcome> {
        self.prepare_directories()?;

        let mut outcome = BootstrapOutcome::default();

        // File existence is the only readiness test for both steps
        if self.status().binary == BinaryState::NoBinary {
            self.install_binary().await?;
            outcome.downloaded = true;
        } else {
            tracing::debug!("Resolver already present at {}", self.ctx.binary());
        }

        if self.status().environment == EnvState::EnvUninitialized {
            self.initialize().await?;
            outcome.initialized = true;
        } else {
            tracing::debug!("Manifest already present at {}", self.ctx.manifest_path());
        }

        Ok(outcome)
    }

    fn prepare_directories(&self) -> Result<()> {
        for dir in [&self.ctx.conda_path, &self.ctx.plugin_path] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir))?;
        }
        Ok(())
    }

    async fn install_binary(&self) -> Result<()> {
        let binary = self.ctx.binary();
        tracing::info!(
            "Resolver not found, downloading {} to {}",
            self.ctx.download_url,
            binary
        );

        self.fetcher
            .fetch(&self.ctx.download_url, binary)
            .await
            .context(BootstrapError::Download {
                url: self.ctx.download_url.clone(),
            })?;
        self.metrics.record_download();

        // Downloads arrive without the executable bit
        if self.ctx.host.os_family() == OsFamily::Unix {
            make_executable(binary).context(BootstrapError::MakeExecutable {
                path: binary.to_path_buf(),
            })?;
        }

        if matches!(self.ctx.host, Platform::MacX64 | Platform::MacArm64) {
            self.unquarantine(binary).await?;
        }

        Ok(())
    }

    async fn unquarantine(&self, binary: &Utf8Path) -> Result<()> {
        let args = [
            "-d".to_string(),
            "com.apple.quarantine".to_string(),
            binary.to_string(),
        ];

        match self.runner.run(Utf8Path::new("xattr"), &args).await {
            Ok(_) => Ok(()),
            // Downloads made without a browser usually carry no quarantine flag.
            Err(e)
                if matches!(
                    e.downcast_ref::<ToolError>(),
                    Some(ToolError::Failed { stderr, .. }) if stderr.contains("No such xattr")
                ) =>
            {
                tracing::debug!("{} carries no quarantine attribute", binary);
                Ok(())
            }
            Err(e) => Err(e.context(BootstrapError::Unquarantine {
                path: binary.to_path_buf(),
            })),
        }
    }

    async fn initialize(&self) -> Result<()> {
        let root = &self.ctx.conda_path;
        tracing::info!("Initializing environment at {}", root);

        let args = resolver::init_args(&self.ctx.targets, root);
        self.runner
            .run(self.ctx.binary(), &args)
            .await
            .context(BootstrapError::Init { root: root.clone() })?;

        update_ignore_file(&self.ctx.ignore_path(), &IGNORE_ENTRIES)?;
        Ok(())
    }
}

#[cfg(unix)]
fn make_executable(path: &Utf8Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path))?
        .permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions)
        .with_context(|| format!("Failed to set permissions on {}", path))
}

#[cfg(not(unix))]
fn make_executable(path: &Utf8Path) -> Result<()> {
    tracing::debug!("Executable bit not applicable on this OS for {}", path);
    Ok(())
}
