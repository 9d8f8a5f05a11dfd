use crate::config::ConfigStore;
use crate::metrics::Metrics;
use crate::models::{InstalledItem, PackageDescriptor, Platform, ProvisioningContext, ResolverInfo};
use crate::services::prune::{PruneEngine, PruneReport};
use crate::services::resolver;
use crate::services::staging::{stage_shared_data, StagingReport};
use crate::services::tool::ToolRunner;
use anyhow::{Context, Result};
use camino::Utf8Path;

/// What one tree-shake pass did to an install root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeShakeReport {
    pub staging: StagingReport,
    pub prune: PruneReport,
}

/// Registers packages in the manifest, materializes environments and trims them.
///
/// Borrows everything from the caller for the duration of one operation; `add` is the
/// only operation that writes the package sidecar.
pub struct PackageInstaller<'a, R> {
    ctx: &'a ProvisioningContext,
    runner: &'a R,
    store: &'a mut ConfigStore,
    engine: &'a PruneEngine,
    metrics: &'a Metrics,
}

impl<'a, R: ToolRunner> PackageInstaller<'a, R> {
    pub fn new(
        ctx: &'a ProvisioningContext,
        runner: &'a R,
        store: &'a mut ConfigStore,
        engine: &'a PruneEngine,
        metrics: &'a Metrics,
    ) -> Self {
        Self {
            ctx,
            runner,
            store,
            engine,
            metrics,
        }
    }

    /// Add `install_spec` to the manifest, record `descriptor` if given, then install the
    /// context's target platform.
    ///
    /// The descriptor is validated before anything runs, so a bad pattern never reaches
    /// the sidecar.
    pub async fn add(
        &mut self,
        install_spec: &str,
        descriptor: Option<PackageDescriptor>,
    ) -> Result<TreeShakeReport> {
        if let Some(descriptor) = &descriptor {
            descriptor.validate()?;
        }

        let args = resolver::add_args(&self.ctx.targets, install_spec)?;
        tracing::info!("Adding {} to the manifest", install_spec);
        self.runner
            .run(self.ctx.binary(), &args)
            .await
            .with_context(|| format!("Failed to add '{}'", install_spec))?;

        if let Some(descriptor) = descriptor {
            self.store.upsert(descriptor)?;
        }

        self.install(self.ctx.target).await
    }

    /// Materialize the environment for `target` into its install root, then tree-shake it.
    pub async fn install(&self, target: Platform) -> Result<TreeShakeReport> {
        let layout = self.ctx.layout(target);
        let args = resolver::install_args(target, &layout.root)?;

        tracing::info!("Installing environment for {} into {}", target, layout.root);
        self.runner
            .run(self.ctx.binary(), &args)
            .await
            .with_context(|| format!("Failed to install environment for {}", target))?;

        self.tree_shake(target)
    }

    /// Stage shared data, then run the generic per-OS cleanup followed by every
    /// package's clean rules on the install root of `target`.
    ///
    /// Staging reads the unpruned tree, so a clean rule may remove a shared-data source
    /// after it has been copied out.
    pub fn tree_shake(&self, target: Platform) -> Result<TreeShakeReport> {
        let layout = self.ctx.layout(target);
        if !layout.root.is_dir() {
            anyhow::bail!("{} is not installed (missing {})", target, layout.root);
        }

        let packages = self.store.packages();
        let staging = stage_shared_data(&layout, packages, &self.ctx.asset_path)?;
        self.metrics.record_staged(staging.copied.len());

        let mut prune = self.engine.clean_generic(&layout);
        prune.extend(self.engine.apply_package_rules(&layout, packages));
        self.metrics
            .record_pruned(prune.deleted.len(), prune.warnings.len());

        tracing::info!(
            "Tree shake of {} done: {} staged, {} removed, {} warnings",
            target,
            staging.copied.len(),
            prune.deleted.len(),
            prune.warnings.len()
        );

        Ok(TreeShakeReport { staging, prune })
    }

    /// Packages installed in the environment, as reported by the resolver.
    pub async fn info(&self) -> Result<Vec<InstalledItem>> {
        let output = self
            .runner
            .run(self.ctx.binary(), &resolver::list_args())
            .await
            .context("Failed to list installed packages")?;
        resolver::parse_list(&output.stdout)
    }

    pub async fn resolver_info(&self) -> Result<ResolverInfo> {
        let output = self
            .runner
            .run(self.ctx.binary(), &resolver::info_args())
            .await
            .context("Failed to query resolver info")?;
        resolver::parse_info(&output.stdout)
    }

    /// Whether `name` at exactly `version` is installed.
    ///
    /// Best-effort: a missing resolver, a failed listing or an empty plugin directory all
    /// answer `false`.
    pub async fn is_installed(&self, name: &str, version: &str) -> bool {
        if !self.ctx.binary().is_file() {
            tracing::debug!("Resolver missing, {} treated as not installed", name);
            return false;
        }

        let items = match self.info().await {
            Ok(items) => items,
            Err(e) => {
                tracing::debug!("Package listing failed: {:#}", e);
                return false;
            }
        };

        has_subdirectories(&self.ctx.plugin_path)
            && items
                .iter()
                .any(|item| item.name == name && item.version == version)
    }
}

fn has_subdirectories(dir: &Utf8Path) -> bool {
    dir.read_dir_utf8()
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .any(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CleanRule, PackageError, Settings};
    use crate::services::tool::{ToolError, ToolOutput};
    use camino::Utf8PathBuf;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Answers `list --json` with a fixed listing and records every call.
    struct ListingRunner {
        listing: &'static str,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ListingRunner {
        fn new(listing: &'static str) -> Self {
            Self {
                listing,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ToolRunner for ListingRunner {
        async fn run(&self, _program: &Utf8Path, args: &[String]) -> Result<ToolOutput> {
            self.calls.lock().unwrap().push(args.to_vec());
            if args.first().map(String::as_str) == Some("list") {
                return Ok(ToolOutput {
                    stdout: self.listing.to_string(),
                    ..ToolOutput::default()
                });
            }
            Ok(ToolOutput::default())
        }
    }

    struct FailingRunner;

    impl ToolRunner for FailingRunner {
        async fn run(&self, _program: &Utf8Path, _args: &[String]) -> Result<ToolOutput> {
            Err(ToolError::Failed {
                exit_code: 1,
                stderr: "could not find pixi.toml".to_string(),
            }
            .into())
        }
    }

    const GDAL_LISTING: &str =
        r#"[{"name":"gdal","version":"3.9.0","build":"py312","is_explicit":true}]"#;

    fn setup(host: Platform) -> (TempDir, ProvisioningContext, ConfigStore) {
        let temp_dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let settings = Settings {
            project_dir: base.clone(),
            asset_dir: base.join("StreamingAssets"),
            ..Settings::default()
        };
        let ctx = ProvisioningContext::new(&settings, host, host);
        let store = ConfigStore::load(ctx.config_path()).unwrap();
        (temp_dir, ctx, store)
    }

    #[tokio::test]
    async fn test_is_installed_false_without_binary() {
        let (_temp_dir, ctx, mut store) = setup(Platform::WindowsX64);
        let runner = ListingRunner::new(GDAL_LISTING);
        let engine = PruneEngine::new();
        let metrics = Metrics::new();
        let installer = PackageInstaller::new(&ctx, &runner, &mut store, &engine, &metrics);

        assert!(!installer.is_installed("gdal", "3.9.0").await);
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_is_installed_requires_listing_and_plugins() {
        let (_temp_dir, ctx, mut store) = setup(Platform::LinuxX64);
        fs::create_dir_all(&ctx.conda_path).unwrap();
        fs::write(ctx.binary(), "").unwrap();
        fs::create_dir_all(&ctx.plugin_path).unwrap();

        let runner = ListingRunner::new(GDAL_LISTING);
        let engine = PruneEngine::new();
        let metrics = Metrics::new();
        let installer = PackageInstaller::new(&ctx, &runner, &mut store, &engine, &metrics);

        // Listed, but nothing materialized under Plugins yet.
        assert!(!installer.is_installed("gdal", "3.9.0").await);

        fs::create_dir_all(ctx.target_layout().root).unwrap();
        assert!(installer.is_installed("gdal", "3.9.0").await);
        assert!(!installer.is_installed("gdal", "3.8.5").await);
        assert!(!installer.is_installed("proj", "3.9.0").await);
    }

    #[tokio::test]
    async fn test_is_installed_swallows_tool_failure() {
        let (_temp_dir, ctx, mut store) = setup(Platform::LinuxX64);
        fs::create_dir_all(ctx.target_layout().root).unwrap();
        fs::write(ctx.binary(), "").unwrap();

        let engine = PruneEngine::new();
        let metrics = Metrics::new();
        let installer = PackageInstaller::new(&ctx, &FailingRunner, &mut store, &engine, &metrics);

        assert!(!installer.is_installed("gdal", "3.9.0").await);
        assert!(installer.info().await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_descriptor_is_rejected_before_running() {
        let (_temp_dir, ctx, mut store) = setup(Platform::LinuxX64);
        let runner = ListingRunner::new("[]");
        let engine = PruneEngine::new();
        let metrics = Metrics::new();
        let mut installer = PackageInstaller::new(&ctx, &runner, &mut store, &engine, &metrics);

        let descriptor = PackageDescriptor {
            name: "gdal".to_string(),
            cleans: vec![CleanRule {
                path: vec!["conda_shared".to_string()],
                excludes: vec!["(unclosed".to_string()],
                includes: vec![],
            }],
            shared_data: vec![],
        };

        let err = installer.add("gdal", Some(descriptor)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackageError>(),
            Some(PackageError::InvalidPattern { .. })
        ));
        assert!(runner.calls.lock().unwrap().is_empty());
        assert!(store.packages().is_empty());
    }

    #[tokio::test]
    async fn test_install_of_layout_only_platform_fails() {
        let (_temp_dir, ctx, mut store) = setup(Platform::LinuxArm64);
        let runner = ListingRunner::new("[]");
        let engine = PruneEngine::new();
        let metrics = Metrics::new();
        let installer = PackageInstaller::new(&ctx, &runner, &mut store, &engine, &metrics);

        let err = installer.install(Platform::AndroidArm64).await.unwrap_err();
        assert!(err.downcast_ref::<crate::services::platform::PlatformError>().is_some());
    }

    #[test]
    fn test_tree_shake_requires_install_root() {
        let (_temp_dir, ctx, mut store) = setup(Platform::MacX64);
        let runner = ListingRunner::new("[]");
        let engine = PruneEngine::new();
        let metrics = Metrics::new();
        let installer = PackageInstaller::new(&ctx, &runner, &mut store, &engine, &metrics);

        assert!(installer.tree_shake(Platform::MacX64).is_err());
    }

    #[tokio::test]
    async fn test_resolver_info() {
        struct InfoRunner;
        impl ToolRunner for InfoRunner {
            async fn run(&self, _program: &Utf8Path, args: &[String]) -> Result<ToolOutput> {
                assert_eq!(args, ["info", "--json"]);
                Ok(ToolOutput {
                    stdout: r#"{"platform":"osx-arm64","version":"0.40.0"}"#.to_string(),
                    ..ToolOutput::default()
                })
            }
        }

        let (_temp_dir, ctx, mut store) = setup(Platform::MacArm64);
        let engine = PruneEngine::new();
        let metrics = Metrics::new();
        let installer = PackageInstaller::new(&ctx, &InfoRunner, &mut store, &engine, &metrics);

        let info = installer.resolver_info().await.unwrap();
        assert_eq!(info.version.as_deref(), Some("0.40.0"));
    }
}
