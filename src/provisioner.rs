use crate::config::ConfigStore;
use crate::metrics::Metrics;
use crate::models::{
    InstalledItem, PackageDescriptor, Platform, ProvisioningContext, ResolverInfo, Settings,
};
use crate::services::{
    platform_status, uninstall, BootstrapManager, BootstrapOutcome, BootstrapStatus, Fetcher,
    HttpFetcher, InstallStatus, PackageInstaller, PruneEngine, Resolution, ShellMode,
    ToolInvoker, ToolRunner, TreeShakeReport,
};
use anyhow::Result;
use indexmap::IndexMap;
use std::sync::Arc;

/// One provisioning root with everything needed to operate on it.
///
/// Owns the context, the process runner, the downloader and the package sidecar.
/// Operations run one at a time; `add` and `install` bootstrap first when needed.
pub struct Provisioner<R, F> {
    ctx: ProvisioningContext,
    runner: R,
    fetcher: F,
    store: ConfigStore,
    engine: PruneEngine,
    metrics: Arc<Metrics>,
}

impl Provisioner<ToolInvoker, HttpFetcher> {
    /// Wire the real process runner and HTTP downloader from settings.
    pub fn from_settings(
        settings: &Settings,
        resolution: Resolution,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let ctx = ProvisioningContext::new(settings, resolution.host, resolution.target);
        let shell = if settings.use_host_shell {
            ShellMode::HostShell
        } else {
            ShellMode::Direct
        };
        let runner = ToolInvoker::new(
            ctx.host,
            ctx.conda_path.clone(),
            settings.tool_timeout(),
            shell,
            metrics.clone(),
        );
        let fetcher = HttpFetcher::new(settings.download_timeout())?;

        Self::new(ctx, runner, fetcher, metrics)
    }
}

impl<R: ToolRunner, F: Fetcher> Provisioner<R, F> {
    /// Load the package sidecar for `ctx` and take ownership of the collaborators.
    pub fn new(
        ctx: ProvisioningContext,
        runner: R,
        fetcher: F,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let store = ConfigStore::load(ctx.config_path())?;
        Ok(Self {
            ctx,
            runner,
            fetcher,
            store,
            engine: PruneEngine::new(),
            metrics,
        })
    }

    pub fn context(&self) -> &ProvisioningContext {
        &self.ctx
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn bootstrapper(&self) -> BootstrapManager<'_, R, F> {
        BootstrapManager::new(&self.ctx, &self.runner, &self.fetcher, &self.metrics)
    }

    fn installer(&mut self) -> PackageInstaller<'_, R> {
        PackageInstaller::new(
            &self.ctx,
            &self.runner,
            &mut self.store,
            &self.engine,
            &self.metrics,
        )
    }

    pub fn bootstrap_status(&self) -> BootstrapStatus {
        self.bootstrapper().status()
    }

    pub async fn bootstrap(&self) -> Result<BootstrapOutcome> {
        self.bootstrapper().run().await
    }

    pub async fn add(
        &mut self,
        install_spec: &str,
        descriptor: Option<PackageDescriptor>,
    ) -> Result<TreeShakeReport> {
        self.bootstrap().await?;
        self.installer().add(install_spec, descriptor).await
    }

    pub async fn install(&mut self, target: Platform) -> Result<TreeShakeReport> {
        self.bootstrap().await?;
        self.installer().install(target).await
    }

    /// Re-run staging and pruning on an existing install without calling the resolver.
    pub fn tree_shake(&mut self, target: Platform) -> Result<TreeShakeReport> {
        self.installer().tree_shake(target)
    }

    pub async fn info(&mut self) -> Result<Vec<InstalledItem>> {
        self.installer().info().await
    }

    pub async fn resolver_info(&mut self) -> Result<ResolverInfo> {
        self.installer().resolver_info().await
    }

    pub async fn is_installed(&mut self, name: &str, version: &str) -> bool {
        self.installer().is_installed(name, version).await
    }

    pub fn platform_status(&self) -> IndexMap<Platform, InstallStatus> {
        platform_status(&self.ctx)
    }

    pub fn uninstall(&self, platform: Platform) -> Result<bool> {
        uninstall(&self.ctx, platform)
    }
}
