use crate::models::config::Settings;
use crate::models::platform::{InstallLayout, OsFamily, Platform};
use camino::{Utf8Path, Utf8PathBuf};

/// Resolver manifest whose presence marks an initialized environment.
pub const MANIFEST_FILE: &str = "pixi.toml";

/// Package sidecar file name.
pub const CONFIG_FILE: &str = ".config.json";

/// VCS ignore file maintained beside the manifest.
pub const IGNORE_FILE: &str = ".gitignore";

/// Plugin output tree beneath the provisioning root.
pub const PLUGINS_DIR: &str = "Plugins";

const RELEASE_BASE_URL: &str = "https://github.com/prefix-dev/pixi/releases/latest/download";

/// Everything one provisioning run needs to know about where things live.
///
/// Built once per run and passed by reference to every component, so several
/// contexts (different project dirs, different targets) can coexist in one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningContext {
    /// Platform the process runs on; picks the resolver binary and shell.
    pub host: Platform,

    /// Platform whose environment is materialized by default.
    pub target: Platform,

    /// Provisioning root; working directory of every resolver call.
    pub conda_path: Utf8PathBuf,

    pub plugin_path: Utf8PathBuf,

    pub binary_path: Utf8PathBuf,

    pub download_url: String,

    /// Application runtime asset directory that receives shared data.
    pub asset_path: Utf8PathBuf,

    /// Platforms registered in the manifest.
    pub targets: Vec<Platform>,
}

impl ProvisioningContext {
    pub fn new(settings: &Settings, host: Platform, target: Platform) -> Self {
        let conda_path = settings.conda_path();
        let plugin_path = conda_path.join(PLUGINS_DIR);
        let binary_path = conda_path.join(resolver_binary_name(host));
        let download_url = settings
            .download_urls
            .get(&host)
            .cloned()
            .unwrap_or_else(|| resolver_download_url(host));

        Self {
            host,
            target,
            conda_path,
            plugin_path,
            binary_path,
            download_url,
            asset_path: settings.asset_dir.clone(),
            targets: settings.targets.clone(),
        }
    }

    pub fn layout(&self, platform: Platform) -> InstallLayout {
        platform.layout(&self.plugin_path)
    }

    pub fn target_layout(&self) -> InstallLayout {
        self.layout(self.target)
    }

    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.conda_path.join(MANIFEST_FILE)
    }

    pub fn config_path(&self) -> Utf8PathBuf {
        self.conda_path.join(CONFIG_FILE)
    }

    pub fn ignore_path(&self) -> Utf8PathBuf {
        self.conda_path.join(IGNORE_FILE)
    }

    pub fn is_cross_target(&self) -> bool {
        self.host != self.target
    }

    pub fn binary(&self) -> &Utf8Path {
        &self.binary_path
    }
}

/// File name of the resolver binary on `host`.
pub fn resolver_binary_name(host: Platform) -> &'static str {
    match host.os_family() {
        OsFamily::Windows => "pixi.exe",
        OsFamily::Unix => "pixi",
    }
}

/// Release asset URL of the resolver build that runs on `host`.
pub fn resolver_download_url(host: Platform) -> String {
    let asset = match host {
        Platform::WindowsX64 => "pixi-x86_64-pc-windows-msvc.exe",
        Platform::MacX64 => "pixi-x86_64-apple-darwin",
        Platform::MacArm64 => "pixi-aarch64-apple-darwin",
        Platform::LinuxX64 => "pixi-x86_64-unknown-linux-musl",
        Platform::LinuxArm64 | Platform::AndroidArm64 => "pixi-aarch64-unknown-linux-musl",
    };
    format!("{}/{}", RELEASE_BASE_URL, asset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            project_dir: Utf8PathBuf::from("/proj/Assets"),
            ..Settings::default()
        }
    }

    #[test]
    fn test_paths_derive_from_settings() {
        let ctx = ProvisioningContext::new(&settings(), Platform::LinuxX64, Platform::LinuxX64);
        assert_eq!(ctx.conda_path, Utf8PathBuf::from("/proj/Assets/Conda"));
        assert_eq!(ctx.plugin_path, Utf8PathBuf::from("/proj/Assets/Conda/Plugins"));
        assert_eq!(ctx.binary_path, Utf8PathBuf::from("/proj/Assets/Conda/pixi"));
        assert_eq!(ctx.manifest_path(), Utf8PathBuf::from("/proj/Assets/Conda/pixi.toml"));
        assert_eq!(ctx.config_path(), Utf8PathBuf::from("/proj/Assets/Conda/.config.json"));
        assert!(!ctx.is_cross_target());
    }

    #[test]
    fn test_windows_host_uses_exe() {
        let ctx = ProvisioningContext::new(&settings(), Platform::WindowsX64, Platform::MacArm64);
        assert!(ctx.binary_path.as_str().ends_with("pixi.exe"));
        assert!(ctx.download_url.ends_with("pixi-x86_64-pc-windows-msvc.exe"));
        assert!(ctx.is_cross_target());
        assert_eq!(
            ctx.target_layout().root,
            Utf8PathBuf::from("/proj/Assets/Conda/Plugins/OSX/arm64")
        );
    }

    #[test]
    fn test_download_url_override() {
        let mut settings = settings();
        settings
            .download_urls
            .insert(Platform::MacArm64, "https://mirror.example/pixi".to_string());

        let ctx = ProvisioningContext::new(&settings, Platform::MacArm64, Platform::MacArm64);
        assert_eq!(ctx.download_url, "https://mirror.example/pixi");

        let other = ProvisioningContext::new(&settings, Platform::MacX64, Platform::MacX64);
        assert!(other.download_url.ends_with("pixi-x86_64-apple-darwin"));
    }
}
