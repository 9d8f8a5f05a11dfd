use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A provisioning platform: the OS/CPU pair an environment is materialized for.
///
/// The same enum describes both the *host* (which resolver binary and shell to run)
/// and the *target* (whose files land in the plugin tree). The two only differ when an
/// architecture override is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "win-64")]
    WindowsX64,
    #[serde(rename = "linux-64")]
    LinuxX64,
    #[serde(rename = "osx-64")]
    MacX64,
    #[serde(rename = "osx-arm64")]
    MacArm64,
    #[serde(rename = "linux-aarch64")]
    LinuxArm64,
    #[serde(rename = "android-arm64")]
    AndroidArm64,
}

/// Operating system family, which decides the sub-layout of an install root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    Unix,
}

/// Platforms the resolver knows how to solve for, in manifest order.
pub const RESOLVER_PLATFORMS: [Platform; 5] = [
    Platform::WindowsX64,
    Platform::MacX64,
    Platform::MacArm64,
    Platform::LinuxX64,
    Platform::LinuxArm64,
];

/// Every platform with an install layout.
pub const ALL_PLATFORMS: [Platform; 6] = [
    Platform::WindowsX64,
    Platform::LinuxX64,
    Platform::MacX64,
    Platform::MacArm64,
    Platform::LinuxArm64,
    Platform::AndroidArm64,
];

impl Platform {
    /// The resolver's `--platform` identifier, if the resolver can target this platform.
    pub fn resolver_id(self) -> Option<&'static str> {
        match self {
            Platform::WindowsX64 => Some("win-64"),
            Platform::MacX64 => Some("osx-64"),
            Platform::LinuxX64 => Some("linux-64"),
            Platform::MacArm64 => Some("osx-arm64"),
            Platform::LinuxArm64 => Some("linux-aarch64"),
            Platform::AndroidArm64 => None,
        }
    }

    /// Parse a resolver identifier (`win-64`, `osx-arm64`, ...). Only the five
    /// resolver platforms are recognized.
    pub fn from_resolver_id(id: &str) -> Option<Platform> {
        RESOLVER_PLATFORMS
            .into_iter()
            .find(|p| p.resolver_id() == Some(id))
    }

    pub fn os_family(self) -> OsFamily {
        match self {
            Platform::WindowsX64 => OsFamily::Windows,
            _ => OsFamily::Unix,
        }
    }

    /// Directory name for the OS level of the plugin tree.
    pub fn os_dir(self) -> &'static str {
        match self {
            Platform::WindowsX64 => "Windows",
            Platform::MacX64 | Platform::MacArm64 => "OSX",
            Platform::LinuxX64 | Platform::LinuxArm64 => "Linux",
            Platform::AndroidArm64 => "Android",
        }
    }

    /// Directory name for the architecture level of the plugin tree.
    pub fn arch_dir(self) -> &'static str {
        match self {
            Platform::WindowsX64 | Platform::MacX64 | Platform::LinuxX64 => "x64",
            Platform::MacArm64 | Platform::LinuxArm64 => "arm64",
            Platform::AndroidArm64 => "arm64-v8a",
        }
    }

    /// Compute the install layout of this platform beneath `plugin_path`.
    pub fn layout(self, plugin_path: &Utf8Path) -> InstallLayout {
        InstallLayout::new(self, plugin_path)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::WindowsX64 => "Windows_x64",
            Platform::LinuxX64 => "Linux_x64",
            Platform::MacX64 => "Mac_x64",
            Platform::MacArm64 => "Mac_Arm64",
            Platform::LinuxArm64 => "Linux_Arm64",
            Platform::AndroidArm64 => "Android_Arm64",
        };
        f.write_str(name)
    }
}

impl FromStr for Platform {
    type Err = String;

    /// Accepts either a resolver identifier (`osx-arm64`) or a display name (`Mac_Arm64`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(platform) = Platform::from_resolver_id(s) {
            return Ok(platform);
        }
        ALL_PLATFORMS
            .into_iter()
            .find(|p| p.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown platform '{}'", s))
    }
}

/// Directory layout of one platform's install root.
///
/// Computed once per platform and threaded through every path-dependent operation,
/// so the platform differences live here and nowhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    pub platform: Platform,
    /// `<plugins>/<OSName>/<Arch>`
    pub root: Utf8PathBuf,
    pub library: Utf8PathBuf,
    pub bin: Utf8PathBuf,
    pub share: Utf8PathBuf,
}

impl InstallLayout {
    pub fn new(platform: Platform, plugin_path: &Utf8Path) -> Self {
        let root = plugin_path.join(platform.os_dir()).join(platform.arch_dir());
        let (library, bin, share) = match platform.os_family() {
            OsFamily::Windows => {
                let library = root.join("Library");
                let bin = library.join("bin");
                let share = library.join("share");
                (library, bin, share)
            }
            OsFamily::Unix => (root.join("lib"), root.join("bin"), root.join("share")),
        };

        Self {
            platform,
            root,
            library,
            bin,
            share,
        }
    }

    /// Resolve a symbolic clean-rule token (`conda_library`, `conda_bin`, `conda_shared`).
    pub fn resolve_token(&self, token: &str) -> Option<&Utf8Path> {
        match token {
            "conda_library" => Some(&self.library),
            "conda_bin" => Some(&self.bin),
            "conda_shared" => Some(&self.share),
            _ => None,
        }
    }
}
