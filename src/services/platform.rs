//! Host and target platform resolution.
//!
//! The host platform comes from the running OS/CPU and decides which resolver binary is
//! downloaded and which shell wraps it. The target platform defaults to the host but can be
//! redirected with an override variable (`CONDA_ARCH_OVERRIDE=osx-arm64`), which allows
//! provisioning another platform's environment from this machine.

use crate::models::Platform;
use thiserror::Error;

/// Errors raised when there is no platform to provision for.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Unsupported host platform: os={os}, arch={arch}")]
    UnsupportedHost { os: String, arch: String },

    #[error("Platform {0} has no resolver platform identifier")]
    NoResolverPlatform(Platform),
}

/// Read access to the facts platform resolution depends on.
#[cfg_attr(test, mockall::automock)]
pub trait HostEnvironment {
    /// Operating system name, in `std::env::consts::OS` spelling.
    fn os(&self) -> String;

    /// CPU architecture, in `std::env::consts::ARCH` spelling.
    fn arch(&self) -> String;

    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl HostEnvironment for SystemHost {
    fn os(&self) -> String {
        std::env::consts::OS.to_string()
    }

    fn arch(&self) -> String {
        std::env::consts::ARCH.to_string()
    }

    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Outcome of platform resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub host: Platform,
    pub target: Platform,
}

/// Map an OS/CPU pair to the host platform running the resolver.
pub fn host_platform(os: &str, arch: &str) -> Result<Platform, PlatformError> {
    match (os, arch) {
        ("windows", "x86_64") => Ok(Platform::WindowsX64),
        ("macos", "x86_64") => Ok(Platform::MacX64),
        ("macos", "aarch64") => Ok(Platform::MacArm64),
        ("linux", "x86_64") => Ok(Platform::LinuxX64),
        ("linux", "aarch64") => Ok(Platform::LinuxArm64),
        _ => Err(PlatformError::UnsupportedHost {
            os: os.to_string(),
            arch: arch.to_string(),
        }),
    }
}

/// Resolve host and target platforms.
///
/// An override value naming one of the resolver platforms replaces the target; any other
/// non-empty value is ignored with a warning.
pub fn resolve<H: HostEnvironment>(
    env: &H,
    override_var: &str,
) -> Result<Resolution, PlatformError> {
    let host = host_platform(&env.os(), &env.arch())?;

    let target = match env.var(override_var) {
        Some(value) if !value.trim().is_empty() => {
            match Platform::from_resolver_id(value.trim()) {
                Some(target) => target,
                None => {
                    tracing::warn!(
                        "Ignoring unrecognized {}='{}', targeting host platform {}",
                        override_var,
                        value,
                        host
                    );
                    host
                }
            }
        }
        _ => host,
    };

    tracing::info!("Platform: {}", host);
    if target != host {
        tracing::info!("Target: {}", target);
    }

    Ok(Resolution { host, target })
}
