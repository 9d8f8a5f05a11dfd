// conda-provision - platform-specific conda environments for application plugin trees
//
// This is the library crate containing the provisioning logic and data structures.
// The binary crate (main.rs) provides the command-line entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod provisioner;
pub mod services;

// Re-export commonly used types for convenience
pub use config::{ConfigManager, ConfigStore};
pub use metrics::Metrics;
pub use models::{
    CleanRule, InstallLayout, PackageConfig, PackageDescriptor, Platform, ProvisioningContext,
    Settings,
};
pub use provisioner::Provisioner;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
