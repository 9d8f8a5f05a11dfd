//! Services module - provisioning logic on top of the models.
//!
//! Everything here touches the filesystem or runs external processes. Nothing depends on
//! the CLI, so each service can be driven from tests with fake runners and temp dirs.
//!
//! # Components
//!
//! - [`platform`]: host detection and target override ([`resolve`])
//! - [`tool`]: process execution with a deadline ([`ToolInvoker`], [`ToolRunner`])
//! - [`resolver`]: argument vectors and JSON parsing for the resolver binary
//! - [`download`]: resolver binary download ([`HttpFetcher`], [`Fetcher`])
//! - [`bootstrap`]: binary + manifest readiness ([`BootstrapManager`])
//! - [`installer`]: add / install / tree-shake / listing ([`PackageInstaller`])
//! - [`prune`]: rule-driven deletion ([`PruneEngine`])
//! - [`staging`]: shared-data copy into the asset directory
//! - [`vcs_ignore`]: ignore-file maintenance
//! - [`status`]: per-platform install status and uninstall
//!
//! # Flow
//!
//! A provisioning run is strictly sequential:
//! 1. [`resolve`] host and target platforms
//! 2. [`BootstrapManager::run`] downloads the resolver and initializes the manifest if needed
//! 3. [`PackageInstaller::add`] / [`PackageInstaller::install`] call the resolver, then
//!    stage shared data and prune the install root

pub mod bootstrap;
pub mod download;
pub mod installer;
pub mod platform;
pub mod prune;
pub mod resolver;
pub mod staging;
pub mod status;
pub mod tool;
pub mod vcs_ignore;

pub use bootstrap::{BootstrapError, BootstrapManager, BootstrapOutcome, BootstrapStatus};
pub use download::{Fetcher, HttpFetcher};
pub use installer::{PackageInstaller, TreeShakeReport};
pub use platform::{resolve, HostEnvironment, PlatformError, Resolution, SystemHost};
pub use prune::{PruneEngine, PruneReport, PruneWarning};
pub use staging::{stage_shared_data, StagingReport};
pub use status::{platform_status, uninstall, InstallStatus};
pub use tool::{ShellMode, ToolError, ToolInvoker, ToolOutput, ToolRunner};
