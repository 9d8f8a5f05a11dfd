//! Data models for conda-provision.
//!
//! This module contains the core data structures used throughout the crate:
//! - [`Platform`] / [`InstallLayout`]: which platform is provisioned and where its files live
//! - [`Settings`]: application settings loaded from `conda-provision.yaml`
//! - [`ProvisioningContext`]: the per-run bundle of platform, paths and targets
//! - [`PackageConfig`]: per-package clean rules and shared data, persisted as `.config.json`
//! - [`InstalledItem`] / [`ResolverInfo`]: read-only views of the resolver's JSON output
//!
//! # Architecture Note
//!
//! The models carry no behavior beyond derivations (layouts, paths, upserts). Anything that
//! touches the filesystem or spawns a process lives in [`crate::services`].

pub mod config;
pub mod context;
pub mod package;
pub mod platform;

pub use config::Settings;
pub use context::ProvisioningContext;
pub use package::{
    CleanRule, InstalledItem, PackageConfig, PackageDescriptor, PackageError, ResolverInfo,
};
pub use platform::{InstallLayout, OsFamily, Platform};
