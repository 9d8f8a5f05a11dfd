//! Rule-driven pruning of an installed environment.
//!
//! # Retention policy
//!
//! Pruning is **default-delete**. For every immediate entry of the directory being cleaned:
//!
//! | entry     | matches an exclude | matches an include | result |
//! |-----------|--------------------|--------------------|--------|
//! | file      | no                 | (any)              | delete |
//! | file      | yes                | no                 | keep   |
//! | file      | yes                | yes                | delete |
//! | directory | no                 | (ignored)          | delete whole subtree |
//! | directory | yes                | (ignored)          | keep whole subtree |
//!
//! "Exclude" therefore means *excluded from deletion*, and an include pulls a file back
//! into the deletion set. Patterns are unanchored regex searches on the entry name.
//! Kept directories are not descended into; prune a deeper level by cleaning that
//! directory explicitly.
//!
//! Deletion is best-effort: a failure on one entry becomes a [`PruneWarning`] in the
//! returned [`PruneReport`] and the remaining entries are still processed. The directory
//! being cleaned is never removed itself.

use crate::models::{CleanRule, InstallLayout, OsFamily, PackageDescriptor};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fs;
use thiserror::Error;

/// A non-fatal problem met while pruning.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PruneWarning {
    #[error("Failed to delete {path}: {reason}")]
    DeleteFailed { path: Utf8PathBuf, reason: String },

    #[error("Failed to read {path}: {reason}")]
    ReadFailed { path: Utf8PathBuf, reason: String },

    #[error("Attempted to clean invalid directory {path}")]
    MissingDirectory { path: Utf8PathBuf },

    #[error("Invalid clean pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Clean path component '{component}' escapes the install root")]
    InvalidPath { component: String },
}

/// What a prune pass removed and what it had to skip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub deleted: Vec<Utf8PathBuf>,
    pub warnings: Vec<PruneWarning>,
}

impl PruneReport {
    pub fn extend(&mut self, other: PruneReport) {
        self.deleted.extend(other.deleted);
        self.warnings.extend(other.warnings);
    }

    fn warn(&mut self, warning: PruneWarning) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Delete,
}

/// Compiled exclude/include patterns for one directory.
#[derive(Debug, Clone)]
pub struct RuleSet {
    excludes: Vec<Regex>,
    includes: Vec<Regex>,
}

impl RuleSet {
    /// Compile patterns; on failure returns the offending pattern with the regex error.
    pub fn from_patterns<E, I>(excludes: &[E], includes: &[I]) -> Result<Self, PruneWarning>
    where
        E: AsRef<str>,
        I: AsRef<str>,
    {
        fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>, PruneWarning> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p.as_ref()).map_err(|e| PruneWarning::InvalidPattern {
                        pattern: p.as_ref().to_string(),
                        reason: e.to_string(),
                    })
                })
                .collect()
        }

        Ok(Self {
            excludes: compile(excludes)?,
            includes: compile(includes)?,
        })
    }

    /// Apply the retention policy described in the module docs.
    pub fn decide(&self, name: &str, kind: EntryKind) -> Verdict {
        if !self.excludes.iter().any(|rx| rx.is_match(name)) {
            return Verdict::Delete;
        }

        match kind {
            EntryKind::Directory => Verdict::Keep,
            EntryKind::File if self.includes.iter().any(|rx| rx.is_match(name)) => Verdict::Delete,
            EntryKind::File => Verdict::Keep,
        }
    }
}

/// Directory of an install layout that a generic step targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutDir {
    Root,
    Library,
    Bin,
}

impl LayoutDir {
    pub fn path(self, layout: &InstallLayout) -> &Utf8Path {
        match self {
            LayoutDir::Root => &layout.root,
            LayoutDir::Library => &layout.library,
            LayoutDir::Bin => &layout.bin,
        }
    }
}

/// One step of the built-in per-OS cleanup.
#[derive(Debug, Clone)]
pub struct GenericStep {
    pub dir: LayoutDir,
    pub rules: RuleSet,
}

/// Pruning service holding the compiled per-OS cleanup steps.
pub struct PruneEngine {
    windows_steps: Vec<GenericStep>,
    unix_steps: Vec<GenericStep>,
}

impl PruneEngine {
    /// Compile the built-in per-OS steps.
    ///
    /// The patterns below are constants; `test_builtin_rules_compile` keeps them valid.
    pub fn new() -> Self {
        fn step(dir: LayoutDir, excludes: &[&str], includes: &[&str]) -> GenericStep {
            GenericStep {
                dir,
                rules: RuleSet::from_patterns(excludes, includes)
                    .expect("Invalid built-in prune rule"),
            }
        }

        Self {
            windows_steps: vec![
                step(
                    LayoutDir::Root,
                    &[r"^\..*", r"^conda-meta$", r"\.meta$", r"^Library$", r"\.txt$"],
                    &[],
                ),
                step(LayoutDir::Library, &[r"^bin$"], &[]),
                step(
                    LayoutDir::Bin,
                    &[r"\.dll$", r"\.meta$"],
                    &[r"^api-", r"^vcr", r"^msvcp"],
                ),
            ],
            unix_steps: vec![
                step(
                    LayoutDir::Root,
                    &[r"^\..*", r"^conda-meta$", r"\.meta$", r"^bin$", r"^lib$"],
                    &[],
                ),
                step(
                    LayoutDir::Library,
                    &[r"\.lib$", r"\.dylib$", r"\.so$", r"\.meta$"],
                    &[],
                ),
            ],
        }
    }

    pub fn generic_steps(&self, family: OsFamily) -> &[GenericStep] {
        match family {
            OsFamily::Windows => &self.windows_steps,
            OsFamily::Unix => &self.unix_steps,
        }
    }

    /// Prune the immediate entries of `dir` according to `rules`.
    pub fn clean(&self, dir: &Utf8Path, rules: &RuleSet) -> PruneReport {
        let mut report = PruneReport::default();

        if !dir.is_dir() {
            report.warn(PruneWarning::MissingDirectory {
                path: dir.to_path_buf(),
            });
            return report;
        }

        let read_dir = match dir.read_dir_utf8() {
            Ok(read_dir) => read_dir,
            Err(e) => {
                report.warn(PruneWarning::ReadFailed {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                });
                return report;
            }
        };

        // Collect and sort so the pass is independent of directory order
        let mut entries = Vec::new();
        for entry in read_dir {
            match entry {
                Ok(entry) => entries.push(entry),
                Err(e) => report.warn(PruneWarning::ReadFailed {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                }),
            }
        }
        entries.sort_by(|a, b| a.file_name().cmp(b.file_name()));

        for entry in entries {
            let path = entry.path().to_path_buf();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    report.warn(PruneWarning::ReadFailed {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            // Symlinks count as files: the link is removed, its target is never followed.
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };

            if rules.decide(entry.file_name(), kind) == Verdict::Keep {
                continue;
            }

            // Best-effort delete; failures become warnings
            let result = match kind {
                EntryKind::Directory => fs::remove_dir_all(&path),
                EntryKind::File => fs::remove_file(&path),
            };

            match result {
                Ok(()) => {
                    tracing::debug!("Deleted {:?}: {}", kind, path);
                    report.deleted.push(path);
                }
                Err(e) => report.warn(PruneWarning::DeleteFailed {
                    path,
                    reason: e.to_string(),
                }),
            }
        }

        report
    }

    /// Run the built-in cleanup for the layout's OS family.
    ///
    /// The install root is always cleaned; deeper steps only run when their directory
    /// survived the earlier ones.
    pub fn clean_generic(&self, layout: &InstallLayout) -> PruneReport {
        let mut report = PruneReport::default();

        for step in self.generic_steps(layout.platform.os_family()) {
            let dir = step.dir.path(layout);
            if step.dir != LayoutDir::Root && !dir.is_dir() {
                continue;
            }
            report.extend(self.clean(dir, &step.rules));
        }

        tracing::info!(
            "Generic cleanup of {} removed {} entries",
            layout.root,
            report.deleted.len()
        );
        report
    }

    /// Execute one config-declared clean rule against `layout`.
    pub fn apply_rule(&self, layout: &InstallLayout, rule: &CleanRule) -> PruneReport {
        let mut report = PruneReport::default();

        let path = match resolve_rule_path(layout, &rule.path) {
            Ok(path) => path,
            Err(warning) => {
                report.warn(warning);
                return report;
            }
        };

        let rules = match RuleSet::from_patterns(&rule.excludes, &rule.includes) {
            Ok(rules) => rules,
            Err(warning) => {
                report.warn(warning);
                return report;
            }
        };

        if !path.is_dir() {
            tracing::info!("Attempted to clean invalid directory {}", path);
            report.warnings.push(PruneWarning::MissingDirectory { path });
            return report;
        }

        report.extend(self.clean(&path, &rules));
        report
    }

    /// Execute every clean rule declared by `packages`.
    pub fn apply_package_rules(
        &self,
        layout: &InstallLayout,
        packages: &[PackageDescriptor],
    ) -> PruneReport {
        let mut report = PruneReport::default();
        for package in packages {
            for rule in &package.cleans {
                tracing::debug!("Applying clean rule of {}: {:?}", package.name, rule.path);
                report.extend(self.apply_rule(layout, rule));
            }
        }
        report
    }
}

impl Default for PruneEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn clean-rule path components into a concrete directory.
///
/// Symbolic tokens (`conda_library`, `conda_bin`, `conda_shared`) replace the path built so
/// far; any other component is appended. Components before the first token are relative
/// to the install root. Absolute and `..` components are rejected.
pub fn resolve_rule_path(
    layout: &InstallLayout,
    components: &[String],
) -> Result<Utf8PathBuf, PruneWarning> {
    let mut path = layout.root.clone();

    for component in components {
        if let Some(resolved) = layout.resolve_token(component) {
            path = resolved.to_path_buf();
            continue;
        }

        let literal = Utf8Path::new(component);
        let escapes = literal.components().any(|c| {
            matches!(
                c,
                Utf8Component::ParentDir | Utf8Component::RootDir | Utf8Component::Prefix(_)
            )
        });
        if escapes {
            return Err(PruneWarning::InvalidPath {
                component: component.clone(),
            });
        }

        path.push(literal);
    }

    Ok(path)
}
