//! Fakes shared by the integration tests: a resolver that fabricates files instead of
//! solving anything, and a downloader that writes a placeholder binary.

#![allow(dead_code)]

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use conda_provision::models::{Platform, ProvisioningContext, Settings};
use conda_provision::services::{Fetcher, ToolError, ToolOutput, ToolRunner};
use std::fs;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Resolver stand-in.
///
/// `init` writes the manifest, `exec` (install) calls `populate` with the prefix, `list`
/// answers with `listing`. Every call is recorded. Calls through an absolute path fail
/// like a shell would when that file does not exist.
pub struct FakeResolver {
    pub calls: Mutex<Vec<Vec<String>>>,
    pub populate: fn(&Utf8Path),
    pub listing: String,
}

impl FakeResolver {
    pub fn new(populate: fn(&Utf8Path)) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            populate,
            listing: String::new(),
        }
    }

    pub fn with_listing(mut self, listing: &str) -> Self {
        self.listing = listing.to_string();
        self
    }

    pub fn calls_to(&self, subcommand: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|args| args.first().map(String::as_str) == Some(subcommand))
            .count()
    }
}

impl ToolRunner for FakeResolver {
    async fn run(&self, program: &Utf8Path, args: &[String]) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push(args.to_vec());

        if program.is_absolute() && !program.is_file() {
            return Err(ToolError::Failed {
                exit_code: 127,
                stderr: format!("{}: not found", program),
            }
            .into());
        }

        let last = args.last().map(Utf8PathBuf::from);
        match (args.first().map(String::as_str), last) {
            (Some("init"), Some(root)) => fs::write(root.join("pixi.toml"), "[workspace]\n")?,
            (Some("exec"), Some(prefix)) => {
                fs::create_dir_all(&prefix)?;
                (self.populate)(&prefix);
            }
            (Some("list"), _) => {
                return Ok(ToolOutput {
                    stdout: self.listing.clone(),
                    ..ToolOutput::default()
                });
            }
            _ => {}
        }

        Ok(ToolOutput::default())
    }
}

/// Writes a placeholder file and counts downloads.
#[derive(Default)]
pub struct FakeFetcher {
    pub downloads: AtomicUsize,
}

impl FakeFetcher {
    pub fn count(&self) -> usize {
        self.downloads.load(Ordering::Relaxed)
    }
}

impl Fetcher for FakeFetcher {
    async fn fetch(&self, _url: &str, dest: &Utf8Path) -> Result<()> {
        self.downloads.fetch_add(1, Ordering::Relaxed);
        fs::write(dest, "#!/bin/sh\n")?;
        Ok(())
    }
}

pub fn populate_nothing(_prefix: &Utf8Path) {}

/// Write `contents` at `root/relative`, creating parent directories.
pub fn touch(root: &Utf8Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// Temp project with the asset directory inside it.
pub fn project(host: Platform, target: Platform) -> (TempDir, ProvisioningContext) {
    let temp_dir = TempDir::new().unwrap();
    let base = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    let settings = Settings {
        project_dir: base.join("Assets"),
        asset_dir: base.join("Assets/StreamingAssets"),
        ..Settings::default()
    };
    (temp_dir, ProvisioningContext::new(&settings, host, target))
}

/// Sorted names of the entries directly inside `dir`.
pub fn entries(dir: &Utf8Path) -> Vec<String> {
    let mut names: Vec<String> = dir
        .read_dir_utf8()
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string())
        .collect();
    names.sort();
    names
}
