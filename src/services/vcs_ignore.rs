use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;

/// Entries that keep the resolver binary and the plugin output out of version control.
pub const IGNORE_ENTRIES: [&str; 6] = [
    "Plugins/*",
    "Plugins.meta",
    "pixi",
    "pixi.meta",
    "pixi.exe",
    "pixi.exe.meta",
];

/// Add each of `entries` to the ignore file at `path` unless already present.
///
/// Lines are compared trimmed. The file is created empty if missing and rewritten only
/// when something was added; a rewrite drops blank lines. Returns the entries added.
pub fn update_ignore_file(path: &Utf8Path, entries: &[&str]) -> Result<Vec<String>> {
    if !path.exists() {
        tracing::info!("{} not found, creating it", path);
        fs::write(path, "").with_context(|| format!("Failed to create {}", path))?;
    }

    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    let mut lines: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    let mut added = Vec::new();
    for entry in entries {
        if lines.iter().any(|l| l == entry) {
            tracing::debug!("Already present: {}", entry);
        } else {
            lines.push(entry.to_string());
            added.push(entry.to_string());
            tracing::debug!("Added: {}", entry);
        }
    }

    if added.is_empty() {
        tracing::debug!("{} already lists every entry", path);
        return Ok(added);
    }

    let mut rewritten = lines.join("\n");
    rewritten.push('\n');
    fs::write(path, rewritten).with_context(|| format!("Failed to write {}", path))?;
    tracing::info!("Updated {} ({} entries added)", path, added.len());

    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn ignore_path(temp_dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(temp_dir.path().join(".gitignore")).unwrap()
    }

    #[test]
    fn test_creates_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = ignore_path(&temp_dir);

        let added = update_ignore_file(&path, &IGNORE_ENTRIES).unwrap();
        assert_eq!(added.len(), IGNORE_ENTRIES.len());

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().collect::<Vec<_>>(), IGNORE_ENTRIES.to_vec());
    }

    #[test]
    fn test_set_union_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = ignore_path(&temp_dir);
        fs::write(&path, "Library/\n\n  pixi  \n*.log\n").unwrap();

        let added = update_ignore_file(&path, &IGNORE_ENTRIES).unwrap();
        assert!(!added.contains(&"pixi".to_string()));
        assert_eq!(added.len(), IGNORE_ENTRIES.len() - 1);

        let after_first = fs::read_to_string(&path).unwrap();
        assert!(after_first.starts_with("Library/\npixi\n*.log\nPlugins/*\n"));

        assert!(update_ignore_file(&path, &IGNORE_ENTRIES).unwrap().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), after_first);
    }
}
