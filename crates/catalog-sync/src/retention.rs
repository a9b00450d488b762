//! Retention of exported catalogs and downloaded backups
//!
//! Only the filesystem is consulted. Callers prune after a new export validated, and
//! the catalog reload tolerates a file disappearing under it. In-progress files carry
//! a `.part` suffix and never match a retained extension.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::error::Result;
use crate::types::CATALOG_EXTENSION;

/// A retained file and its modification time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Catalog files directly under `directory`, most recently modified first
pub fn list_catalog_files(directory: &Path) -> Result<Vec<FileEntry>> {
    list_files(directory, CATALOG_EXTENSION)
}

/// Files with `extension` (leading dot optional) directly under `directory`, most
/// recently modified first
///
/// A missing directory yields an empty list.
pub fn list_files(directory: &Path, extension: &str) -> Result<Vec<FileEntry>> {
    let extension = extension.trim_start_matches('.');
    if !directory.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(directory).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            // Removed between readdir and stat
            Err(e) if e.io_error().map(|io| io.kind()) == Some(std::io::ErrorKind::NotFound) => continue,
            Err(e) => return Err(std::io::Error::from(e).into()),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if !matches {
            continue;
        }
        let modified = match entry.metadata().map(|m| m.modified()) {
            Ok(Ok(modified)) => modified,
            Ok(Err(e)) => return Err(e.into()),
            Err(e) if e.io_error().map(|io| io.kind()) == Some(std::io::ErrorKind::NotFound) => continue,
            Err(e) => return Err(std::io::Error::from(e).into()),
        };
        files.push(FileEntry {
            path: entry.into_path(),
            modified,
        });
    }

    files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path)));
    Ok(files)
}

/// Delete every catalog file beyond the `keep_count` most recent
///
/// Returns the deleted paths.
pub fn cleanup(directory: &Path, keep_count: usize) -> Result<Vec<PathBuf>> {
    prune(directory, CATALOG_EXTENSION, keep_count)
}

/// Delete every file with `extension` beyond the `keep_count` most recent
pub fn prune(directory: &Path, extension: &str, keep_count: usize) -> Result<Vec<PathBuf>> {
    let files = list_files(directory, extension)?;
    let mut removed = Vec::new();

    for old in files.into_iter().skip(keep_count) {
        match std::fs::remove_file(&old.path) {
            Ok(()) => {
                tracing::info!("Removed old file: {}", old.path.display());
                removed.push(old.path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Already gone: {}", old.path.display());
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_aged;

    #[test]
    fn test_cleanup_keeps_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..8 {
            // file_0 is the newest
            write_aged(dir.path(), &format!("file_{}.csv", i), "x", i * 60);
        }

        let removed = cleanup(dir.path(), 5).unwrap();

        assert_eq!(removed.len(), 3);
        let mut left: Vec<String> = list_catalog_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["file_0.csv", "file_1.csv", "file_2.csv", "file_3.csv", "file_4.csv"]);
    }

    #[test]
    fn test_cleanup_under_limit_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            write_aged(dir.path(), &format!("file_{}.csv", i), "x", i * 60);
        }

        assert!(cleanup(dir.path(), 5).unwrap().is_empty());
        assert_eq!(list_catalog_files(dir.path()).unwrap().len(), 3);
    }

    #[test]
    fn test_cleanup_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        write_aged(dir.path(), "new.csv", "x", 0);
        write_aged(dir.path(), "old.csv", "x", 600);
        write_aged(dir.path(), "notes.txt", "x", 1200);
        std::fs::create_dir(dir.path().join("archive.csv")).unwrap();

        let removed = cleanup(dir.path(), 1).unwrap();

        assert_eq!(removed, vec![dir.path().join("old.csv")]);
        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("archive.csv").is_dir());
    }

    #[test]
    fn test_prune_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..4 {
            write_aged(dir.path(), &format!("backup_{}.i5bu", i), "x", i * 60);
        }
        write_aged(dir.path(), "backup_9.i5bu.part", "x", 3600);
        write_aged(dir.path(), "catalog.csv", "x", 3600);

        let removed = prune(dir.path(), ".i5bu", 2).unwrap();

        assert_eq!(
            removed,
            vec![dir.path().join("backup_2.i5bu"), dir.path().join("backup_3.i5bu")]
        );
        assert!(dir.path().join("backup_9.i5bu.part").exists());
        assert!(dir.path().join("catalog.csv").exists());
        assert_eq!(list_files(dir.path(), "i5bu").unwrap().len(), 2);
    }

    #[test]
    fn test_part_files_are_not_catalogs() {
        let dir = tempfile::tempdir().unwrap();
        write_aged(dir.path(), "01012025-0800.csv.part", "x", 0);
        assert!(list_catalog_files(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("exports");
        assert!(list_catalog_files(&missing).unwrap().is_empty());
        assert!(cleanup(&missing, 5).unwrap().is_empty());
    }
}
