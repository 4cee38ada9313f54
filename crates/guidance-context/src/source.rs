//! Filesystem access used by discovery.
//!
//! Everything that touches the disk goes through [`FileSource`], so tests
//! can inject faults such as handle exhaustion without a real filesystem.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Metadata needed for cache validation and size checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStamp {
    /// Last modification time.
    pub modified: SystemTime,
    /// Size in bytes.
    pub len: u64,
    /// Whether the path is a regular file (after following symlinks).
    pub is_file: bool,
}

/// One entry of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntryInfo {
    /// Full path of the entry.
    pub path: PathBuf,
    /// Final component, lossily converted.
    pub name: String,
    /// Real directory. Symlinked directories are reported as neither.
    pub is_dir: bool,
    /// Regular file, or a symlink to one.
    pub is_file: bool,
}

/// An entry that could not be inspected while listing a directory.
#[derive(Debug)]
pub struct EntryFailure {
    /// The entry, or the directory itself when iteration failed.
    pub path: PathBuf,
    /// Underlying error.
    pub error: io::Error,
}

/// Result of listing one directory.
#[derive(Debug, Default)]
pub struct DirListing {
    /// Entries that were inspected.
    pub entries: Vec<DirEntryInfo>,
    /// Entries that were not.
    pub failures: Vec<EntryFailure>,
}

/// Read-only filesystem view.
pub trait FileSource: Send + Sync {
    /// Read a whole file as UTF-8.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Stat a path, following symlinks.
    fn stamp(&self, path: &Path) -> io::Result<FileStamp>;

    /// Resolve symlinks and relative components.
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// List a directory. Order is unspecified. Entries that cannot be
    /// inspected are reported in [`DirListing::failures`].
    fn read_dir(&self, path: &Path) -> io::Result<DirListing>;
}

/// [`FileSource`] backed by `std::fs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsFileSource;

impl FileSource for OsFileSource {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn stamp(&self, path: &Path) -> io::Result<FileStamp> {
        let meta = fs::metadata(path)?;
        Ok(FileStamp {
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            len: meta.len(),
            is_file: meta.is_file(),
        })
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<DirListing> {
        let mut listing = DirListing::default();
        for entry in fs::read_dir(path)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    listing.failures.push(EntryFailure {
                        path: path.to_path_buf(),
                        error,
                    });
                    continue;
                }
            };
            let entry_path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(error) => {
                    listing.failures.push(EntryFailure {
                        path: entry_path,
                        error,
                    });
                    continue;
                }
            };
            let is_file = file_type.is_file()
                || (file_type.is_symlink()
                    && fs::metadata(&entry_path).is_ok_and(|m| m.is_file()));
            listing.entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry_path,
                is_dir: file_type.is_dir(),
                is_file,
            });
        }
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lists_files_and_dirs() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("CLAUDE.md"), "x").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();

        let listing = OsFileSource.read_dir(tmp.path()).unwrap();
        assert!(listing.failures.is_empty());
        let mut entries = listing.entries;
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "CLAUDE.md");
        assert!(entries[0].is_file);
        assert!(entries[1].is_dir);
    }

    #[test]
    fn stamp_reports_size() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.md");
        fs::write(&path, "hello").unwrap();

        let stamp = OsFileSource.stamp(&path).unwrap();
        assert_eq!(stamp.len, 5);
        assert!(stamp.is_file);
        let missing = OsFileSource.stamp(&tmp.path().join("missing.md")).unwrap_err();
        assert_eq!(missing.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_dir_is_not_descended() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("real")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real"), tmp.path().join("link")).unwrap();

        let entries = OsFileSource.read_dir(tmp.path()).unwrap().entries;
        let link = entries.iter().find(|e| e.name == "link").unwrap();
        assert!(!link.is_dir);
        assert!(!link.is_file);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_file_counts_as_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("real.md"), "x").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real.md"), tmp.path().join("alias.md"))
            .unwrap();

        let entries = OsFileSource.read_dir(tmp.path()).unwrap().entries;
        let alias = entries.iter().find(|e| e.name == "alias.md").unwrap();
        assert!(alias.is_file);
    }
}
