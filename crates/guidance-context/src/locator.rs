//! Candidate discovery.
//!
//! Produces the ordered list of files that may contribute guidance:
//!
//! - Enterprise `CLAUDE.md` files in machine-wide policy directories
//! - The user's `~/.claude/CLAUDE.md`
//! - `CLAUDE.md` in every directory from the outermost ancestor down to the
//!   project root
//! - Optionally, `CLAUDE.md` in subdirectories of the root
//! - `.cursorrules` along the same ancestor chain
//! - `.cursor/rules/**/*.mdc` anywhere in the project tree
//!
//! Nothing is read here; the locator only lists directories and stats files.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::constants::{
    LEGACY_RULES_FILE_NAME, MEMORY_FILE_NAME, MODERN_RULES_DIR, MODERN_RULES_EXTENSION,
    MODERN_RULES_PARENT_DIR, USER_MEMORY_DIR,
};
use crate::errors::{ContextError, escalate};
use crate::output::SessionWarning;
use crate::source::{DirEntryInfo, DirListing, FileSource};
use crate::types::{ConfigLevel, RuleFormat};

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Inputs to candidate discovery.
#[derive(Clone, Debug)]
pub struct LocatorConfig {
    /// Canonical project root.
    pub project_root: PathBuf,
    /// Home directory for the user-level document.
    pub user_home: Option<PathBuf>,
    /// Machine-wide policy directories.
    pub enterprise_dirs: Vec<PathBuf>,
    /// Outermost ancestor searched for chain documents. `None` walks to the
    /// filesystem root (exclusive).
    pub chain_boundary: Option<PathBuf>,
    /// Collect memory candidates.
    pub include_memory: bool,
    /// Collect rule candidates.
    pub include_rules: bool,
    /// Collect `CLAUDE.md` files below the project root.
    pub include_nested_memory: bool,
    /// Directory names never descended into.
    pub exclude_dirs: HashSet<String>,
}

/// A memory file to resolve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryCandidate {
    /// Path as discovered.
    pub path: PathBuf,
    /// Scope level.
    pub level: ConfigLevel,
}

/// A rule file to parse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleCandidate {
    /// Path as discovered.
    pub path: PathBuf,
    /// On-disk format.
    pub format: RuleFormat,
}

/// Everything discovery found, in discovery order.
#[derive(Clone, Debug, Default)]
pub struct CandidateSet {
    /// Memory candidates: enterprise, user, chain, nested.
    pub memory: Vec<MemoryCandidate>,
    /// Rule candidates: legacy chain files, then the modern tree walk.
    pub rules: Vec<RuleCandidate>,
    /// Directories and files that could not be inspected.
    pub warnings: Vec<SessionWarning>,
}

impl CandidateSet {
    /// Total number of candidates.
    pub fn len(&self) -> usize {
        self.memory.len() + self.rules.len()
    }

    /// Whether nothing was found.
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty() && self.rules.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Locator
// ─────────────────────────────────────────────────────────────────────────────

/// Walks the filesystem for candidates.
pub struct PathLocator<'a> {
    config: &'a LocatorConfig,
    source: &'a dyn FileSource,
}

impl<'a> PathLocator<'a> {
    /// Create a locator over `source`.
    pub fn new(config: &'a LocatorConfig, source: &'a dyn FileSource) -> Self {
        Self { config, source }
    }

    /// Find every candidate.
    ///
    /// Fails only when the project root cannot be listed or the host runs
    /// out of resources. Unlistable subdirectories and files that cannot be
    /// stat'ed become warnings.
    pub fn locate(&self) -> Result<CandidateSet, ContextError> {
        let root = &self.config.project_root;
        let root_listing = self
            .source
            .read_dir(root)
            .map_err(|e| ContextError::from_root_io(root, e))?;

        let mut set = CandidateSet::default();
        let root_entries = accept_listing(root_listing, &mut set)?;
        let chain = ancestor_chain(root, self.config.chain_boundary.as_deref());

        if self.config.include_memory {
            self.collect_enterprise(&mut set)?;
            self.collect_user(&mut set)?;
            for dir in &chain {
                let path = dir.join(MEMORY_FILE_NAME);
                if self.is_candidate_file(&path, &mut set)? {
                    set.memory.push(MemoryCandidate {
                        path,
                        level: ConfigLevel::Project,
                    });
                }
            }
        }

        if self.config.include_rules {
            for dir in &chain {
                let path = dir.join(LEGACY_RULES_FILE_NAME);
                if self.is_candidate_file(&path, &mut set)? {
                    set.rules.push(RuleCandidate {
                        path,
                        format: RuleFormat::Legacy,
                    });
                }
            }
        }

        if self.config.include_rules || self.config.include_nested_memory {
            self.walk(root_entries, &mut set)?;
        }

        debug!(
            root = %root.display(),
            memory = set.memory.len(),
            rules = set.rules.len(),
            skipped = set.warnings.len(),
            "candidates located"
        );
        Ok(set)
    }

    fn collect_enterprise(&self, set: &mut CandidateSet) -> Result<(), ContextError> {
        for dir in &self.config.enterprise_dirs {
            let path = dir.join(MEMORY_FILE_NAME);
            if self.is_candidate_file(&path, set)? {
                set.memory.push(MemoryCandidate {
                    path,
                    level: ConfigLevel::Enterprise,
                });
            }
        }
        Ok(())
    }

    fn collect_user(&self, set: &mut CandidateSet) -> Result<(), ContextError> {
        let Some(home) = &self.config.user_home else {
            return Ok(());
        };
        let path = home.join(USER_MEMORY_DIR).join(MEMORY_FILE_NAME);
        if self.is_candidate_file(&path, set)? {
            set.memory.push(MemoryCandidate {
                path,
                level: ConfigLevel::User,
            });
        }
        Ok(())
    }

    /// Stat a well-known location. Absence is `false`; any other ordinary
    /// failure is recorded as a warning and also reads as `false`.
    fn is_candidate_file(
        &self,
        path: &Path,
        set: &mut CandidateSet,
    ) -> Result<bool, ContextError> {
        match self.source.stamp(path) {
            Ok(stamp) => Ok(stamp.is_file),
            Err(err) => {
                let err = escalate(path, err)?;
                if !is_absent(&err) {
                    warn!(path = %path.display(), error = %err, "skipping unreadable candidate");
                    set.warnings.push(SessionWarning {
                        path: path.to_path_buf(),
                        message: format!("file skipped: {err}"),
                    });
                }
                Ok(false)
            }
        }
    }

    /// Pre-order walk of the project tree with entries visited in name order.
    fn walk(
        &self,
        root_entries: Vec<DirEntryInfo>,
        set: &mut CandidateSet,
    ) -> Result<(), ContextError> {
        let root = &self.config.project_root;
        let mut pending: Vec<PathBuf> = Vec::new();
        self.visit_dir(root, root_entries, set, &mut pending)?;

        while let Some(dir) = pending.pop() {
            let Some(entries) = self.list_or_warn(&dir, set)? else {
                continue;
            };
            self.visit_dir(&dir, entries, set, &mut pending)?;
        }
        Ok(())
    }

    fn visit_dir(
        &self,
        dir: &Path,
        mut entries: Vec<DirEntryInfo>,
        set: &mut CandidateSet,
        pending: &mut Vec<PathBuf>,
    ) -> Result<(), ContextError> {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let is_root = dir == self.config.project_root;
        let mut subdirs = Vec::new();

        for entry in entries {
            if entry.is_file {
                if self.config.include_nested_memory && !is_root && entry.name == MEMORY_FILE_NAME
                {
                    set.memory.push(MemoryCandidate {
                        path: entry.path,
                        level: ConfigLevel::Project,
                    });
                }
                continue;
            }
            if !entry.is_dir {
                continue;
            }
            if entry.name == MODERN_RULES_PARENT_DIR {
                if self.config.include_rules {
                    self.collect_modern_rules(&entry.path.join(MODERN_RULES_DIR), set)?;
                }
                continue;
            }
            if self.config.exclude_dirs.contains(&entry.name) || entry.name.starts_with('.') {
                continue;
            }
            subdirs.push(entry.path);
        }

        pending.extend(subdirs.into_iter().rev());
        Ok(())
    }

    /// Collect `*.mdc` files under a `.cursor/rules` directory, files before
    /// subdirectories, each in name order.
    fn collect_modern_rules(
        &self,
        rules_dir: &Path,
        set: &mut CandidateSet,
    ) -> Result<(), ContextError> {
        let mut pending = vec![rules_dir.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let Some(mut entries) = self.list_or_warn(&dir, set)? else {
                continue;
            };
            entries.sort_by(|a, b| a.name.cmp(&b.name));

            let mut subdirs = Vec::new();
            for entry in entries {
                if entry.is_dir {
                    subdirs.push(entry.path);
                } else if entry.is_file && has_rule_extension(&entry.path) {
                    set.rules.push(RuleCandidate {
                        path: entry.path,
                        format: RuleFormat::Modern,
                    });
                }
            }
            pending.extend(subdirs.into_iter().rev());
        }
        Ok(())
    }

    /// List a directory. A missing directory is skipped quietly; any other
    /// ordinary failure becomes a warning.
    fn list_or_warn(
        &self,
        dir: &Path,
        set: &mut CandidateSet,
    ) -> Result<Option<Vec<DirEntryInfo>>, ContextError> {
        match self.source.read_dir(dir) {
            Ok(listing) => accept_listing(listing, set).map(Some),
            Err(err) => {
                let err = escalate(dir, err)?;
                if !is_absent(&err) {
                    warn!(path = %dir.display(), error = %err, "skipping unlistable directory");
                    set.warnings.push(SessionWarning {
                        path: dir.to_path_buf(),
                        message: format!("directory skipped: {err}"),
                    });
                }
                Ok(None)
            }
        }
    }
}

/// Keep the inspected entries and turn per-entry failures into warnings.
fn accept_listing(
    listing: DirListing,
    set: &mut CandidateSet,
) -> Result<Vec<DirEntryInfo>, ContextError> {
    for failure in listing.failures {
        let err = escalate(&failure.path, failure.error)?;
        warn!(path = %failure.path.display(), error = %err, "skipping uninspectable entry");
        set.warnings.push(SessionWarning {
            path: failure.path,
            message: format!("entry skipped: {err}"),
        });
    }
    Ok(listing.entries)
}

/// A path that is not there, including one whose parent is not a directory.
fn is_absent(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

fn has_rule_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(MODERN_RULES_EXTENSION))
}

/// Directories from the outermost ancestor down to `root`, inclusive.
///
/// The filesystem root itself is never part of the chain. With a
/// `boundary`, the chain starts there instead (when it is an ancestor).
pub fn ancestor_chain(root: &Path, boundary: Option<&Path>) -> Vec<PathBuf> {
    let mut chain = Vec::new();
    for dir in root.ancestors() {
        if dir.parent().is_none() {
            break;
        }
        chain.push(dir.to_path_buf());
        if boundary.is_some_and(|b| b == dir) {
            break;
        }
    }
    chain.reverse();
    chain
}
