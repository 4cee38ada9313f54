//! Discovery engine settings.
//!
//! Controls which guidance sources are read, how deep memory imports may
//! nest, and how much concurrency the orchestrator may use.

use serde::{Deserialize, Serialize};

/// Directories skipped by the recursive project walk unless overridden.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".hg",
    ".svn",
    "target",
    "dist",
    "build",
    "out",
    ".next",
    ".nuxt",
    "coverage",
    "__pycache__",
    ".venv",
    "venv",
];

/// Settings for one discovery session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoverySettings {
    /// Read memory documents (`CLAUDE.md` chain, user, enterprise).
    pub include_memory: bool,
    /// Read rule documents (`.cursorrules`, `.cursor/rules/**/*.mdc`).
    pub include_rules: bool,
    /// Deepest import nesting allowed; the top-level document is depth 1.
    pub max_import_depth: usize,
    /// Worker count for the parallel mode. `None` derives it from the host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_pool_size: Option<usize>,
    /// Worker count after a resource-exhaustion fallback.
    pub reduced_pool_size: usize,
    /// Overall deadline for one discovery call, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
    /// Also pick up `CLAUDE.md` files below the project root.
    pub include_nested_memory: bool,
    /// Override for the user home directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_home: Option<String>,
    /// Override for the machine-wide policy directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enterprise_dirs: Option<Vec<String>>,
    /// Directory names never descended into during the project walk.
    pub exclude_dirs: Vec<String>,
    /// Documents larger than this are not read.
    pub max_document_bytes: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            include_memory: true,
            include_rules: false,
            max_import_depth: 5,
            worker_pool_size: None,
            reduced_pool_size: 2,
            deadline_ms: None,
            include_nested_memory: false,
            user_home: None,
            enterprise_dirs: None,
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| (*s).to_owned()).collect(),
            max_document_bytes: 1024 * 1024,
        }
    }
}

impl DiscoverySettings {
    /// Worker count for the parallel mode, falling back to the host's
    /// available parallelism.
    pub fn effective_pool_size(&self) -> usize {
        self.worker_pool_size
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(4, usize::from))
            .max(1)
    }
}
