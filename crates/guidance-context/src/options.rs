//! Runtime options for a discovery call.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use guidance_settings::DiscoverySettings;

use crate::constants::platform_enterprise_dirs;
use crate::locator::LocatorConfig;
use crate::output::ExecutionMode;

/// Resolved options for [`crate::DiscoveryOrchestrator`].
#[derive(Clone, Debug)]
pub struct DiscoveryOptions {
    /// Collect memory documents.
    pub include_memory: bool,
    /// Collect rule documents.
    pub include_rules: bool,
    /// Collect `CLAUDE.md` files below the project root.
    pub include_nested_memory: bool,
    /// Deepest import nesting; the top-level document is depth 1.
    pub max_import_depth: usize,
    /// Worker count in the parallel mode.
    pub worker_pool_size: usize,
    /// Worker count in the reduced-parallel mode.
    pub reduced_pool_size: usize,
    /// Budget for the whole call.
    pub deadline: Option<Duration>,
    /// Home directory for user memory and `~/` imports.
    pub user_home: Option<PathBuf>,
    /// Machine-wide policy directories.
    pub enterprise_dirs: Vec<PathBuf>,
    /// Outermost directory searched for chain documents.
    pub chain_boundary: Option<PathBuf>,
    /// Directory names skipped by the project walk.
    pub exclude_dirs: HashSet<String>,
    /// Largest file read, in bytes.
    pub max_document_bytes: u64,
    /// Mode the state machine starts in.
    pub start_mode: ExecutionMode,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self::from_settings(&DiscoverySettings::default())
    }
}

impl DiscoveryOptions {
    /// Build options from loaded settings, filling host-derived values.
    pub fn from_settings(settings: &DiscoverySettings) -> Self {
        Self {
            include_memory: settings.include_memory,
            include_rules: settings.include_rules,
            include_nested_memory: settings.include_nested_memory,
            max_import_depth: settings.max_import_depth.max(1),
            worker_pool_size: settings.effective_pool_size(),
            reduced_pool_size: settings.reduced_pool_size.max(1),
            deadline: settings.deadline_ms.map(Duration::from_millis),
            user_home: settings
                .user_home
                .as_ref()
                .map(PathBuf::from)
                .or_else(home_dir),
            enterprise_dirs: settings.enterprise_dirs.as_ref().map_or_else(
                platform_enterprise_dirs,
                |dirs| dirs.iter().map(PathBuf::from).collect(),
            ),
            chain_boundary: None,
            exclude_dirs: settings.exclude_dirs.iter().cloned().collect(),
            max_document_bytes: settings.max_document_bytes,
            start_mode: ExecutionMode::Parallel,
        }
    }

    /// Worker count for a mode; `None` for modes that run inline.
    pub fn workers_for(&self, mode: ExecutionMode) -> Option<usize> {
        match mode {
            ExecutionMode::Parallel => Some(self.worker_pool_size.max(1)),
            ExecutionMode::ReducedParallel => Some(self.reduced_pool_size.max(1)),
            ExecutionMode::Sequential | ExecutionMode::Emergency => None,
        }
    }

    pub(crate) fn locator_config(&self, project_root: PathBuf) -> LocatorConfig {
        LocatorConfig {
            project_root,
            user_home: self.user_home.clone(),
            enterprise_dirs: self.enterprise_dirs.clone(),
            chain_boundary: self.chain_boundary.clone(),
            include_memory: self.include_memory,
            include_rules: self.include_rules,
            include_nested_memory: self.include_nested_memory,
            exclude_dirs: self.exclude_dirs.clone(),
        }
    }
}

/// The current user's home directory from the environment.
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
