//! Result of a discovery session: ordered content blocks, the activation
//! trace explaining every candidate, and execution statistics.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::errors::{ContextError, DocumentError};
use crate::types::{ConfigLevel, RuleFormat};

// ─────────────────────────────────────────────────────────────────────────────
// Content blocks
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of document a block came from. Memory sorts before rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// Memory document.
    Memory,
    /// Rule document.
    Rule,
}

/// One piece of included guidance, in final order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlock {
    /// Canonical source path.
    pub origin: PathBuf,
    /// Memory or rule.
    pub kind: BlockKind,
    /// Scope level; rules are always project level.
    pub level: ConfigLevel,
    /// Rule format, for rule blocks.
    pub rule_format: Option<RuleFormat>,
    /// Rule precedence, for rule blocks.
    pub precedence: Option<u32>,
    /// Rule description, for rule blocks.
    pub description: Option<String>,
    /// Rule globs, for rule blocks.
    pub globs: Vec<String>,
    /// Whether the rule was always applied.
    pub always_apply: bool,
    /// Text to emit.
    pub text: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Activation trace
// ─────────────────────────────────────────────────────────────────────────────

/// Why a candidate was included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum InclusionReason {
    /// Memory documents are always included.
    Memory,
    /// The rule applies unconditionally.
    AlwaysApply,
    /// A glob matched a changed path.
    GlobMatched {
        /// The matching pattern.
        pattern: String,
        /// The changed path it matched.
        path: String,
    },
}

/// Why a readable candidate was left out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoMatchReason {
    /// The rule is manual-only.
    ManualOnly,
    /// The rule has globs but none matched a changed path.
    NoGlobMatched,
    /// The rule has no globs and does not apply unconditionally.
    NoGlobs,
}

/// The single outcome recorded for a candidate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum TraceOutcome {
    /// Included in the output.
    Included {
        /// Why.
        reason: InclusionReason,
    },
    /// Readable but not selected.
    ExcludedNoMatch {
        /// Why.
        reason: NoMatchReason,
    },
    /// Unreadable or otherwise unusable.
    ExcludedError {
        /// Human-readable cause.
        message: String,
    },
    /// Same canonical path already handled earlier.
    ExcludedDuplicate {
        /// Candidate kind that claimed the path first.
        first_seen: BlockKind,
    },
}

impl TraceOutcome {
    /// Whether the candidate reached the output.
    pub fn is_included(&self) -> bool {
        matches!(self, Self::Included { .. })
    }
}

/// Trace record for one candidate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    /// Canonical path when known, otherwise the discovered path.
    pub origin: PathBuf,
    /// Memory or rule.
    pub kind: BlockKind,
    /// Scope level of the candidate.
    pub level: ConfigLevel,
    /// Outcome.
    #[serde(flatten)]
    pub outcome: TraceOutcome,
    /// Non-fatal problems attached to the document.
    pub diagnostics: Vec<DocumentError>,
}

/// Explanation of every candidate considered, in discovery order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ActivationTrace {
    entries: Vec<TraceEntry>,
}

impl ActivationTrace {
    /// Append an entry.
    pub fn push(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    /// All entries.
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the trace is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Outcome of the first entry for `origin`.
    pub fn outcome_for(&self, origin: &Path) -> Option<&TraceOutcome> {
        self.entries
            .iter()
            .find(|e| e.origin == origin)
            .map(|e| &e.outcome)
    }

    /// All outcomes recorded for `origin`, in order.
    pub fn outcomes_for<'a>(&'a self, origin: &'a Path) -> impl Iterator<Item = &'a TraceOutcome> {
        self.entries
            .iter()
            .filter(move |e| e.origin == origin)
            .map(|e| &e.outcome)
    }

    /// Number of included entries.
    pub fn included_count(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_included()).count()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Orchestrator execution strategy, from most to least capable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionMode {
    /// Full worker pool.
    Parallel,
    /// Small worker pool.
    ReducedParallel,
    /// Single-threaded traversal and parsing.
    Sequential,
    /// No reads; empty result with an error indicator.
    Emergency,
}

impl ExecutionMode {
    /// Next mode after a failure in `self`.
    pub fn fallback(self, error: &ContextError) -> Self {
        match self {
            Self::Parallel if error.is_resource_exhaustion() => Self::ReducedParallel,
            Self::Parallel | Self::ReducedParallel => Self::Sequential,
            Self::Sequential | Self::Emergency => Self::Emergency,
        }
    }
}

/// How one mode attempt ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "camelCase")]
pub enum AttemptOutcome {
    /// The mode produced the result.
    Succeeded,
    /// The mode hit a handle or memory limit.
    ResourceExhausted(String),
    /// The mode failed for another reason.
    Failed(String),
}

/// Record of one mode attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeAttempt {
    /// Mode tried.
    pub mode: ExecutionMode,
    /// Wall time spent in the attempt.
    pub elapsed_ms: u64,
    /// Files read during the attempt.
    pub documents_read: usize,
    /// How it ended.
    pub outcome: AttemptOutcome,
}

/// Statistics for a whole discovery session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryStats {
    /// Mode that produced the result.
    pub mode: ExecutionMode,
    /// Every attempt, in order.
    pub attempts: Vec<ModeAttempt>,
    /// Total wall time.
    pub elapsed_ms: u64,
    /// Files read across all attempts.
    pub documents_read: usize,
    /// Document cache hits across all attempts.
    pub cache_hits: usize,
    /// Whether the deadline cut the session short.
    pub deadline_expired: bool,
}

impl Default for DiscoveryStats {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Parallel,
            attempts: Vec::new(),
            elapsed_ms: 0,
            documents_read: 0,
            cache_hits: 0,
            deadline_expired: false,
        }
    }
}

/// Non-fatal session problem not tied to a candidate, such as a directory
/// that could not be listed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionWarning {
    /// Path involved.
    pub path: PathBuf,
    /// What happened.
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Merged configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Final output of a discovery session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedConfiguration {
    /// Included content, in emission order.
    pub blocks: Vec<ContentBlock>,
    /// One entry per candidate.
    pub trace: ActivationTrace,
    /// Execution statistics.
    pub stats: DiscoveryStats,
    /// Skipped directories and similar.
    pub warnings: Vec<SessionWarning>,
    /// Set when every mode failed.
    pub session_error: Option<String>,
}

impl MergedConfiguration {
    /// Whether no content was included.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks of one kind, in order.
    pub fn blocks_of(&self, kind: BlockKind) -> impl Iterator<Item = &ContentBlock> {
        self.blocks.iter().filter(move |b| b.kind == kind)
    }

    /// Result of the emergency mode.
    pub(crate) fn emergency(message: String, stats: DiscoveryStats) -> Self {
        Self {
            blocks: Vec::new(),
            trace: ActivationTrace::default(),
            stats,
            warnings: Vec::new(),
            session_error: Some(message),
        }
    }
}
