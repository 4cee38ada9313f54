//! Document model shared by the locator, resolver, parser, and merge engine.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::constants::DEFAULT_RULE_PRECEDENCE;
use crate::errors::DocumentError;

// ─────────────────────────────────────────────────────────────────────────────
// Levels and classes
// ─────────────────────────────────────────────────────────────────────────────

/// Scope of a memory document. Later levels override earlier ones, so the
/// derived ordering is `Enterprise < User < Project`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLevel {
    /// Machine-wide policy.
    Enterprise,
    /// The current user's home.
    User,
    /// The project directory chain.
    Project,
}

impl ConfigLevel {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enterprise => "enterprise",
            Self::User => "user",
            Self::Project => "project",
        }
    }
}

impl fmt::Display for ConfigLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk format of a rule document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleFormat {
    /// Single `.cursorrules` file, always applied.
    Legacy,
    /// `.cursor/rules/**/*.mdc` file with an optional header.
    Modern,
}

/// How a rule becomes active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationClass {
    /// Included unconditionally.
    Always,
    /// Included when a glob matches a changed path.
    Auto,
    /// Left for an agent to request; included only on a glob match.
    Agent,
    /// Never included automatically.
    Manual,
}

impl ActivationClass {
    /// Parse a header `type` marker.
    pub fn from_marker(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "always" => Some(Self::Always),
            "auto" | "auto_attached" | "auto-attached" => Some(Self::Auto),
            "agent" | "agent_requested" | "agent-requested" => Some(Self::Agent),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Changed paths
// ─────────────────────────────────────────────────────────────────────────────

/// Project-relative path of a file touched in the current task, with `/`
/// separators.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChangedFilePath(String);

impl ChangedFilePath {
    /// Normalize separators and strip a leading `./` or `/`.
    pub fn new(path: impl AsRef<str>) -> Self {
        let normalized = path.as_ref().trim().replace('\\', "/");
        let mut rest = normalized.as_str();
        loop {
            if let Some(stripped) = rest.strip_prefix("./") {
                rest = stripped;
            } else if let Some(stripped) = rest.strip_prefix('/') {
                rest = stripped;
            } else {
                break;
            }
        }
        Self(rest.to_owned())
    }

    /// The normalized path.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path component.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Path relative to `scope` (a `/`-separated project subdirectory), if
    /// the changed file lives under it.
    pub fn relative_to(&self, scope: &str) -> Option<&str> {
        if scope.is_empty() {
            return Some(&self.0);
        }
        self.0
            .strip_prefix(scope)
            .and_then(|rest| rest.strip_prefix('/'))
    }
}

impl From<&str> for ChangedFilePath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ChangedFilePath {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for ChangedFilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory documents
// ─────────────────────────────────────────────────────────────────────────────

/// How an import token addresses its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportKind {
    /// Relative to the importing document's directory.
    Relative,
    /// Absolute filesystem path.
    Absolute,
    /// Starts with `~/`.
    HomeRelative,
}

impl ImportKind {
    /// Classify a directive token.
    pub fn of(token: &str) -> Self {
        if token.starts_with("~/") {
            Self::HomeRelative
        } else if Path::new(token).is_absolute() {
            Self::Absolute
        } else {
            Self::Relative
        }
    }
}

/// What happened to one import directive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportStatus {
    /// Content was spliced in.
    Inlined,
    /// Target already inlined earlier in the same document.
    AlreadyInlined,
    /// Target is on the active import chain.
    Cycle,
    /// Target would exceed the depth limit.
    DepthExceeded,
    /// Target could not be resolved or read.
    Missing,
}

/// One import directive encountered while flattening a memory document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRef {
    /// Directive text after the sigil.
    pub token: String,
    /// Addressing form of the token.
    pub kind: ImportKind,
    /// Canonical target, when resolution got that far.
    pub resolved: Option<PathBuf>,
    /// Canonical path of the document containing the directive.
    pub importer: PathBuf,
    /// Depth the target would occupy; the top-level document is depth 1.
    pub depth: usize,
    /// Outcome.
    pub status: ImportStatus,
}

/// A memory document with its imports flattened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryDocument {
    /// Canonical absolute path; the document's identity.
    pub path: PathBuf,
    /// Scope the document was discovered at.
    pub level: ConfigLevel,
    /// File content as read.
    pub raw: String,
    /// Every directive encountered, in reading order, at any depth.
    pub imports: Vec<ImportRef>,
    /// Content with imports spliced in.
    pub resolved: String,
    /// Problems found while reading or resolving.
    pub errors: Vec<DocumentError>,
}

impl MemoryDocument {
    /// A document that produced no content.
    pub fn failed(path: PathBuf, level: ConfigLevel, error: DocumentError) -> Self {
        Self {
            path,
            level,
            raw: String::new(),
            imports: Vec::new(),
            resolved: String::new(),
            errors: vec![error],
        }
    }

    /// Whether the document has usable content.
    pub fn is_readable(&self) -> bool {
        !self.errors.iter().any(DocumentError::is_fatal)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rule documents
// ─────────────────────────────────────────────────────────────────────────────

/// A parsed rule document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDocument {
    /// Canonical absolute path; the document's identity.
    pub path: PathBuf,
    /// On-disk format.
    pub format: RuleFormat,
    /// Content after the header block.
    pub body: String,
    /// Header `description`.
    pub description: Option<String>,
    /// Header `alwaysApply`; `true` for legacy rules.
    pub always_apply: bool,
    /// Header `globs`.
    pub globs: Vec<String>,
    /// Numeric file-name prefix, or [`DEFAULT_RULE_PRECEDENCE`].
    pub precedence: u32,
    /// Depth of the owning directory below the project root. Negative for
    /// rules found in ancestors of the root.
    pub dir_depth: i32,
    /// Owning directory relative to the project root, `/`-separated. Empty
    /// for the root itself and for ancestors.
    pub scope_dir: String,
    /// Derived activation class.
    pub activation: ActivationClass,
    /// `@path.ext` mentions found in the body.
    pub references: Vec<String>,
    /// Header keys not interpreted above.
    pub metadata: BTreeMap<String, String>,
    /// Problems found while reading or parsing.
    pub errors: Vec<DocumentError>,
}

impl RuleDocument {
    /// A rule that produced no content.
    pub fn failed(path: PathBuf, format: RuleFormat, error: DocumentError) -> Self {
        Self {
            path,
            format,
            body: String::new(),
            description: None,
            always_apply: false,
            globs: Vec::new(),
            precedence: DEFAULT_RULE_PRECEDENCE,
            dir_depth: 0,
            scope_dir: String::new(),
            activation: ActivationClass::Manual,
            references: Vec::new(),
            metadata: BTreeMap::new(),
            errors: vec![error],
        }
    }

    /// Whether the rule has usable content.
    pub fn is_readable(&self) -> bool {
        !self.errors.iter().any(DocumentError::is_fatal)
    }
}
