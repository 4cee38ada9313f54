//! # guidance-context
//!
//! Discovers the guidance documents that apply to a project and merges them
//! into one ordered configuration.
//!
//! Two families of documents are supported:
//!
//! - **Memory**: `CLAUDE.md` files at enterprise, user, and project level.
//!   `@path` directives inline other files, recursively, with cycle and
//!   depth protection.
//! - **Rules**: a legacy `.cursorrules` file and modern
//!   `.cursor/rules/**/*.mdc` files with a front-matter header controlling
//!   activation (`alwaysApply`, `globs`, `description`).
//!
//! [`DiscoveryOrchestrator`] drives a session: it locates candidates, reads
//! them with a bounded worker pool, and falls back to smaller pools, then a
//! sequential pass, and finally an empty result when the host is short on
//! resources. Every candidate ends up in the [`ActivationTrace`] with the
//! reason it was included or excluded.
//!
//! # Usage
//!
//! ```no_run
//! use guidance_context::{DiscoveryOptions, DiscoveryOrchestrator, DiscoveryRequest};
//!
//! # async fn run() {
//! let orchestrator = DiscoveryOrchestrator::new(DiscoveryOptions::default());
//! let request = DiscoveryRequest::new("/work/app").with_changed_paths(["src/main.ts"]);
//! let merged = orchestrator.discover(&request).await;
//! println!("{}", merged.render());
//! # }
//! ```

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
mod frontmatter;
pub mod locator;
pub mod matcher;
pub mod memory;
pub mod merge;
pub mod options;
pub mod orchestrator;
pub mod output;
mod render;
pub mod rules;
pub mod session;
pub mod source;
pub mod types;

pub use errors::{ContextError, DocumentError};
pub use locator::{CandidateSet, LocatorConfig, PathLocator};
pub use memory::MemoryResolver;
pub use merge::merge;
pub use options::DiscoveryOptions;
pub use orchestrator::{DiscoveryOrchestrator, DiscoveryRequest};
pub use output::{
    ActivationTrace, AttemptOutcome, BlockKind, ContentBlock, DiscoveryStats, ExecutionMode,
    InclusionReason, MergedConfiguration, ModeAttempt, NoMatchReason, SessionWarning,
    TraceEntry, TraceOutcome,
};
pub use rules::{RuleParser, parse_rule_text};
pub use session::DiscoverySession;
pub use source::{FileSource, OsFileSource};
pub use types::{
    ActivationClass, ChangedFilePath, ConfigLevel, ImportRef, ImportStatus, MemoryDocument,
    RuleDocument, RuleFormat,
};
