//! Discovery orchestration.
//!
//! Runs one discovery call as a small state machine over
//! [`ExecutionMode`]s. Each mode locates candidates, reads them, and merges
//! the results. A failing mode hands over to the next one:
//!
//! ```text
//! Parallel --resource exhaustion--> ReducedParallel --any--> Sequential --any--> Emergency
//! Parallel --other failure--------------------------------> Sequential
//! ```
//!
//! Parallel modes bound concurrency with a semaphore and run blocking reads
//! on tokio's blocking pool. Results are slotted by discovery index, so the
//! merge sees the same input order in every mode.
//!
//! A deadline stops new reads from being issued; reads already running are
//! drained, and candidates never read are traced as `deadline expired`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::{ContextError, DocumentError};
use crate::locator::{CandidateSet, MemoryCandidate, PathLocator, RuleCandidate};
use crate::memory::MemoryResolver;
use crate::merge::merge;
use crate::options::DiscoveryOptions;
use crate::output::{
    AttemptOutcome, DiscoveryStats, ExecutionMode, MergedConfiguration, ModeAttempt,
    SessionWarning,
};
use crate::rules::RuleParser;
use crate::session::DiscoverySession;
use crate::source::{FileSource, OsFileSource};
use crate::types::{ChangedFilePath, MemoryDocument, RuleDocument};

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// Input to one discovery call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryRequest {
    /// Project root; need not be canonical.
    pub project_root: PathBuf,
    /// Files touched in the current task, project-relative.
    pub changed_paths: Vec<ChangedFilePath>,
}

impl DiscoveryRequest {
    /// Request for `project_root` with no changed paths.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            changed_paths: Vec::new(),
        }
    }

    /// Set the changed paths.
    #[must_use]
    pub fn with_changed_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ChangedFilePath>,
    {
        self.changed_paths = paths.into_iter().map(Into::into).collect();
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Work items
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
enum WorkItem {
    Memory(MemoryCandidate),
    Rule(RuleCandidate),
}

impl WorkItem {
    fn deadline_expired(&self) -> WorkOutput {
        match self {
            Self::Memory(c) => WorkOutput::Memory(Arc::new(MemoryDocument::failed(
                c.path.clone(),
                c.level,
                DocumentError::DeadlineExpired {
                    path: c.path.clone(),
                },
            ))),
            Self::Rule(c) => WorkOutput::Rule(Arc::new(RuleDocument::failed(
                c.path.clone(),
                c.format,
                DocumentError::DeadlineExpired {
                    path: c.path.clone(),
                },
            ))),
        }
    }
}

#[derive(Clone, Debug)]
enum WorkOutput {
    Memory(Arc<MemoryDocument>),
    Rule(Arc<RuleDocument>),
}

/// Everything a worker needs, shareable across blocking tasks.
struct WorkContext {
    session: Arc<DiscoverySession>,
    source: Arc<dyn FileSource>,
    project_root: PathBuf,
    user_home: Option<PathBuf>,
    max_import_depth: usize,
    max_document_bytes: u64,
}

impl WorkContext {
    fn process(&self, item: &WorkItem) -> Result<WorkOutput, ContextError> {
        match item {
            WorkItem::Memory(candidate) => {
                MemoryResolver::new(&self.session, self.source.as_ref())
                    .with_max_depth(self.max_import_depth)
                    .with_max_bytes(self.max_document_bytes)
                    .with_home(self.user_home.as_deref())
                    .resolve(&candidate.path, candidate.level)
                    .map(WorkOutput::Memory)
            }
            WorkItem::Rule(candidate) => {
                RuleParser::new(&self.session, self.source.as_ref(), &self.project_root)
                    .with_max_bytes(self.max_document_bytes)
                    .parse(&candidate.path, candidate.format)
                    .map(WorkOutput::Rule)
            }
        }
    }
}

/// Output of a successful mode.
struct Harvest {
    memory: Vec<Arc<MemoryDocument>>,
    rules: Vec<Arc<RuleDocument>>,
    warnings: Vec<SessionWarning>,
    deadline_expired: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Entry point for guidance discovery.
pub struct DiscoveryOrchestrator {
    options: DiscoveryOptions,
    source: Arc<dyn FileSource>,
}

impl DiscoveryOrchestrator {
    /// Orchestrator reading the real filesystem.
    pub fn new(options: DiscoveryOptions) -> Self {
        Self::with_source(options, Arc::new(OsFileSource))
    }

    /// Orchestrator reading through `source`.
    pub fn with_source(options: DiscoveryOptions, source: Arc<dyn FileSource>) -> Self {
        Self { options, source }
    }

    /// Options in effect.
    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    /// Discover, resolve, and merge guidance for `request`.
    ///
    /// Never fails: when every mode fails the result is empty and
    /// [`MergedConfiguration::session_error`] says why.
    #[instrument(skip_all, fields(root = %request.project_root.display()))]
    pub async fn discover(&self, request: &DiscoveryRequest) -> MergedConfiguration {
        let started = Instant::now();
        let deadline = self.options.deadline.map(|budget| started + budget);
        let session = Arc::new(DiscoverySession::new());
        let mut attempts: Vec<ModeAttempt> = Vec::new();
        let mut last_error: Option<String> = None;
        let mut mode = self.options.start_mode;

        loop {
            if mode == ExecutionMode::Emergency {
                let message = match last_error {
                    Some(err) => format!("all execution modes failed: {err}"),
                    None => "emergency mode requested".to_owned(),
                };
                error!(error = %message, "discovery degraded to emergency mode");
                let stats = stats(mode, attempts, &session, started, false);
                return MergedConfiguration::emergency(message, stats);
            }

            let attempt_started = Instant::now();
            let reads_before = session.documents_read();
            let result = self.run_mode(mode, &session, request, deadline).await;
            let elapsed_ms = millis(attempt_started.elapsed());
            let documents_read = session.documents_read().saturating_sub(reads_before);

            match result {
                Ok(harvest) => {
                    attempts.push(ModeAttempt {
                        mode,
                        elapsed_ms,
                        documents_read,
                        outcome: AttemptOutcome::Succeeded,
                    });
                    let mut merged = merge(&harvest.memory, &harvest.rules, &request.changed_paths);
                    merged.warnings = harvest.warnings;
                    merged.stats = stats(mode, attempts, &session, started, harvest.deadline_expired);
                    info!(
                        mode = ?mode,
                        blocks = merged.blocks.len(),
                        documents_read = merged.stats.documents_read,
                        cache_hits = merged.stats.cache_hits,
                        elapsed_ms = merged.stats.elapsed_ms,
                        deadline_expired = merged.stats.deadline_expired,
                        "discovery complete"
                    );
                    return merged;
                }
                Err(err) => {
                    let next = mode.fallback(&err);
                    warn!(mode = ?mode, next = ?next, error = %err, "execution mode failed");
                    let outcome = if err.is_resource_exhaustion() {
                        AttemptOutcome::ResourceExhausted(err.to_string())
                    } else {
                        AttemptOutcome::Failed(err.to_string())
                    };
                    attempts.push(ModeAttempt {
                        mode,
                        elapsed_ms,
                        documents_read,
                        outcome,
                    });
                    last_error = Some(err.to_string());
                    mode = next;
                }
            }
        }
    }

    /// Run [`discover`](Self::discover) on a private current-thread runtime.
    ///
    /// Must not be called from inside a tokio runtime.
    pub fn discover_blocking(&self, request: &DiscoveryRequest) -> MergedConfiguration {
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(self.discover(request)),
            Err(err) => MergedConfiguration::emergency(
                format!("cannot start runtime: {err}"),
                DiscoveryStats {
                    mode: ExecutionMode::Emergency,
                    ..DiscoveryStats::default()
                },
            ),
        }
    }

    async fn run_mode(
        &self,
        mode: ExecutionMode,
        session: &Arc<DiscoverySession>,
        request: &DiscoveryRequest,
        deadline: Option<Instant>,
    ) -> Result<Harvest, ContextError> {
        let workers = self.options.workers_for(mode);
        debug!(mode = ?mode, workers, "starting execution mode");

        let (project_root, candidates) = if workers.is_some() {
            let options = self.options.clone();
            let source = Arc::clone(&self.source);
            let root = request.project_root.clone();
            tokio::task::spawn_blocking(move || plan(&options, source.as_ref(), &root))
                .await
                .map_err(worker_error)??
        } else {
            plan(&self.options, self.source.as_ref(), &request.project_root)?
        };

        let CandidateSet {
            memory,
            rules,
            warnings,
        } = candidates;
        let items: Vec<WorkItem> = memory
            .into_iter()
            .map(WorkItem::Memory)
            .chain(rules.into_iter().map(WorkItem::Rule))
            .collect();

        let ctx = Arc::new(WorkContext {
            session: Arc::clone(session),
            source: Arc::clone(&self.source),
            project_root,
            user_home: self.options.user_home.clone(),
            max_import_depth: self.options.max_import_depth,
            max_document_bytes: self.options.max_document_bytes,
        });

        let (outputs, deadline_expired) = match workers {
            Some(count) => fan_out(&ctx, &items, count, deadline).await?,
            None => run_inline(&ctx, &items, deadline)?,
        };
        if deadline_expired {
            warn!(mode = ?mode, "deadline expired; unread candidates skipped");
        }

        let mut harvest = Harvest {
            memory: Vec::new(),
            rules: Vec::new(),
            warnings,
            deadline_expired,
        };
        for output in outputs {
            match output {
                WorkOutput::Memory(doc) => harvest.memory.push(doc),
                WorkOutput::Rule(doc) => harvest.rules.push(doc),
            }
        }
        Ok(harvest)
    }
}

/// Canonicalize the root and locate candidates.
fn plan(
    options: &DiscoveryOptions,
    source: &dyn FileSource,
    root: &Path,
) -> Result<(PathBuf, CandidateSet), ContextError> {
    let canonical = source
        .canonicalize(root)
        .map_err(|e| ContextError::from_root_io(root, e))?;
    let config = options.locator_config(canonical.clone());
    let candidates = PathLocator::new(&config, source).locate()?;
    Ok((canonical, candidates))
}

/// Read every item on the blocking pool with at most `workers` in flight.
async fn fan_out(
    ctx: &Arc<WorkContext>,
    items: &[WorkItem],
    workers: usize,
    deadline: Option<Instant>,
) -> Result<(Vec<WorkOutput>, bool), ContextError> {
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut slots: Vec<Option<WorkOutput>> = vec![None; items.len()];
    let mut tasks: JoinSet<(usize, Result<WorkOutput, ContextError>)> = JoinSet::new();
    let mut expired = false;

    for (index, item) in items.iter().enumerate() {
        let Some(permit) = acquire(&semaphore, deadline).await? else {
            expired = true;
            break;
        };
        while let Some(joined) = tasks.try_join_next() {
            store(&mut slots, joined)?;
        }

        let ctx = Arc::clone(ctx);
        let item = item.clone();
        let _ = tasks.spawn_blocking(move || {
            let _permit = permit;
            (index, ctx.process(&item))
        });
    }

    while let Some(joined) = tasks.join_next().await {
        store(&mut slots, joined)?;
    }

    let outputs = items
        .iter()
        .zip(slots)
        .map(|(item, slot)| slot.unwrap_or_else(|| item.deadline_expired()))
        .collect();
    Ok((outputs, expired))
}

/// Wait for a worker slot. `None` means the deadline passed first.
async fn acquire(
    semaphore: &Arc<Semaphore>,
    deadline: Option<Instant>,
) -> Result<Option<OwnedSemaphorePermit>, ContextError> {
    let pending = Arc::clone(semaphore).acquire_owned();
    let acquired = match deadline {
        Some(at) => match tokio::time::timeout_at(at, pending).await {
            Ok(acquired) => acquired,
            Err(_) => return Ok(None),
        },
        None => pending.await,
    };
    let permit = acquired.map_err(|e| ContextError::Worker(e.to_string()))?;
    if deadline.is_some_and(|at| Instant::now() >= at) {
        return Ok(None);
    }
    Ok(Some(permit))
}

fn store(
    slots: &mut [Option<WorkOutput>],
    joined: Result<(usize, Result<WorkOutput, ContextError>), JoinError>,
) -> Result<(), ContextError> {
    let (index, result) = joined.map_err(worker_error)?;
    let output = result?;
    if let Some(slot) = slots.get_mut(index) {
        *slot = Some(output);
    }
    Ok(())
}

/// Read every item on the calling thread, in order.
fn run_inline(
    ctx: &WorkContext,
    items: &[WorkItem],
    deadline: Option<Instant>,
) -> Result<(Vec<WorkOutput>, bool), ContextError> {
    let mut outputs = Vec::with_capacity(items.len());
    let mut expired = false;
    for item in items {
        if expired || deadline.is_some_and(|at| Instant::now() >= at) {
            expired = true;
            outputs.push(item.deadline_expired());
            continue;
        }
        outputs.push(ctx.process(item)?);
    }
    Ok((outputs, expired))
}

fn worker_error(err: JoinError) -> ContextError {
    ContextError::Worker(err.to_string())
}

fn stats(
    mode: ExecutionMode,
    attempts: Vec<ModeAttempt>,
    session: &DiscoverySession,
    started: Instant,
    deadline_expired: bool,
) -> DiscoveryStats {
    DiscoveryStats {
        mode,
        attempts,
        elapsed_ms: millis(started.elapsed()),
        documents_read: session.documents_read(),
        cache_hits: session.cache_hits(),
        deadline_expired,
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_normalizes_changed_paths() {
        let request = DiscoveryRequest::new("/p").with_changed_paths(["./src/a.ts", "lib\\b.rs"]);
        let paths: Vec<_> = request.changed_paths.iter().map(ChangedFilePath::as_str).collect();
        assert_eq!(paths, vec!["src/a.ts", "lib/b.rs"]);
    }

    #[test]
    fn deadline_placeholder_keeps_candidate_identity() {
        let item = WorkItem::Rule(RuleCandidate {
            path: PathBuf::from("/p/.cursorrules"),
            format: crate::types::RuleFormat::Legacy,
        });
        let WorkOutput::Rule(doc) = item.deadline_expired() else {
            panic!("expected rule output");
        };
        assert_eq!(doc.path, PathBuf::from("/p/.cursorrules"));
        assert!(!doc.is_readable());
    }

    #[tokio::test]
    async fn missing_root_degrades_to_emergency() {
        let tmp = tempfile::TempDir::new().unwrap();
        let orchestrator = DiscoveryOrchestrator::new(DiscoveryOptions {
            enterprise_dirs: Vec::new(),
            user_home: None,
            ..DiscoveryOptions::default()
        });
        let merged = orchestrator
            .discover(&DiscoveryRequest::new(tmp.path().join("absent")))
            .await;

        assert!(merged.is_empty());
        assert!(merged.session_error.is_some());
        assert_eq!(merged.stats.mode, ExecutionMode::Emergency);
        let modes: Vec<_> = merged.stats.attempts.iter().map(|a| a.mode).collect();
        assert_eq!(modes, vec![ExecutionMode::Parallel, ExecutionMode::Sequential]);
    }

    #[test]
    fn blocking_entry_point() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("CLAUDE.md"), "hello").unwrap();
        let root = std::fs::canonicalize(tmp.path()).unwrap();

        let orchestrator = DiscoveryOrchestrator::new(DiscoveryOptions {
            enterprise_dirs: Vec::new(),
            user_home: None,
            chain_boundary: Some(root.clone()),
            ..DiscoveryOptions::default()
        });
        let merged = orchestrator.discover_blocking(&DiscoveryRequest::new(&root));

        assert_eq!(merged.blocks.len(), 1);
        assert_eq!(merged.blocks[0].text, "hello");
        assert_eq!(merged.stats.mode, ExecutionMode::Parallel);
    }
}
