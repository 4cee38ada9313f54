//! Memory document resolution.
//!
//! A memory document may pull in other files with `@path` directives. The
//! resolver splices imported content in place, depth first, using an
//! explicit stack so nesting never grows the call stack.
//!
//! Directive syntax:
//! - `@` at the start of a line or after whitespace, followed by a
//!   non-empty run of non-whitespace characters
//! - trailing sentence punctuation is not part of the path
//! - directives inside fenced code blocks or inline code spans are text
//!
//! Failure handling never aborts the document. A directive that cannot be
//! followed is left in the output as written and recorded in
//! [`MemoryDocument::imports`], with an entry in [`MemoryDocument::errors`]
//! for cycles, depth overruns, and missing targets.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::constants::{DEFAULT_MAX_DOCUMENT_BYTES, DEFAULT_MAX_IMPORT_DEPTH, IMPORT_SIGIL};
use crate::errors::{ContextError, DocumentError, escalate};
use crate::session::DiscoverySession;
use crate::source::{FileStamp, FileSource};
use crate::types::{ConfigLevel, ImportKind, ImportRef, ImportStatus, MemoryDocument};

/// Characters trimmed from the end of a directive token.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']'];

// ─────────────────────────────────────────────────────────────────────────────
// Scanning
// ─────────────────────────────────────────────────────────────────────────────

/// Piece of a memory file: literal text or an import directive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Segment {
    Text(String),
    Import(String),
}

/// A file read once per session and split into segments.
#[derive(Debug)]
pub(crate) struct SourceText {
    pub(crate) path: PathBuf,
    pub(crate) raw: String,
    pub(crate) segments: Vec<Segment>,
}

impl SourceText {
    fn new(path: PathBuf, raw: String) -> Self {
        let segments = scan_segments(&raw);
        Self {
            path,
            raw,
            segments,
        }
    }
}

/// Level-independent result of flattening one file. Shared through the
/// session by every candidate that reaches the same canonical path.
#[derive(Debug)]
pub(crate) struct Flattened {
    path: PathBuf,
    raw: String,
    imports: Vec<ImportRef>,
    resolved: String,
    errors: Vec<DocumentError>,
}

impl Flattened {
    fn document(&self, level: ConfigLevel) -> MemoryDocument {
        MemoryDocument {
            path: self.path.clone(),
            level,
            raw: self.raw.clone(),
            imports: self.imports.clone(),
            resolved: self.resolved.clone(),
            errors: self.errors.clone(),
        }
    }
}

/// Split `raw` into text and directives. Concatenating the text segments
/// with `@token` for each directive reproduces `raw` exactly.
pub(crate) fn scan_segments(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut in_fence = false;

    for line in raw.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            text.push_str(line);
            continue;
        }
        if in_fence {
            text.push_str(line);
            continue;
        }
        scan_line(line, &mut text, &mut segments);
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    segments
}

fn scan_line(line: &str, text: &mut String, segments: &mut Vec<Segment>) {
    let mut in_code = false;
    let mut prev: Option<char> = None;
    let mut consumed = 0;
    let mut chars = line.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c == '`' {
            in_code = !in_code;
        } else if c == IMPORT_SIGIL && !in_code && prev.is_none_or(char::is_whitespace) {
            let start = i + c.len_utf8();
            let run_end = line[start..]
                .find(char::is_whitespace)
                .map_or(line.len(), |n| start + n);
            let token = line[start..run_end].trim_end_matches(TRAILING_PUNCTUATION);
            if !token.is_empty() {
                let end = start + token.len();
                text.push_str(&line[consumed..i]);
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(text)));
                }
                segments.push(Segment::Import(token.to_owned()));
                consumed = end;
                while chars.peek().is_some_and(|(j, _)| *j < end) {
                    let _ = chars.next();
                }
                prev = token.chars().next_back();
                continue;
            }
        }
        prev = Some(c);
    }

    text.push_str(&line[consumed..]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver
// ─────────────────────────────────────────────────────────────────────────────

enum LoadFailure {
    Fatal(ContextError),
    Document(DocumentError),
}

impl From<ContextError> for LoadFailure {
    fn from(err: ContextError) -> Self {
        Self::Fatal(err)
    }
}

/// Resolves memory documents against a session cache.
pub struct MemoryResolver<'a> {
    session: &'a DiscoverySession,
    source: &'a dyn FileSource,
    max_depth: usize,
    max_bytes: u64,
    home: Option<&'a Path>,
}

impl<'a> MemoryResolver<'a> {
    /// Create a resolver with default limits and no home directory.
    pub fn new(session: &'a DiscoverySession, source: &'a dyn FileSource) -> Self {
        Self {
            session,
            source,
            max_depth: DEFAULT_MAX_IMPORT_DEPTH,
            max_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            home: None,
        }
    }

    /// Deepest import nesting; the top-level document is depth 1.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Largest file read, in bytes.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Directory `~/` directives resolve against.
    #[must_use]
    pub fn with_home(mut self, home: Option<&'a Path>) -> Self {
        self.home = home;
        self
    }

    /// Resolve one top-level memory document at `level`.
    ///
    /// Flattened content is cached per canonical path, so a file reached
    /// from several candidates is read and flattened once while each
    /// candidate keeps its own level. Only resource exhaustion is an error;
    /// every other problem is recorded on the returned document.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn resolve(
        &self,
        path: &Path,
        level: ConfigLevel,
    ) -> Result<Arc<MemoryDocument>, ContextError> {
        let canonical = match self.source.canonicalize(path) {
            Ok(p) => p,
            Err(err) => {
                let err = escalate(path, err)?;
                return Ok(self.failed(path, level, DocumentError::unreadable(path, &err)));
            }
        };

        let stamp = match self.stat(&canonical) {
            Ok(stamp) => stamp,
            Err(LoadFailure::Fatal(err)) => return Err(err),
            Err(LoadFailure::Document(err)) => return Ok(self.failed(&canonical, level, err)),
        };

        if let Some(flat) = self.session.memory.get(&canonical, stamp.modified) {
            self.session.record_hit();
            return Ok(Arc::new(flat.document(level)));
        }

        let top = match self.load_source(&canonical, &stamp) {
            Ok(source) => source,
            Err(LoadFailure::Fatal(err)) => return Err(err),
            Err(LoadFailure::Document(err)) => return Ok(self.failed(&canonical, level, err)),
        };

        let flattener = Flattener {
            resolver: self,
            stack: Vec::new(),
            inlined: HashSet::new(),
            imports: Vec::new(),
            errors: Vec::new(),
        };
        let flat = flattener.run(top)?;
        debug!(
            imports = flat.imports.len(),
            errors = flat.errors.len(),
            "memory document resolved"
        );
        let flat = self
            .session
            .memory
            .insert(canonical, stamp.modified, Arc::new(flat));
        Ok(Arc::new(flat.document(level)))
    }

    fn failed(&self, path: &Path, level: ConfigLevel, error: DocumentError) -> Arc<MemoryDocument> {
        warn!(path = %path.display(), error = %error, "memory document unreadable");
        Arc::new(MemoryDocument::failed(path.to_path_buf(), level, error))
    }

    fn stat(&self, canonical: &Path) -> Result<FileStamp, LoadFailure> {
        let stamp = self
            .source
            .stamp(canonical)
            .map_err(|e| classify(canonical, e))?;
        if !stamp.is_file {
            return Err(LoadFailure::Document(DocumentError::Unreadable {
                path: canonical.to_path_buf(),
                message: "not a regular file".into(),
            }));
        }
        Ok(stamp)
    }

    fn load_source(
        &self,
        canonical: &Path,
        stamp: &FileStamp,
    ) -> Result<Arc<SourceText>, LoadFailure> {
        if let Some(text) = self.session.sources.get(canonical, stamp.modified) {
            self.session.record_hit();
            return Ok(text);
        }
        if stamp.len > self.max_bytes {
            return Err(LoadFailure::Document(DocumentError::TooLarge {
                path: canonical.to_path_buf(),
                size: stamp.len,
                max: self.max_bytes,
            }));
        }
        let raw = self
            .source
            .read_to_string(canonical)
            .map_err(|e| classify(canonical, e))?;
        self.session.record_read();

        let text = Arc::new(SourceText::new(canonical.to_path_buf(), raw));
        Ok(self
            .session
            .sources
            .insert(canonical.to_path_buf(), stamp.modified, text))
    }

    fn target_path(&self, importer: &Path, token: &str, kind: ImportKind) -> Option<PathBuf> {
        match kind {
            ImportKind::HomeRelative => {
                let rest = token.strip_prefix("~/")?;
                self.home.map(|home| home.join(rest))
            }
            ImportKind::Absolute => Some(PathBuf::from(token)),
            ImportKind::Relative => Some(importer.parent().unwrap_or(importer).join(token)),
        }
    }
}

fn classify(path: &Path, err: std::io::Error) -> LoadFailure {
    match escalate(path, err) {
        Ok(err) => LoadFailure::Document(DocumentError::unreadable(path, &err)),
        Err(fatal) => LoadFailure::Fatal(fatal),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Flattening
// ─────────────────────────────────────────────────────────────────────────────

struct Frame {
    source: Arc<SourceText>,
    next: usize,
    depth: usize,
    output: String,
}

impl Frame {
    fn new(source: Arc<SourceText>, depth: usize) -> Self {
        let capacity = source.raw.len();
        Self {
            source,
            next: 0,
            depth,
            output: String::with_capacity(capacity),
        }
    }
}

enum Follow {
    Inline(Arc<SourceText>),
    KeepDirective,
    Drop,
}

/// State for flattening one top-level document.
struct Flattener<'r, 'a> {
    resolver: &'r MemoryResolver<'a>,
    stack: Vec<Frame>,
    inlined: HashSet<PathBuf>,
    imports: Vec<ImportRef>,
    errors: Vec<DocumentError>,
}

impl Flattener<'_, '_> {
    fn run(mut self, top: Arc<SourceText>) -> Result<Flattened, ContextError> {
        let path = top.path.clone();
        let raw = top.raw.clone();
        let _ = self.inlined.insert(path.clone());
        self.stack.push(Frame::new(top, 1));
        let mut resolved = String::new();

        while let Some(frame) = self.stack.last_mut() {
            let source = Arc::clone(&frame.source);
            let Some(segment) = source.segments.get(frame.next) else {
                if let Some(done) = self.stack.pop() {
                    match self.stack.last_mut() {
                        Some(parent) => parent.output.push_str(&done.output),
                        None => resolved = done.output,
                    }
                }
                continue;
            };
            frame.next += 1;

            let token = match segment {
                Segment::Text(text) => {
                    frame.output.push_str(text);
                    continue;
                }
                Segment::Import(token) => token,
            };
            let depth = frame.depth + 1;

            match self.follow(&source.path, token, depth)? {
                Follow::Inline(next) => self.stack.push(Frame::new(next, depth)),
                Follow::KeepDirective => {
                    if let Some(frame) = self.stack.last_mut() {
                        frame.output.push(IMPORT_SIGIL);
                        frame.output.push_str(token);
                    }
                }
                Follow::Drop => {}
            }
        }

        Ok(Flattened {
            path,
            raw,
            imports: self.imports,
            resolved,
            errors: self.errors,
        })
    }

    fn follow(&mut self, importer: &Path, token: &str, depth: usize) -> Result<Follow, ContextError> {
        let kind = ImportKind::of(token);
        let mut record = ImportRef {
            token: token.to_owned(),
            kind,
            resolved: None,
            importer: importer.to_path_buf(),
            depth,
            status: ImportStatus::Missing,
        };

        let Some(target) = self.resolver.target_path(importer, token, kind) else {
            return Ok(self.missing(record, "home directory is unknown".into()));
        };
        let canonical = match self.resolver.source.canonicalize(&target) {
            Ok(p) => p,
            Err(err) => {
                let err = escalate(&target, err)?;
                return Ok(self.missing(record, err.to_string()));
            }
        };
        record.resolved = Some(canonical.clone());

        if self.stack.iter().any(|f| f.source.path == canonical) {
            warn!(
                importer = %importer.display(),
                target = %canonical.display(),
                "import cycle"
            );
            self.errors.push(DocumentError::ImportCycle {
                importer: importer.to_path_buf(),
                target: canonical,
            });
            record.status = ImportStatus::Cycle;
            self.imports.push(record);
            return Ok(Follow::KeepDirective);
        }

        if self.inlined.contains(&canonical) {
            record.status = ImportStatus::AlreadyInlined;
            self.imports.push(record);
            return Ok(Follow::Drop);
        }

        if depth > self.resolver.max_depth {
            warn!(importer = %importer.display(), token, depth, "import depth exceeded");
            self.errors.push(DocumentError::DepthExceeded {
                importer: importer.to_path_buf(),
                token: token.to_owned(),
                max: self.resolver.max_depth,
            });
            record.status = ImportStatus::DepthExceeded;
            self.imports.push(record);
            return Ok(Follow::KeepDirective);
        }

        let loaded = self
            .resolver
            .stat(&canonical)
            .and_then(|stamp| self.resolver.load_source(&canonical, &stamp));
        match loaded {
            Ok(source) => {
                debug!(token, depth, target = %canonical.display(), "import inlined");
                let _ = self.inlined.insert(canonical);
                record.status = ImportStatus::Inlined;
                self.imports.push(record);
                Ok(Follow::Inline(source))
            }
            Err(LoadFailure::Fatal(err)) => Err(err),
            Err(LoadFailure::Document(err)) => Ok(self.missing(record, err.to_string())),
        }
    }

    fn missing(&mut self, mut record: ImportRef, reason: String) -> Follow {
        warn!(
            importer = %record.importer.display(),
            token = %record.token,
            reason = %reason,
            "import unresolved"
        );
        self.errors.push(DocumentError::MissingImport {
            importer: record.importer.clone(),
            token: record.token.clone(),
            reason,
        });
        record.status = ImportStatus::Missing;
        self.imports.push(record);
        Follow::KeepDirective
    }
}
