//! Rule document parsing.
//!
//! Legacy `.cursorrules` files are plain text and always apply. Modern
//! `.mdc` files carry an optional header (see [`crate::frontmatter`]) that
//! sets description, globs, and activation. Precedence comes from a numeric
//! file-name prefix such as `010-style.mdc`.

use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::constants::{
    DEFAULT_MAX_DOCUMENT_BYTES, DEFAULT_RULE_PRECEDENCE, MODERN_RULES_DIR, MODERN_RULES_PARENT_DIR,
};
use crate::errors::{ContextError, DocumentError, escalate};
use crate::frontmatter::{HeaderSplit, RuleHeader, parse_header, split_header};
use crate::matcher::RuleMatcher;
use crate::session::DiscoverySession;
use crate::source::FileSource;
use crate::types::{ActivationClass, RuleDocument, RuleFormat};

/// `@path.ext` mentions: sigil at line start or after whitespace, a path of
/// word characters, `/` and `-`, then a dotted extension.
static REFERENCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(?:^|\s)@([A-Za-z0-9_/\-]+\.[A-Za-z0-9]+)").unwrap());

/// Parses rule files against a session cache.
pub struct RuleParser<'a> {
    session: &'a DiscoverySession,
    source: &'a dyn FileSource,
    project_root: &'a Path,
    max_bytes: u64,
}

impl<'a> RuleParser<'a> {
    /// Create a parser for rules under `project_root` (canonical).
    pub fn new(
        session: &'a DiscoverySession,
        source: &'a dyn FileSource,
        project_root: &'a Path,
    ) -> Self {
        Self {
            session,
            source,
            project_root,
            max_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }

    /// Largest file read, in bytes.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Read and parse one rule file.
    ///
    /// Parsed content is cached per canonical path. `path` is the discovered
    /// path: its name gives the precedence and its position under the
    /// project root gives [`RuleDocument::dir_depth`] and
    /// [`RuleDocument::scope_dir`], on every call. Only resource exhaustion
    /// is an error.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn parse(&self, path: &Path, format: RuleFormat) -> Result<Arc<RuleDocument>, ContextError> {
        let canonical = match self.source.canonicalize(path) {
            Ok(p) => p,
            Err(err) => {
                let err = escalate(path, err)?;
                return Ok(failed(path, format, DocumentError::unreadable(path, &err)));
            }
        };
        let stamp = match self.source.stamp(&canonical) {
            Ok(stamp) => stamp,
            Err(err) => {
                let err = escalate(&canonical, err)?;
                return Ok(failed(
                    &canonical,
                    format,
                    DocumentError::unreadable(&canonical, &err),
                ));
            }
        };

        if let Some(doc) = self
            .session
            .rules
            .get(&canonical, stamp.modified)
            .filter(|doc| doc.format == format)
        {
            self.session.record_hit();
            return Ok(self.placed(&doc, path));
        }
        if stamp.len > self.max_bytes {
            let error = DocumentError::TooLarge {
                path: canonical.clone(),
                size: stamp.len,
                max: self.max_bytes,
            };
            return Ok(failed(&canonical, format, error));
        }

        let raw = match self.source.read_to_string(&canonical) {
            Ok(raw) => raw,
            Err(err) => {
                let err = escalate(&canonical, err)?;
                return Ok(failed(
                    &canonical,
                    format,
                    DocumentError::unreadable(&canonical, &err),
                ));
            }
        };
        self.session.record_read();

        let doc = Arc::new(parse_rule_text(&canonical, &raw, format, self.project_root));
        debug!(
            activation = ?doc.activation,
            globs = doc.globs.len(),
            errors = doc.errors.len(),
            "rule parsed"
        );
        let _ = self
            .session
            .rules
            .insert(canonical, stamp.modified, Arc::clone(&doc));
        Ok(self.placed(&doc, path))
    }

    /// Copy of `parsed` positioned at the discovered `path`.
    fn placed(&self, parsed: &RuleDocument, path: &Path) -> Arc<RuleDocument> {
        let mut doc = parsed.clone();
        (doc.dir_depth, doc.scope_dir) = placement(path, doc.format, self.project_root);
        if doc.format == RuleFormat::Modern {
            doc.precedence = precedence_from_file_name(path);
        }
        Arc::new(doc)
    }
}

fn failed(path: &Path, format: RuleFormat, error: DocumentError) -> Arc<RuleDocument> {
    warn!(path = %path.display(), error = %error, "rule document unreadable");
    Arc::new(RuleDocument::failed(path.to_path_buf(), format, error))
}

/// Parse rule content already in memory.
///
/// `path` locates the rule relative to `project_root` and is stored as the
/// document path.
pub fn parse_rule_text(
    path: &Path,
    raw: &str,
    format: RuleFormat,
    project_root: &Path,
) -> RuleDocument {
    let (dir_depth, scope_dir) = placement(path, format, project_root);

    if format == RuleFormat::Legacy {
        return RuleDocument {
            path: path.to_path_buf(),
            format,
            body: raw.to_owned(),
            description: None,
            always_apply: true,
            globs: Vec::new(),
            precedence: DEFAULT_RULE_PRECEDENCE,
            dir_depth,
            scope_dir,
            activation: ActivationClass::Always,
            references: extract_references(raw),
            metadata: BTreeMap::new(),
            errors: Vec::new(),
        };
    }

    let mut errors = Vec::new();
    let (header, body) = match split_header(raw) {
        HeaderSplit::Absent => (RuleHeader::default(), raw),
        HeaderSplit::Present { header, body } => (parse_header(header), body),
        HeaderSplit::Unterminated => {
            errors.push(DocumentError::MalformedHeader {
                path: path.to_path_buf(),
                message: "header block is never closed".into(),
            });
            (RuleHeader::default(), raw)
        }
    };

    for problem in &header.problems {
        errors.push(DocumentError::MalformedHeader {
            path: path.to_path_buf(),
            message: problem.clone(),
        });
    }

    let (_, invalid) = RuleMatcher::compile(&header.globs);
    for bad in invalid {
        errors.push(DocumentError::InvalidGlob {
            path: path.to_path_buf(),
            pattern: bad.pattern,
            message: bad.message,
        });
    }

    let always_apply = header.always_apply.unwrap_or(false);
    let activation = header.activation.unwrap_or(if always_apply {
        ActivationClass::Always
    } else if header.globs.is_empty() {
        ActivationClass::Agent
    } else {
        ActivationClass::Auto
    });

    RuleDocument {
        path: path.to_path_buf(),
        format,
        body: body.to_owned(),
        description: header.description,
        always_apply,
        globs: header.globs,
        precedence: precedence_from_file_name(path),
        dir_depth,
        scope_dir,
        activation,
        references: extract_references(body),
        metadata: header.metadata,
        errors,
    }
}

/// Leading digits of the file name, or [`DEFAULT_RULE_PRECEDENCE`] when
/// there are none: `010-style` gives 10, `2fa-policy` gives 2.
pub fn precedence_from_file_name(path: &Path) -> u32 {
    let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
        return DEFAULT_RULE_PRECEDENCE;
    };
    let digits_end = name
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(name.len());
    name[..digits_end].parse().unwrap_or(DEFAULT_RULE_PRECEDENCE)
}

/// `@path.ext` mentions in `body`, deduplicated in first-seen order.
pub fn extract_references(body: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for caps in REFERENCE_PATTERN.captures_iter(body) {
        let Some(m) = caps.get(1) else {
            continue;
        };
        let terminated = body[m.end()..]
            .chars()
            .next()
            .is_none_or(|c| c.is_whitespace() || matches!(c, '.' | ',' | '!' | '?'));
        let reference = m.as_str();
        if !terminated || reference.starts_with('/') {
            continue;
        }
        if !found.iter().any(|r| r == reference) {
            found.push(reference.to_owned());
        }
    }
    found
}

/// Directory depth and `/`-separated scope of a rule relative to the root.
///
/// Modern rules are owned by the directory holding their `.cursor` folder.
/// Legacy rules are owned by their parent directory; those above the root
/// get negative depths.
fn placement(path: &Path, format: RuleFormat, project_root: &Path) -> (i32, String) {
    let Some(parent) = path.parent() else {
        return (0, String::new());
    };

    if let Ok(relative) = parent.strip_prefix(project_root) {
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let owner_len = match format {
            RuleFormat::Legacy => parts.len(),
            RuleFormat::Modern => parts
                .windows(2)
                .position(|w| w[0] == MODERN_RULES_PARENT_DIR && w[1] == MODERN_RULES_DIR)
                .unwrap_or(parts.len()),
        };
        let depth = i32::try_from(owner_len).unwrap_or(i32::MAX);
        return (depth, parts[..owner_len].join("/"));
    }

    if let Ok(above) = project_root.strip_prefix(parent) {
        let levels = above.components().count();
        return (-i32::try_from(levels).unwrap_or(i32::MAX), String::new());
    }

    (0, String::new())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::source::OsFileSource;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn modern(raw: &str) -> RuleDocument {
        parse_rule_text(
            Path::new("/p/.cursor/rules/rule.mdc"),
            raw,
            RuleFormat::Modern,
            Path::new("/p"),
        )
    }

    #[test]
    fn legacy_rule_always_applies() {
        let doc = parse_rule_text(
            Path::new("/p/.cursorrules"),
            "Use tabs.",
            RuleFormat::Legacy,
            Path::new("/p"),
        );
        assert!(doc.always_apply);
        assert_eq!(doc.activation, ActivationClass::Always);
        assert_eq!(doc.precedence, DEFAULT_RULE_PRECEDENCE);
        assert_eq!(doc.body, "Use tabs.");
        assert_eq!(doc.dir_depth, 0);
    }

    #[test]
    fn legacy_rule_above_root_has_negative_depth() {
        let doc = parse_rule_text(
            Path::new("/work/.cursorrules"),
            "x",
            RuleFormat::Legacy,
            Path::new("/work/a/b"),
        );
        assert_eq!(doc.dir_depth, -2);
        assert_eq!(doc.scope_dir, "");
    }

    #[test]
    fn header_fields_and_body() {
        let doc = modern(
            "---\ndescription: TypeScript style\nglobs: [\"src/**/*.ts\"]\nalwaysApply: false\n---\nPrefer const.\n",
        );
        assert_eq!(doc.description.as_deref(), Some("TypeScript style"));
        assert_eq!(doc.globs, vec!["src/**/*.ts"]);
        assert!(!doc.always_apply);
        assert_eq!(doc.activation, ActivationClass::Auto);
        assert_eq!(doc.body, "Prefer const.\n");
        assert!(doc.errors.is_empty());
    }

    #[test]
    fn activation_derivation() {
        assert_eq!(
            modern("---\nalwaysApply: true\n---\nx").activation,
            ActivationClass::Always
        );
        assert_eq!(modern("---\ndescription: d\n---\nx").activation, ActivationClass::Agent);
        assert_eq!(modern("no header").activation, ActivationClass::Agent);
        assert_eq!(
            modern("---\nglobs: \"*.md\"\ntype: manual\n---\nx").activation,
            ActivationClass::Manual
        );
    }

    #[test]
    fn unterminated_header_keeps_whole_body() {
        let raw = "---\nglobs: *.ts\nbody text";
        let doc = modern(raw);
        assert_eq!(doc.body, raw);
        assert!(doc.globs.is_empty());
        assert_matches!(&doc.errors[..], [DocumentError::MalformedHeader { .. }]);
        assert!(doc.is_readable());
    }

    #[test]
    fn bad_always_apply_defaults_false() {
        let doc = modern("---\nalwaysApply: perhaps\n---\nx");
        assert!(!doc.always_apply);
        assert_matches!(&doc.errors[..], [DocumentError::MalformedHeader { .. }]);
    }

    #[test]
    fn invalid_glob_is_recorded() {
        let doc = modern("---\nglobs: [\"src/[\", \"*.rs\"]\n---\nx");
        assert_eq!(doc.globs.len(), 2);
        assert_matches!(&doc.errors[..], [DocumentError::InvalidGlob { pattern, .. }] if pattern == "src/[");
    }

    #[test]
    fn precedence_prefixes() {
        assert_eq!(precedence_from_file_name(Path::new("010-style.mdc")), 10);
        assert_eq!(precedence_from_file_name(Path::new("20_security.mdc")), 20);
        assert_eq!(precedence_from_file_name(Path::new("7.mdc")), 7);
        assert_eq!(
            precedence_from_file_name(Path::new("2fa-policy.mdc")),
            2
        );
        assert_eq!(
            precedence_from_file_name(Path::new("style.mdc")),
            DEFAULT_RULE_PRECEDENCE
        );
        assert_eq!(
            precedence_from_file_name(Path::new("99999999999-huge.mdc")),
            DEFAULT_RULE_PRECEDENCE
        );
    }

    #[test]
    fn nested_rule_placement() {
        let doc = parse_rule_text(
            Path::new("/p/web/app/.cursor/rules/sub/ui.mdc"),
            "x",
            RuleFormat::Modern,
            Path::new("/p"),
        );
        assert_eq!(doc.dir_depth, 2);
        assert_eq!(doc.scope_dir, "web/app");
    }

    #[test]
    fn references_are_extracted() {
        let refs = extract_references(
            "See @src/main.ts and @docs/guide.md.\nAlso @src/main.ts, me@mail.com and @/abs/x.md\n@no-extension",
        );
        assert_eq!(refs, vec!["src/main.ts", "docs/guide.md"]);
    }

    #[test]
    fn parser_reads_and_caches() {
        let tmp = TempDir::new().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap();
        let rule = root.join(".cursor/rules/010-style.mdc");
        fs::create_dir_all(rule.parent().unwrap()).unwrap();
        fs::write(&rule, "---\nalwaysApply: true\n---\nStyle.\n").unwrap();

        let session = DiscoverySession::new();
        let parser = RuleParser::new(&session, &OsFileSource, &root);
        let first = parser.parse(&rule, RuleFormat::Modern).unwrap();
        let second = parser.parse(&rule, RuleFormat::Modern).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.precedence, 10);
        assert_eq!(first.path, rule);
        assert_eq!(session.documents_read(), 1);
        assert_eq!(session.cache_hits(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn cached_rule_is_placed_per_discovered_path() {
        let tmp = TempDir::new().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap();
        let shared = root.join(".cursor/rules/010-style.mdc");
        let linked = root.join("pkg/web/.cursor/rules/030-style.mdc");
        fs::create_dir_all(shared.parent().unwrap()).unwrap();
        fs::create_dir_all(linked.parent().unwrap()).unwrap();
        fs::write(&shared, "---\nglobs: \"*.ts\"\n---\nStyle.\n").unwrap();
        std::os::unix::fs::symlink(&shared, &linked).unwrap();

        let session = DiscoverySession::new();
        let parser = RuleParser::new(&session, &OsFileSource, &root);
        let nested = parser.parse(&linked, RuleFormat::Modern).unwrap();
        let top = parser.parse(&shared, RuleFormat::Modern).unwrap();

        assert_eq!(session.documents_read(), 1);
        assert_eq!(session.cache_hits(), 1);
        assert_eq!(nested.path, top.path);
        assert_eq!((nested.dir_depth, nested.scope_dir.as_str()), (2, "pkg/web"));
        assert_eq!(nested.precedence, 30);
        assert_eq!((top.dir_depth, top.scope_dir.as_str()), (0, ""));
        assert_eq!(top.precedence, 10);
    }

    #[test]
    fn parser_reports_missing_file() {
        let tmp = TempDir::new().unwrap();
        let session = DiscoverySession::new();
        let parser = RuleParser::new(&session, &OsFileSource, tmp.path());
        let doc = parser
            .parse(&tmp.path().join("gone.mdc"), RuleFormat::Modern)
            .unwrap();
        assert!(!doc.is_readable());
        assert_eq!(doc.path, tmp.path().join("gone.mdc"));
    }
}
