//! Glob matching of rule patterns against changed paths.
//!
//! Patterns are case-sensitive and `*` never crosses a `/`. A pattern with
//! no `/` also matches a path's final component, so `*.ts` selects
//! `src/app/main.ts`. Rules owned by a subdirectory only see changed paths
//! under that subdirectory and match them both project-relative and
//! subdirectory-relative.

use globset::{GlobBuilder, GlobMatcher};

use crate::types::ChangedFilePath;

#[derive(Clone, Debug)]
struct CompiledPattern {
    source: String,
    matcher: GlobMatcher,
    match_basename: bool,
}

/// Compiled globs of one rule.
#[derive(Clone, Debug, Default)]
pub struct RuleMatcher {
    patterns: Vec<CompiledPattern>,
}

/// A pattern that failed to compile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidPattern {
    /// Pattern as written.
    pub pattern: String,
    /// Compiler message.
    pub message: String,
}

/// The first pattern/path pair that matched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobMatch<'a> {
    /// Pattern as written.
    pub pattern: &'a str,
    /// The changed path it matched.
    pub path: &'a ChangedFilePath,
}

impl RuleMatcher {
    /// Compile `globs`, returning the valid ones and a report of the rest.
    pub fn compile(globs: &[String]) -> (Self, Vec<InvalidPattern>) {
        let mut patterns = Vec::with_capacity(globs.len());
        let mut invalid = Vec::new();

        for glob in globs {
            let normalized = normalize_pattern(glob);
            if normalized.is_empty() {
                invalid.push(InvalidPattern {
                    pattern: glob.clone(),
                    message: "empty pattern".into(),
                });
                continue;
            }
            let built = GlobBuilder::new(&normalized)
                .literal_separator(true)
                .backslash_escape(true)
                .build();
            match built {
                Ok(compiled) => patterns.push(CompiledPattern {
                    source: glob.clone(),
                    match_basename: !normalized.contains('/'),
                    matcher: compiled.compile_matcher(),
                }),
                Err(err) => invalid.push(InvalidPattern {
                    pattern: glob.clone(),
                    message: err.kind().to_string(),
                }),
            }
        }

        (Self { patterns }, invalid)
    }

    /// Whether no valid pattern remains.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// First pattern (in declaration order) matching any changed path.
    ///
    /// `scope_dir` is the owning directory of the rule relative to the
    /// project root; empty for root-level rules.
    pub fn first_match<'a>(
        &'a self,
        changed: &'a [ChangedFilePath],
        scope_dir: &str,
    ) -> Option<GlobMatch<'a>> {
        for pattern in &self.patterns {
            for path in changed {
                if pattern.matches(path, scope_dir) {
                    return Some(GlobMatch {
                        pattern: &pattern.source,
                        path,
                    });
                }
            }
        }
        None
    }
}

impl CompiledPattern {
    fn matches(&self, path: &ChangedFilePath, scope_dir: &str) -> bool {
        let Some(scoped) = path.relative_to(scope_dir) else {
            return false;
        };
        self.matcher.is_match(path.as_str())
            || self.matcher.is_match(scoped)
            || (self.match_basename && self.matcher.is_match(path.file_name()))
    }
}

fn normalize_pattern(pattern: &str) -> String {
    let mut rest = pattern.trim();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    rest.trim_start_matches('/').to_owned()
}
