//! Precedence merge.
//!
//! Turns resolved memory documents and parsed rules into ordered content
//! blocks plus an activation trace. Ordering is total:
//!
//! 1. level (`Enterprise`, `User`, `Project`)
//! 2. kind (memory before rules)
//! 3. rule precedence, ascending
//! 4. owning directory depth, descending
//! 5. discovery order
//!
//! Duplicates are detected by canonical path; the first candidate seen
//! keeps its place and later ones are traced as duplicates.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::errors::DocumentError;
use crate::matcher::RuleMatcher;
use crate::output::{
    ActivationTrace, BlockKind, ContentBlock, InclusionReason, MergedConfiguration, NoMatchReason,
    TraceEntry, TraceOutcome,
};
use crate::types::{ActivationClass, ChangedFilePath, ConfigLevel, MemoryDocument, RuleDocument};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct BlockRank {
    level: ConfigLevel,
    kind: BlockKind,
    precedence: u32,
    depth: Reverse<i32>,
    order: usize,
}

/// Merge documents into a configuration. Statistics are left at their
/// defaults for the caller to fill in.
pub fn merge(
    memory: &[Arc<MemoryDocument>],
    rules: &[Arc<RuleDocument>],
    changed: &[ChangedFilePath],
) -> MergedConfiguration {
    let mut first_seen: HashMap<&Path, BlockKind> = HashMap::new();
    let mut trace = ActivationTrace::default();
    let mut ranked: Vec<(BlockRank, ContentBlock)> = Vec::new();

    for (order, doc) in memory.iter().enumerate() {
        let mut entry = TraceEntry {
            origin: doc.path.clone(),
            kind: BlockKind::Memory,
            level: doc.level,
            outcome: TraceOutcome::Included {
                reason: InclusionReason::Memory,
            },
            diagnostics: doc.errors.clone(),
        };

        if !doc.is_readable() {
            entry.outcome = excluded_error(&doc.errors);
        } else if let Some(kind) = first_seen.get(doc.path.as_path()) {
            entry.outcome = TraceOutcome::ExcludedDuplicate { first_seen: *kind };
            entry.diagnostics.clear();
        } else {
            let _ = first_seen.insert(&doc.path, BlockKind::Memory);
            ranked.push((
                BlockRank {
                    level: doc.level,
                    kind: BlockKind::Memory,
                    precedence: 0,
                    depth: Reverse(0),
                    order,
                },
                ContentBlock {
                    origin: doc.path.clone(),
                    kind: BlockKind::Memory,
                    level: doc.level,
                    rule_format: None,
                    precedence: None,
                    description: None,
                    globs: Vec::new(),
                    always_apply: true,
                    text: doc.resolved.clone(),
                },
            ));
        }
        trace.push(entry);
    }

    for (order, doc) in rules.iter().enumerate() {
        let mut entry = TraceEntry {
            origin: doc.path.clone(),
            kind: BlockKind::Rule,
            level: ConfigLevel::Project,
            outcome: TraceOutcome::ExcludedNoMatch {
                reason: NoMatchReason::NoGlobs,
            },
            diagnostics: doc.errors.clone(),
        };

        if !doc.is_readable() {
            entry.outcome = excluded_error(&doc.errors);
            trace.push(entry);
            continue;
        }
        if let Some(kind) = first_seen.get(doc.path.as_path()) {
            entry.outcome = TraceOutcome::ExcludedDuplicate { first_seen: *kind };
            entry.diagnostics.clear();
            trace.push(entry);
            continue;
        }
        let _ = first_seen.insert(&doc.path, BlockKind::Rule);

        entry.outcome = select_rule(doc, changed);
        if entry.outcome.is_included() {
            ranked.push((
                BlockRank {
                    level: ConfigLevel::Project,
                    kind: BlockKind::Rule,
                    precedence: doc.precedence,
                    depth: Reverse(doc.dir_depth),
                    order,
                },
                ContentBlock {
                    origin: doc.path.clone(),
                    kind: BlockKind::Rule,
                    level: ConfigLevel::Project,
                    rule_format: Some(doc.format),
                    precedence: Some(doc.precedence),
                    description: doc.description.clone(),
                    globs: doc.globs.clone(),
                    always_apply: doc.activation == ActivationClass::Always,
                    text: doc.body.clone(),
                },
            ));
        }
        trace.push(entry);
    }

    ranked.sort_by_key(|(rank, _)| *rank);
    let blocks: Vec<ContentBlock> = ranked.into_iter().map(|(_, block)| block).collect();

    debug!(
        candidates = trace.len(),
        included = blocks.len(),
        changed = changed.len(),
        "merge complete"
    );

    MergedConfiguration {
        blocks,
        trace,
        ..MergedConfiguration::default()
    }
}

/// Decide whether a readable, first-seen rule is included.
fn select_rule(doc: &RuleDocument, changed: &[ChangedFilePath]) -> TraceOutcome {
    match doc.activation {
        ActivationClass::Manual => TraceOutcome::ExcludedNoMatch {
            reason: NoMatchReason::ManualOnly,
        },
        ActivationClass::Always => TraceOutcome::Included {
            reason: InclusionReason::AlwaysApply,
        },
        ActivationClass::Auto | ActivationClass::Agent => {
            let (matcher, _) = RuleMatcher::compile(&doc.globs);
            if matcher.is_empty() {
                return TraceOutcome::ExcludedNoMatch {
                    reason: NoMatchReason::NoGlobs,
                };
            }
            match matcher.first_match(changed, &doc.scope_dir) {
                Some(hit) => TraceOutcome::Included {
                    reason: InclusionReason::GlobMatched {
                        pattern: hit.pattern.to_owned(),
                        path: hit.path.as_str().to_owned(),
                    },
                },
                None => TraceOutcome::ExcludedNoMatch {
                    reason: NoMatchReason::NoGlobMatched,
                },
            }
        }
    }
}

fn excluded_error(errors: &[DocumentError]) -> TraceOutcome {
    let message = errors
        .iter()
        .find(|e| e.is_fatal())
        .map_or_else(|| "unreadable".to_owned(), ToString::to_string);
    TraceOutcome::ExcludedError { message }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::*;
    use crate::constants::DEFAULT_RULE_PRECEDENCE;
    use crate::types::RuleFormat;
    use assert_matches::assert_matches;

    fn memory(path: &str, level: ConfigLevel, text: &str) -> Arc<MemoryDocument> {
        Arc::new(MemoryDocument {
            path: PathBuf::from(path),
            level,
            raw: text.to_owned(),
            imports: Vec::new(),
            resolved: text.to_owned(),
            errors: Vec::new(),
        })
    }

    fn rule(path: &str, activation: ActivationClass, globs: &[&str]) -> RuleDocument {
        RuleDocument {
            path: PathBuf::from(path),
            format: RuleFormat::Modern,
            body: format!("body of {path}"),
            description: None,
            always_apply: activation == ActivationClass::Always,
            globs: globs.iter().map(|g| (*g).to_owned()).collect(),
            precedence: DEFAULT_RULE_PRECEDENCE,
            dir_depth: 0,
            scope_dir: String::new(),
            activation,
            references: Vec::new(),
            metadata: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    fn changed(items: &[&str]) -> Vec<ChangedFilePath> {
        items.iter().map(|p| ChangedFilePath::new(p)).collect()
    }

    fn origins(merged: &MergedConfiguration) -> Vec<String> {
        merged
            .blocks
            .iter()
            .map(|b| b.origin.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn memory_ordered_by_level() {
        let docs = vec![
            memory("/p/CLAUDE.md", ConfigLevel::Project, "project"),
            memory("/home/.claude/CLAUDE.md", ConfigLevel::User, "user"),
            memory("/etc/claude/CLAUDE.md", ConfigLevel::Enterprise, "enterprise"),
        ];
        let merged = merge(&docs, &[], &[]);
        let texts: Vec<_> = merged.blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["enterprise", "user", "project"]);
    }

    #[test]
    fn duplicate_path_included_once() {
        let a = memory("/p/CLAUDE.md", ConfigLevel::Project, "x");
        let merged = merge(&[Arc::clone(&a), a], &[], &[]);

        assert_eq!(merged.blocks.len(), 1);
        let outcomes: Vec<_> = merged.trace.outcomes_for(Path::new("/p/CLAUDE.md")).collect();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_included());
        assert_matches!(
            outcomes[1],
            TraceOutcome::ExcludedDuplicate {
                first_seen: BlockKind::Memory
            }
        );
    }

    #[test]
    fn always_rule_included_without_changes() {
        let rules = vec![Arc::new(rule("/p/.cursor/rules/a.mdc", ActivationClass::Always, &[]))];
        let merged = merge(&[], &rules, &[]);
        assert_eq!(merged.blocks.len(), 1);
        assert_matches!(
            merged.trace.outcome_for(Path::new("/p/.cursor/rules/a.mdc")),
            Some(TraceOutcome::Included {
                reason: InclusionReason::AlwaysApply
            })
        );
    }

    #[test]
    fn auto_rule_needs_glob_match() {
        let rules = vec![Arc::new(rule(
            "/p/.cursor/rules/ts.mdc",
            ActivationClass::Auto,
            &["src/**/*.ts"],
        ))];

        let hit = merge(&[], &rules, &changed(&["src/a/b.ts"]));
        assert_eq!(hit.blocks.len(), 1);
        assert_matches!(
            hit.trace.outcome_for(Path::new("/p/.cursor/rules/ts.mdc")),
            Some(TraceOutcome::Included {
                reason: InclusionReason::GlobMatched { pattern, path }
            }) if pattern == "src/**/*.ts" && path == "src/a/b.ts"
        );

        let miss = merge(&[], &rules, &changed(&["lib/a.ts"]));
        assert!(miss.blocks.is_empty());
        assert_matches!(
            miss.trace.outcome_for(Path::new("/p/.cursor/rules/ts.mdc")),
            Some(TraceOutcome::ExcludedNoMatch {
                reason: NoMatchReason::NoGlobMatched
            })
        );
    }

    #[test]
    fn manual_rule_never_included() {
        let rules = vec![Arc::new(rule("/p/m.mdc", ActivationClass::Manual, &["**"]))];
        let merged = merge(&[], &rules, &changed(&["a.ts"]));
        assert!(merged.blocks.is_empty());
        assert_matches!(
            merged.trace.outcome_for(Path::new("/p/m.mdc")),
            Some(TraceOutcome::ExcludedNoMatch {
                reason: NoMatchReason::ManualOnly
            })
        );
    }

    #[test]
    fn agent_rule_without_globs_excluded() {
        let rules = vec![Arc::new(rule("/p/agent.mdc", ActivationClass::Agent, &[]))];
        let merged = merge(&[], &rules, &changed(&["a.ts"]));
        assert_matches!(
            merged.trace.outcome_for(Path::new("/p/agent.mdc")),
            Some(TraceOutcome::ExcludedNoMatch {
                reason: NoMatchReason::NoGlobs
            })
        );
    }

    #[test]
    fn rules_ordered_by_precedence_then_depth_then_discovery() {
        let mut style = rule("/p/.cursor/rules/010-style.mdc", ActivationClass::Always, &[]);
        style.precedence = 10;
        let mut security = rule("/p/.cursor/rules/020-security.mdc", ActivationClass::Always, &[]);
        security.precedence = 20;
        let mut shallow = rule("/p/.cursor/rules/030-a.mdc", ActivationClass::Always, &[]);
        shallow.precedence = 30;
        let mut deep = rule("/p/web/.cursor/rules/030-b.mdc", ActivationClass::Always, &[]);
        deep.precedence = 30;
        deep.dir_depth = 1;
        let unnumbered = rule("/p/.cursor/rules/misc.mdc", ActivationClass::Always, &[]);

        let rules: Vec<_> = [unnumbered, shallow, security, deep, style]
            .into_iter()
            .map(Arc::new)
            .collect();
        let merged = merge(&[], &rules, &[]);

        assert_eq!(
            origins(&merged),
            vec![
                "/p/.cursor/rules/010-style.mdc",
                "/p/.cursor/rules/020-security.mdc",
                "/p/web/.cursor/rules/030-b.mdc",
                "/p/.cursor/rules/030-a.mdc",
                "/p/.cursor/rules/misc.mdc",
            ]
        );
    }

    #[test]
    fn memory_precedes_rules() {
        let docs = vec![memory("/p/CLAUDE.md", ConfigLevel::Project, "m")];
        let mut first = rule("/p/.cursor/rules/001-first.mdc", ActivationClass::Always, &[]);
        first.precedence = 1;
        let merged = merge(&docs, &[Arc::new(first)], &[]);
        let kinds: Vec<_> = merged.blocks.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BlockKind::Memory, BlockKind::Rule]);
    }

    #[test]
    fn unreadable_documents_traced_as_errors() {
        let gone = Arc::new(MemoryDocument::failed(
            PathBuf::from("/p/CLAUDE.md"),
            ConfigLevel::Project,
            DocumentError::DeadlineExpired {
                path: PathBuf::from("/p/CLAUDE.md"),
            },
        ));
        let merged = merge(&[gone], &[], &[]);
        assert!(merged.blocks.is_empty());
        assert_matches!(
            merged.trace.outcome_for(Path::new("/p/CLAUDE.md")),
            Some(TraceOutcome::ExcludedError { message }) if message.contains("deadline")
        );
    }

    #[test]
    fn every_candidate_traced_exactly_once() {
        let docs = vec![memory("/p/CLAUDE.md", ConfigLevel::Project, "m")];
        let rules: Vec<_> = [
            rule("/p/a.mdc", ActivationClass::Always, &[]),
            rule("/p/b.mdc", ActivationClass::Auto, &["*.rs"]),
            rule("/p/c.mdc", ActivationClass::Manual, &[]),
        ]
        .into_iter()
        .map(Arc::new)
        .collect();
        let merged = merge(&docs, &rules, &changed(&["x.py"]));
        assert_eq!(merged.trace.len(), 4);
        assert_eq!(merged.trace.included_count(), merged.blocks.len());
    }
}
