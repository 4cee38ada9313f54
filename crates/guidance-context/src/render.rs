//! Text rendering of a merged configuration.

use std::fmt::Write as _;

use crate::constants::DEFAULT_RULE_PRECEDENCE;
use crate::output::{BlockKind, ContentBlock, MergedConfiguration};
use crate::types::RuleFormat;

impl MergedConfiguration {
    /// Render all blocks as markdown with HTML-comment provenance headers.
    ///
    /// Memory blocks come under `# Memory`, rule blocks under `# Rules`.
    /// Returns an empty string when nothing was included.
    pub fn render(&self) -> String {
        let mut sections = Vec::new();

        let memory: Vec<&ContentBlock> = self.blocks_of(BlockKind::Memory).collect();
        if !memory.is_empty() {
            let mut section = String::from("# Memory\n");
            for block in memory {
                let _ = write!(
                    section,
                    "\n<!-- MEMORY: {} -->\n<!-- Source: {} -->\n{}\n",
                    block.level.as_str().to_ascii_uppercase(),
                    block.origin.display(),
                    block.text.trim_end(),
                );
            }
            sections.push(section);
        }

        let rules: Vec<&ContentBlock> = self.blocks_of(BlockKind::Rule).collect();
        if !rules.is_empty() {
            let mut section = String::from("# Rules\n");
            for block in rules {
                render_rule(&mut section, block);
            }
            sections.push(section);
        }

        sections.join("\n")
    }
}

fn render_rule(out: &mut String, block: &ContentBlock) {
    let format = match block.rule_format {
        Some(RuleFormat::Legacy) => "LEGACY",
        Some(RuleFormat::Modern) | None => "MODERN",
    };
    match block.precedence {
        Some(p) if p != DEFAULT_RULE_PRECEDENCE => {
            let _ = write!(out, "\n<!-- RULE: {format}, PRECEDENCE {p} -->\n");
        }
        _ => {
            let _ = write!(out, "\n<!-- RULE: {format} -->\n");
        }
    }
    let _ = writeln!(out, "<!-- Source: {} -->", block.origin.display());

    let mut details = Vec::new();
    if let Some(description) = &block.description {
        details.push(format!("Description: {description}"));
    }
    if !block.globs.is_empty() {
        details.push(format!("Globs: {}", block.globs.join(", ")));
    }
    if block.always_apply {
        details.push("Always applied".to_owned());
    }
    if !details.is_empty() {
        let _ = writeln!(out, "<!-- {} -->", details.join(" | "));
    }

    let _ = writeln!(out, "{}", block.text.trim_end());
}
