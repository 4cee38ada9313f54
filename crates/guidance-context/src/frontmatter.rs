//! Rule header parsing.
//!
//! Modern rule files may open with a block delimited by `---` lines holding
//! `key: value` pairs. The parser handles the YAML subset rule files use in
//! practice:
//!
//! - Scalars, optionally quoted: `description: "Style guide"`
//! - Booleans: `alwaysApply: true`
//! - Inline lists: `globs: [src/**/*.ts, "*.tsx"]`
//! - Dash lists on following lines: `globs:` then `  - src/**`
//! - Comma strings: `globs: *.ts, *.tsx`
//!
//! Problems never abort parsing. Each one is collected in
//! [`RuleHeader::problems`] and the affected key falls back to its default.

use std::collections::BTreeMap;

use crate::constants::HEADER_DELIMITER;
use crate::types::ActivationClass;

/// Where the header block sits in a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HeaderSplit<'a> {
    /// No opening delimiter.
    Absent,
    /// Header text and the body after the closing delimiter.
    Present { header: &'a str, body: &'a str },
    /// Opening delimiter without a closing one.
    Unterminated,
}

/// Locate the header block. Leading whitespace and a byte-order mark before
/// the opening delimiter are ignored.
pub(crate) fn split_header(content: &str) -> HeaderSplit<'_> {
    let content = content.trim_start_matches('\u{feff}').trim_start();
    let mut lines = content.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return HeaderSplit::Absent;
    };
    if first.trim() != HEADER_DELIMITER {
        return HeaderSplit::Absent;
    }

    let header_start = first.len();
    let mut offset = header_start;
    for line in lines {
        if line.trim() == HEADER_DELIMITER {
            return HeaderSplit::Present {
                header: &content[header_start..offset],
                body: &content[offset + line.len()..],
            };
        }
        offset += line.len();
    }
    HeaderSplit::Unterminated
}

/// Interpreted header fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct RuleHeader {
    pub(crate) description: Option<String>,
    pub(crate) globs: Vec<String>,
    pub(crate) always_apply: Option<bool>,
    pub(crate) activation: Option<ActivationClass>,
    pub(crate) metadata: BTreeMap<String, String>,
    pub(crate) problems: Vec<String>,
}

/// Parse header text (between the delimiters).
pub(crate) fn parse_header(header: &str) -> RuleHeader {
    let mut parsed = RuleHeader::default();
    let lines: Vec<&str> = header.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        let line_no = i + 2;
        let line = lines[i].trim();
        i += 1;

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            parsed
                .problems
                .push(format!("line {line_no}: expected `key: value`, got {line:?}"));
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "description" => match unquote(value) {
                Ok(v) if v.is_empty() => {}
                Ok(v) => parsed.description = Some(v),
                Err(msg) => parsed.problems.push(format!("description: {msg}")),
            },
            "globs" | "glob" => match parse_list(value, &lines, &mut i) {
                Ok(items) => parsed.globs = items,
                Err(msg) => parsed.problems.push(format!("{key}: {msg}")),
            },
            "alwaysApply" | "always_apply" => {
                match unquote(value).ok().and_then(|v| parse_bool(&v)) {
                    Some(b) => parsed.always_apply = Some(b),
                    None => parsed
                        .problems
                        .push(format!("{key}: expected true or false, got {value:?}")),
                }
            }
            "type" | "activation" => {
                let marker = unquote(value)
                    .ok()
                    .and_then(|v| ActivationClass::from_marker(&v));
                match marker {
                    Some(class) => parsed.activation = Some(class),
                    None => parsed
                        .problems
                        .push(format!("{key}: unknown rule type {value:?}")),
                }
            }
            _ => {
                let stored = if value.is_empty() {
                    match parse_list(value, &lines, &mut i) {
                        Ok(items) => items.join(", "),
                        Err(msg) => {
                            parsed.problems.push(format!("{key}: {msg}"));
                            continue;
                        }
                    }
                } else {
                    value.to_owned()
                };
                let _ = parsed.metadata.insert(key.to_owned(), stored);
            }
        }
    }

    parsed
}

/// Parse a list value: inline `[a, b]`, dash items on the following lines,
/// or a comma-separated string.
fn parse_list(value: &str, lines: &[&str], i: &mut usize) -> Result<Vec<String>, String> {
    if let Some(rest) = value.strip_prefix('[') {
        let inner = rest
            .strip_suffix(']')
            .ok_or_else(|| "unterminated list".to_owned())?;
        return split_items(inner);
    }

    if !value.is_empty() {
        return split_items(value);
    }

    let mut items = Vec::new();
    while *i < lines.len() {
        let trimmed = lines[*i].trim();
        let Some(item) = trimmed.strip_prefix('-') else {
            break;
        };
        *i += 1;
        let item = unquote(item.trim())?;
        if !item.is_empty() {
            items.push(item);
        }
    }
    Ok(items)
}

/// Split on commas outside `{}` groups so brace alternations stay intact.
fn split_items(value: &str) -> Result<Vec<String>, String> {
    let mut items = Vec::new();
    let mut depth = 0_i32;
    let mut start = 0;

    for (idx, c) in value.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            ',' if depth == 0 => {
                push_item(&value[start..idx], &mut items)?;
                start = idx + 1;
            }
            _ => {}
        }
    }
    push_item(&value[start..], &mut items)?;
    Ok(items)
}

fn push_item(raw: &str, items: &mut Vec<String>) -> Result<(), String> {
    let item = unquote(raw)?;
    if !item.is_empty() {
        items.push(item);
    }
    Ok(())
}

/// Remove matching surrounding quotes.
fn unquote(s: &str) -> Result<String, String> {
    let trimmed = s.trim();
    for quote in ['"', '\''] {
        if let Some(rest) = trimmed.strip_prefix(quote) {
            return rest
                .strip_suffix(quote)
                .map(str::to_owned)
                .ok_or_else(|| format!("unterminated quote in {trimmed:?}"));
        }
    }
    Ok(trimmed.to_owned())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_present_header() {
        let content = "---\ndescription: x\n---\nBody\n";
        assert_eq!(
            split_header(content),
            HeaderSplit::Present {
                header: "description: x\n",
                body: "Body\n",
            }
        );
    }

    #[test]
    fn split_without_header() {
        assert_eq!(split_header("# Title\n---\n"), HeaderSplit::Absent);
        assert_eq!(split_header(""), HeaderSplit::Absent);
    }

    #[test]
    fn split_unterminated() {
        assert_eq!(split_header("---\nglobs: a\nbody"), HeaderSplit::Unterminated);
    }

    #[test]
    fn split_tolerates_leading_blank_lines_and_crlf() {
        let content = "\r\n---\r\nalwaysApply: true\r\n---\r\nBody";
        assert_eq!(
            split_header(content),
            HeaderSplit::Present {
                header: "alwaysApply: true\r\n",
                body: "Body",
            }
        );
    }

    #[test]
    fn inline_globs() {
        let h = parse_header("globs: [\"src/**/*.ts\", '*.tsx']\n");
        assert_eq!(h.globs, vec!["src/**/*.ts", "*.tsx"]);
        assert!(h.problems.is_empty());
    }

    #[test]
    fn dash_list_globs() {
        let h = parse_header("globs:\n  - src/**\n  - \"docs/*.md\"\nalwaysApply: false\n");
        assert_eq!(h.globs, vec!["src/**", "docs/*.md"]);
        assert_eq!(h.always_apply, Some(false));
    }

    #[test]
    fn comma_string_globs_keep_brace_groups() {
        let h = parse_header("globs: **/*.{ts,tsx}, *.md\n");
        assert_eq!(h.globs, vec!["**/*.{ts,tsx}", "*.md"]);
    }

    #[test]
    fn invalid_boolean_is_a_problem() {
        let h = parse_header("alwaysApply: sometimes\n");
        assert_eq!(h.always_apply, None);
        assert_eq!(h.problems.len(), 1);
        assert!(h.problems[0].contains("alwaysApply"));
    }

    #[test]
    fn type_marker() {
        assert_eq!(
            parse_header("type: manual\n").activation,
            Some(ActivationClass::Manual)
        );
        assert_eq!(parse_header("type: bogus\n").problems.len(), 1);
    }

    #[test]
    fn unknown_keys_become_metadata() {
        let h = parse_header("description: Style\nowner: web-team\n# comment\n");
        assert_eq!(h.description.as_deref(), Some("Style"));
        assert_eq!(h.metadata.get("owner").map(String::as_str), Some("web-team"));
    }

    #[test]
    fn malformed_lines_are_collected() {
        let h = parse_header("description: ok\nnot a pair\nglobs: [a, b\n");
        assert_eq!(h.description.as_deref(), Some("ok"));
        assert!(h.globs.is_empty());
        assert_eq!(h.problems.len(), 2);
    }

    #[test]
    fn unterminated_quote_is_a_problem() {
        let h = parse_header("description: \"open\n");
        assert!(h.description.is_none());
        assert_eq!(h.problems.len(), 1);
    }
}
