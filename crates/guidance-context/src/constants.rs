//! File names, limits, and platform locations used by discovery.

// =============================================================================
// File names
// =============================================================================

/// Memory document file name, looked up in every directory of the project chain.
pub const MEMORY_FILE_NAME: &str = "CLAUDE.md";

/// Directory under the user's home holding the user-level memory document.
pub const USER_MEMORY_DIR: &str = ".claude";

/// Legacy rule file name.
pub const LEGACY_RULES_FILE_NAME: &str = ".cursorrules";

/// Directory owning the modern rules directory.
pub const MODERN_RULES_PARENT_DIR: &str = ".cursor";

/// Modern rules directory inside [`MODERN_RULES_PARENT_DIR`].
pub const MODERN_RULES_DIR: &str = "rules";

/// Extension of modern rule files.
pub const MODERN_RULES_EXTENSION: &str = "mdc";

// =============================================================================
// Syntax
// =============================================================================

/// Sigil introducing an import directive in memory documents.
pub const IMPORT_SIGIL: char = '@';

/// Marker opening and closing the header block of a modern rule file.
pub const HEADER_DELIMITER: &str = "---";

// =============================================================================
// Limits
// =============================================================================

/// Deepest import nesting; the top-level document sits at depth 1.
pub const DEFAULT_MAX_IMPORT_DEPTH: usize = 5;

/// Precedence assigned to rules whose file name carries no numeric prefix.
pub const DEFAULT_RULE_PRECEDENCE: u32 = 999;

/// Worker count used after the parallel mode reports resource exhaustion.
pub const DEFAULT_REDUCED_POOL_SIZE: usize = 2;

/// Largest document read, in bytes.
pub const DEFAULT_MAX_DOCUMENT_BYTES: u64 = 1024 * 1024;

// =============================================================================
// Enterprise locations
// =============================================================================

/// Machine-wide policy directories for the current platform.
#[cfg(target_os = "windows")]
pub fn platform_enterprise_dirs() -> Vec<std::path::PathBuf> {
    use std::path::PathBuf;

    let program_data =
        std::env::var("PROGRAMDATA").unwrap_or_else(|_| "C:\\ProgramData".to_string());
    vec![
        PathBuf::from(&program_data).join("Claude"),
        PathBuf::from(&program_data).join("Anthropic").join("Claude"),
        PathBuf::from("C:\\Program Files\\Claude"),
        PathBuf::from("C:\\Program Files\\Anthropic\\Claude"),
    ]
}

/// Machine-wide policy directories for the current platform.
#[cfg(target_os = "macos")]
pub fn platform_enterprise_dirs() -> Vec<std::path::PathBuf> {
    [
        "/Library/Application Support/Claude",
        "/Library/Application Support/Anthropic/Claude",
        "/usr/local/etc/claude",
        "/opt/claude",
    ]
    .iter()
    .map(std::path::PathBuf::from)
    .collect()
}

/// Machine-wide policy directories for the current platform.
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub fn platform_enterprise_dirs() -> Vec<std::path::PathBuf> {
    [
        "/etc/claude",
        "/etc/anthropic/claude",
        "/usr/local/etc/claude",
        "/opt/claude/etc",
        "/usr/share/claude",
    ]
    .iter()
    .map(std::path::PathBuf::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enterprise_dirs_are_absolute() {
        let dirs = platform_enterprise_dirs();
        assert!(!dirs.is_empty());
        assert!(dirs.iter().all(|d| d.is_absolute()));
    }

    #[test]
    fn default_precedence_sorts_after_typical_prefixes() {
        assert!(DEFAULT_RULE_PRECEDENCE > 100);
    }
}
