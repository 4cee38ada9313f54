//! Error types for guidance discovery.
//!
//! Two tiers: [`ContextError`] aborts an execution mode and triggers a
//! fallback, while [`DocumentError`] is attached to a single document and
//! never stops the session.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Session-level failure. Ends the current execution mode.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// The project root could not be resolved or enumerated.
    #[error("project root {} is unreadable: {source}", path.display())]
    RootUnreadable {
        /// Root that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The host ran out of file handles or memory.
    #[error("resource exhausted at {}: {source}", path.display())]
    ResourceExhausted {
        /// Path being accessed when the limit was hit.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A worker task panicked or was cancelled.
    #[error("discovery worker failed: {0}")]
    Worker(String),
}

impl ContextError {
    /// Whether this failure should trigger the reduced-parallel fallback.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }

    /// Classify an I/O failure on the project root.
    pub fn from_root_io(path: &Path, source: io::Error) -> Self {
        if is_resource_exhaustion(&source) {
            Self::ResourceExhausted {
                path: path.to_path_buf(),
                source,
            }
        } else {
            Self::RootUnreadable {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Hand back ordinary errors for per-document handling; turn resource
/// exhaustion into a mode-level failure.
pub(crate) fn escalate(path: &Path, err: io::Error) -> Result<io::Error, ContextError> {
    if is_resource_exhaustion(&err) {
        Err(ContextError::ResourceExhausted {
            path: path.to_path_buf(),
            source: err,
        })
    } else {
        Ok(err)
    }
}

#[cfg(unix)]
const RESOURCE_OS_ERRORS: &[i32] = &[
    23, // ENFILE
    24, // EMFILE
];

#[cfg(windows)]
const RESOURCE_OS_ERRORS: &[i32] = &[
    4, // ERROR_TOO_MANY_OPEN_FILES
    8, // ERROR_NOT_ENOUGH_MEMORY
];

#[cfg(not(any(unix, windows)))]
const RESOURCE_OS_ERRORS: &[i32] = &[];

/// Whether an I/O error means the process hit a handle or memory limit.
pub fn is_resource_exhaustion(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::OutOfMemory
        || err
            .raw_os_error()
            .is_some_and(|code| RESOURCE_OS_ERRORS.contains(&code))
}

/// Problem recorded against one document. The session carries on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DocumentError {
    /// The document could not be read.
    #[error("cannot read {}: {message}", path.display())]
    Unreadable {
        /// Document path.
        path: PathBuf,
        /// I/O error text.
        message: String,
    },

    /// The document exceeds the configured size cap.
    #[error("{} is too large ({size} bytes > {max} bytes)", path.display())]
    TooLarge {
        /// Document path.
        path: PathBuf,
        /// Actual size.
        size: u64,
        /// Configured maximum.
        max: u64,
    },

    /// An import directive names a file that cannot be resolved or read.
    #[error("import @{token} in {} cannot be resolved: {reason}", importer.display())]
    MissingImport {
        /// Document containing the directive.
        importer: PathBuf,
        /// Directive text after the sigil.
        token: String,
        /// Why resolution failed.
        reason: String,
    },

    /// An import directive points back into the active import chain.
    #[error("import cycle: {} imports {}", importer.display(), target.display())]
    ImportCycle {
        /// Document containing the directive.
        importer: PathBuf,
        /// Document already on the import chain.
        target: PathBuf,
    },

    /// An import would nest deeper than allowed.
    #[error("import @{token} in {} exceeds max depth {max}", importer.display())]
    DepthExceeded {
        /// Document containing the directive.
        importer: PathBuf,
        /// Directive text after the sigil.
        token: String,
        /// Configured maximum depth.
        max: usize,
    },

    /// The header block of a rule document is malformed.
    #[error("malformed header in {}: {message}", path.display())]
    MalformedHeader {
        /// Document path.
        path: PathBuf,
        /// What was wrong.
        message: String,
    },

    /// A glob pattern failed to compile.
    #[error("invalid glob {pattern:?} in {}: {message}", path.display())]
    InvalidGlob {
        /// Document path.
        path: PathBuf,
        /// Offending pattern.
        pattern: String,
        /// Compiler message.
        message: String,
    },

    /// The session deadline passed before the document was read.
    #[error("deadline expired before {} was read", path.display())]
    DeadlineExpired {
        /// Document path.
        path: PathBuf,
    },
}

impl DocumentError {
    /// Whether the document carrying this error has no usable content.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Unreadable { .. } | Self::TooLarge { .. } | Self::DeadlineExpired { .. }
        )
    }

    pub(crate) fn unreadable(path: &Path, err: &io::Error) -> Self {
        Self::Unreadable {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_memory_is_resource_exhaustion() {
        let err = io::Error::from(io::ErrorKind::OutOfMemory);
        assert!(is_resource_exhaustion(&err));
    }

    #[cfg(unix)]
    #[test]
    fn emfile_is_resource_exhaustion() {
        let err = io::Error::from_raw_os_error(24);
        assert!(is_resource_exhaustion(&err));
    }

    #[test]
    fn not_found_is_not_resource_exhaustion() {
        let err = io::Error::from(io::ErrorKind::NotFound);
        assert!(!is_resource_exhaustion(&err));
    }

    #[test]
    fn root_io_classification() {
        let root = Path::new("/p");
        let err = ContextError::from_root_io(root, io::Error::from(io::ErrorKind::OutOfMemory));
        assert!(err.is_resource_exhaustion());

        let err = ContextError::from_root_io(root, io::Error::from(io::ErrorKind::NotFound));
        assert!(!err.is_resource_exhaustion());
        assert!(err.to_string().contains("/p"));
    }

    #[test]
    fn escalate_passes_through_ordinary_errors() {
        let passed = escalate(Path::new("/a"), io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(passed.is_ok());
        let escalated = escalate(Path::new("/a"), io::Error::from(io::ErrorKind::OutOfMemory));
        assert!(escalated.is_err());
    }

    #[test]
    fn fatal_classification() {
        let p = PathBuf::from("/x");
        assert!(DocumentError::DeadlineExpired { path: p.clone() }.is_fatal());
        assert!(
            !DocumentError::ImportCycle {
                importer: p.clone(),
                target: p
            }
            .is_fatal()
        );
    }

    #[test]
    fn display_messages() {
        let err = DocumentError::TooLarge {
            path: PathBuf::from("/big.md"),
            size: 2048,
            max: 1024,
        };
        assert_eq!(err.to_string(), "/big.md is too large (2048 bytes > 1024 bytes)");

        let err = DocumentError::DepthExceeded {
            importer: PathBuf::from("/a.md"),
            token: "deep.md".into(),
            max: 5,
        };
        assert!(err.to_string().contains("@deep.md"));
    }
}
