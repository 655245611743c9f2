use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failure scoped to a single file directive. Recorded in that file's
/// [`ApplyResult`](crate::report::ApplyResult); never aborts sibling files.
#[derive(Debug, Error)]
pub enum EditError {
    #[error("malformed diff at line {line}: {reason}")]
    MalformedDiff { line: usize, reason: String },
    #[error("{operation} is out of range for a file with {len} line(s)")]
    OutOfRange { operation: String, len: usize },
    #[error("conflicting operations: {first} overlaps {second}")]
    ConflictingOperations { first: String, second: String },
    #[error("no clean decode found; best guess {encoding} would be lossy")]
    EncodingUncertain { encoding: &'static str },
    #[error("{encoding} cannot represent the new content")]
    Unrepresentable { encoding: &'static str },
    #[error("suspected binary file")]
    BinaryFileRejected,
    #[error("{} already exists; overwrite was not requested", .0.display())]
    AlreadyExists(PathBuf),
    #[error("{} not found{}", .path.display(), suggestion_hint(.suggestion.as_deref()))]
    NotFound {
        path: PathBuf,
        suggestion: Option<PathBuf>,
    },
    #[error("refusing path outside the project root: {}", .0.display())]
    UnsafePath(PathBuf),
    #[error("{action} {}: {source}", .path.display())]
    IoFailure {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("verification '{verifier}' failed: {message}")]
    VerificationFailed { verifier: String, message: String },
}

impl EditError {
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        EditError::MalformedDiff {
            line,
            reason: reason.into(),
        }
    }

    pub fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        EditError::IoFailure {
            action,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Stable label used in reports and the change log.
    pub fn kind(&self) -> &'static str {
        match self {
            EditError::MalformedDiff { .. } => "malformed_diff",
            EditError::OutOfRange { .. } => "out_of_range",
            EditError::ConflictingOperations { .. } => "conflicting_operations",
            EditError::EncodingUncertain { .. } => "encoding_uncertain",
            EditError::Unrepresentable { .. } => "unrepresentable",
            EditError::BinaryFileRejected => "binary_file_rejected",
            EditError::AlreadyExists(_) => "already_exists",
            EditError::NotFound { .. } => "not_found",
            EditError::UnsafePath(_) => "unsafe_path",
            EditError::IoFailure { .. } => "io_failure",
            EditError::VerificationFailed { .. } => "verification_failed",
        }
    }
}

fn suggestion_hint(suggestion: Option<&Path>) -> String {
    match suggestion {
        Some(path) => format!("; did you mean {}?", path.display()),
        None => String::new(),
    }
}

/// Failure that makes the whole batch meaningless. Raised before any file
/// is touched.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("project root {} is not accessible: {source}", .path.display())]
    RootInaccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("project root {} is not a directory", .0.display())]
    RootNotDirectory(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_mentions_suggestion() {
        let err = EditError::NotFound {
            path: PathBuf::from("src/mian.rs"),
            suggestion: Some(PathBuf::from("src/main.rs")),
        };
        assert_eq!(
            err.to_string(),
            "src/mian.rs not found; did you mean src/main.rs?"
        );
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn malformed_reports_line() {
        let err = EditError::malformed(12, "missing @@ END");
        assert_eq!(err.to_string(), "malformed diff at line 12: missing @@ END");
    }
}
