use std::fmt;
use std::path::{Path, PathBuf};

/// One line-addressed edit. Line numbers are 1-based and refer to the
/// original, unmodified file the diff was written against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOperation {
    Replace {
        start: usize,
        end: usize,
        lines: Vec<String>,
    },
    Delete {
        start: usize,
        count: usize,
    },
    /// `after == 0` inserts before the first line.
    Insert {
        after: usize,
        lines: Vec<String>,
    },
}

impl EditOperation {
    pub fn kind(&self) -> &'static str {
        match self {
            EditOperation::Replace { .. } => "replace",
            EditOperation::Delete { .. } => "delete",
            EditOperation::Insert { .. } => "insert",
        }
    }

    /// Inclusive original-line span consumed by a REPLACE or DELETE.
    pub fn span(&self) -> Option<(usize, usize)> {
        match *self {
            EditOperation::Replace { start, end, .. } => Some((start, end)),
            EditOperation::Delete { start, count } => Some((start, start + count - 1)),
            EditOperation::Insert { .. } => None,
        }
    }
}

impl fmt::Display for EditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditOperation::Replace { start, end, lines } => {
                write!(f, "REPLACE {start}-{end} ({} line(s))", lines.len())
            }
            EditOperation::Delete { start, count } => write!(f, "DELETE {start} x{count}"),
            EditOperation::Insert { after, lines } => {
                write!(f, "INSERT after {after} ({} line(s))", lines.len())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileDirective {
    Modify {
        path: PathBuf,
        operations: Vec<EditOperation>,
    },
    Create {
        path: PathBuf,
        content: Vec<String>,
        overwrite: bool,
    },
    DeleteFile {
        path: PathBuf,
    },
}

impl FileDirective {
    /// Whole-file replacement, for when line-addressed editing is impractical.
    pub fn whole_file(path: impl Into<PathBuf>, text: &str) -> Self {
        FileDirective::Create {
            path: path.into(),
            content: text.lines().map(str::to_string).collect(),
            overwrite: true,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            FileDirective::Modify { path, .. }
            | FileDirective::Create { path, .. }
            | FileDirective::DeleteFile { path } => path,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileDirective::Modify { .. } => "modify",
            FileDirective::Create { .. } => "create",
            FileDirective::DeleteFile { .. } => "delete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_span_covers_count() {
        let op = EditOperation::Delete { start: 4, count: 3 };
        assert_eq!(op.span(), Some((4, 6)));
        assert_eq!(op.to_string(), "DELETE 4 x3");
    }

    #[test]
    fn whole_file_requests_overwrite() {
        let directive = FileDirective::whole_file("a.txt", "one\ntwo\n");
        match directive {
            FileDirective::Create {
                content, overwrite, ..
            } => {
                assert_eq!(content, vec!["one", "two"]);
                assert!(overwrite);
            }
            other => panic!("unexpected directive {other:?}"),
        }
    }
}
