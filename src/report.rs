use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::EditError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyStatus {
    Applied,
    Created,
    Deleted,
    Skipped,
    Failed,
}

impl ApplyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplyStatus::Applied => "applied",
            ApplyStatus::Created => "created",
            ApplyStatus::Deleted => "deleted",
            ApplyStatus::Skipped => "skipped",
            ApplyStatus::Failed => "failed",
        }
    }

    pub fn is_change(self) -> bool {
        matches!(
            self,
            ApplyStatus::Applied | ApplyStatus::Created | ApplyStatus::Deleted
        )
    }
}

impl fmt::Display for ApplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text before and after an edit, kept for previews.
#[derive(Debug, Clone, Default)]
pub struct Preview {
    pub before: String,
    pub after: String,
}

/// Outcome for one file directive.
#[derive(Debug)]
pub struct ApplyResult {
    /// Path as written in the diff.
    pub path: PathBuf,
    /// Absolute path under the project root, once resolution succeeded.
    pub resolved: Option<PathBuf>,
    pub action: &'static str,
    pub status: ApplyStatus,
    pub error: Option<EditError>,
    pub backup: Option<PathBuf>,
    pub encoding: Option<&'static str>,
    pub encoding_uncertain: bool,
    /// e.g. "40 -> 42 line(s), 3 operation(s)".
    pub summary: Option<String>,
    pub preview: Option<Preview>,
}

impl ApplyResult {
    pub fn new(path: impl Into<PathBuf>, action: &'static str, status: ApplyStatus) -> Self {
        Self {
            path: path.into(),
            resolved: None,
            action,
            status,
            error: None,
            backup: None,
            encoding: None,
            encoding_uncertain: false,
            summary: None,
            preview: None,
        }
    }

    pub fn failed(path: impl Into<PathBuf>, action: &'static str, error: EditError) -> Self {
        let mut result = Self::new(path, action, ApplyStatus::Failed);
        result.error = Some(error);
        result
    }

    pub fn error_kind(&self) -> Option<&'static str> {
        self.error.as_ref().map(EditError::kind)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportCounts {
    pub applied: usize,
    pub created: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for ReportCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "applied={}, created={}, deleted={}, skipped={}, failed={}",
            self.applied, self.created, self.deleted, self.skipped, self.failed
        )
    }
}

/// Per-file outcomes of one batch, in diff order.
#[derive(Debug)]
pub struct BatchReport {
    pub root: PathBuf,
    pub dry_run: bool,
    pub results: Vec<ApplyResult>,
}

impl BatchReport {
    pub fn counts(&self) -> ReportCounts {
        let mut counts = ReportCounts::default();
        for result in &self.results {
            match result.status {
                ApplyStatus::Applied => counts.applied += 1,
                ApplyStatus::Created => counts.created += 1,
                ApplyStatus::Deleted => counts.deleted += 1,
                ApplyStatus::Skipped => counts.skipped += 1,
                ApplyStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Paths a downstream synchronizer should stage.
    pub fn changed_paths(&self) -> Vec<&Path> {
        self.results
            .iter()
            .filter(|result| result.status.is_change())
            .map(|result| result.path.as_path())
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.results
            .iter()
            .any(|result| result.status == ApplyStatus::Failed)
    }

    pub fn result_for(&self, path: &Path) -> Option<&ApplyResult> {
        self.results.iter().find(|result| result.path == path)
    }

    pub fn to_document(&self) -> ReportDocument<'_> {
        ReportDocument {
            root: &self.root,
            dry_run: self.dry_run,
            counts: self.counts(),
            results: self.results.iter().map(ResultRow::from).collect(),
        }
    }
}

/// Serializable view of a [`BatchReport`].
#[derive(Debug, Serialize)]
pub struct ReportDocument<'a> {
    pub root: &'a Path,
    pub dry_run: bool,
    pub counts: ReportCounts,
    pub results: Vec<ResultRow<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ResultRow<'a> {
    pub path: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<&'a Path>,
    pub action: &'a str,
    pub status: ApplyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub encoding_uncertain: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<&'a str>,
}

impl<'a> From<&'a ApplyResult> for ResultRow<'a> {
    fn from(result: &'a ApplyResult) -> Self {
        ResultRow {
            path: &result.path,
            resolved: result.resolved.as_deref(),
            action: result.action,
            status: result.status,
            error_kind: result.error_kind(),
            error: result.error.as_ref().map(ToString::to_string),
            backup: result.backup.as_deref(),
            encoding: result.encoding,
            encoding_uncertain: result.encoding_uncertain,
            summary: result.summary.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BatchReport {
        let mut applied = ApplyResult::new("src/a.rs", "modify", ApplyStatus::Applied);
        applied.backup = Some(PathBuf::from("/p/src/a.rs.bak"));
        applied.encoding = Some("UTF-8");
        BatchReport {
            root: PathBuf::from("/p"),
            dry_run: false,
            results: vec![
                applied,
                ApplyResult::new("b.txt", "create", ApplyStatus::Created),
                ApplyResult::failed(
                    "c.txt",
                    "modify",
                    EditError::OutOfRange {
                        operation: "DELETE 9 x1".to_string(),
                        len: 3,
                    },
                ),
            ],
        }
    }

    #[test]
    fn counts_and_changed_paths() {
        let report = sample();
        let counts = report.counts();
        assert_eq!(counts.applied, 1);
        assert_eq!(counts.created, 1);
        assert_eq!(counts.failed, 1);
        assert!(report.has_failures());
        assert_eq!(
            report.changed_paths(),
            vec![Path::new("src/a.rs"), Path::new("b.txt")]
        );
        assert_eq!(
            counts.to_string(),
            "applied=1, created=1, deleted=0, skipped=0, failed=1"
        );
    }

    #[test]
    fn json_rows_carry_error_kind() {
        let report = sample();
        let value = serde_json::to_value(report.to_document()).expect("serializes");
        let rows = value["results"].as_array().expect("array");
        assert_eq!(rows[0]["status"], "applied");
        assert_eq!(rows[0]["backup"], "/p/src/a.rs.bak");
        assert!(rows[1].get("error").is_none());
        assert_eq!(rows[2]["error_kind"], "out_of_range");
        assert_eq!(value["counts"]["failed"], 1);
    }
}
