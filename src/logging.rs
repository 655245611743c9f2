use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::files::ProjectRoot;
use crate::report::ApplyResult;

const LOG_FILE: &str = "change_log.jsonl";
const MAX_ENTRIES: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeLogEntry {
    pub timestamp: String,
    pub command: String,
    pub path: PathBuf,
    pub action: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    #[serde(rename = "lines", default, skip_serializing_if = "Option::is_none")]
    pub line_info: Option<String>,
}

impl ChangeLogEntry {
    pub fn from_result(root: &ProjectRoot, command: &str, result: &ApplyResult) -> Self {
        Self {
            timestamp: now_rfc3339(),
            command: command.to_string(),
            path: result.path.clone(),
            action: result.action.to_string(),
            status: result.status.as_str().to_string(),
            error_kind: result.error_kind().map(str::to_string),
            backup: result
                .backup
                .as_deref()
                .map(|backup| root.display_path(backup).to_path_buf()),
            line_info: result.summary.clone(),
        }
    }
}

pub fn log_path(root: &ProjectRoot) -> PathBuf {
    root.state_dir().join(LOG_FILE)
}

pub fn record_change(root: &ProjectRoot, entry: &ChangeLogEntry) -> Result<()> {
    let dir = root.state_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir).with_context(|| format!("creating {dir:?}"))?;
    }
    let log_path = dir.join(LOG_FILE);
    let json = serde_json::to_string(entry)?;
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(&log_path)
        .with_context(|| format!("opening {log_path:?}"))?;
    writeln!(file, "{json}")?;
    truncate_log(&log_path)?;
    Ok(())
}

/// The last `limit` entries, oldest first. Lines that fail to parse are
/// skipped.
pub fn read_recent(root: &ProjectRoot, limit: usize) -> Result<Vec<ChangeLogEntry>> {
    let path = log_path(root);
    let file = match fs::File::open(&path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("reading {path:?}")),
    };
    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ChangeLogEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(err) => tracing::warn!(%err, "skipping unreadable change log line"),
        }
    }
    let skip = entries.len().saturating_sub(limit);
    Ok(entries.split_off(skip))
}

fn truncate_log(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("reading {path:?}"))?;
    let reader = BufReader::new(file);
    let lines: Vec<_> = reader.lines().collect::<Result<_, _>>()?;
    if lines.len() <= MAX_ENTRIES {
        return Ok(());
    }
    let keep = &lines[lines.len() - MAX_ENTRIES..];
    fs::write(path, keep.join("\n") + "\n")?;
    Ok(())
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ApplyStatus;
    use tempfile::tempdir;

    #[test]
    fn entries_round_trip_and_truncate() {
        let temp = tempdir().expect("temp dir");
        let root = ProjectRoot::open(temp.path()).expect("root");
        assert!(read_recent(&root, 5).expect("empty log").is_empty());

        let mut result = ApplyResult::new("src/a.rs", "modify", ApplyStatus::Applied);
        result.backup = Some(root.path().join("src/a.rs.bak"));
        result.summary = Some("3 -> 4 line(s), 1 operation(s)".to_string());
        for _ in 0..(MAX_ENTRIES + 3) {
            record_change(&root, &ChangeLogEntry::from_result(&root, "apply", &result))
                .expect("record");
        }

        let raw = fs::read_to_string(log_path(&root)).expect("read log");
        assert_eq!(raw.lines().count(), MAX_ENTRIES);

        let recent = read_recent(&root, 2).expect("recent");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].backup.as_deref(), Some(Path::new("src/a.rs.bak")));
        assert_eq!(recent[0].status, "applied");
        assert!(raw.contains("\"lines\":\"3 -> 4 line(s), 1 operation(s)\""));
    }
}
