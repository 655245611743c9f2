use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::directive::{EditOperation, FileDirective};
use crate::error::EditError;
use crate::normalize::marker_view;

static FILE_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^={2,}\s*FILE:\s*(.+?)\s*={2,}$").expect("valid regex"));
static CREATE_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^={2,}\s*CREATE\s+FILE:\s*(.+?)\s*={2,}$").expect("valid regex")
});
static DELETE_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^={2,}\s*DELETE\s+FILE:\s*(.+?)\s*={2,}$").expect("valid regex")
});
static FILE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^={2,}\s*END\s+FILE\s*={2,}$").expect("valid regex"));
static OP_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^@@\s*END$").expect("valid regex"));
static OP_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^@@\s*(?P<args>.*?)\s*\b(?P<kind>REPLACE|DELETE|INSERT)\b\s*(?P<tail>.*)$")
        .expect("valid regex")
});
static RANGE_ARGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*-\s*(\d+)$").expect("valid regex"));

/// One file block of a diff document. A malformed block keeps its path so
/// the failure can be reported against the right file.
#[derive(Debug)]
pub struct ParsedBlock {
    pub path: PathBuf,
    pub label: &'static str,
    /// 1-based line of the block header in the diff text.
    pub header_line: usize,
    pub directive: Result<FileDirective, EditError>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DocumentSummary {
    pub files: usize,
    pub modify: usize,
    pub create: usize,
    pub delete_file: usize,
    pub malformed: usize,
    pub replace_ops: usize,
    pub delete_ops: usize,
    pub insert_ops: usize,
}

enum Header {
    Modify(String),
    Create(String),
    Delete(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Sentinel,
    Header,
    Eof,
}

struct OpScan {
    operations: Vec<EditOperation>,
    error: Option<EditError>,
    next: usize,
    stop: Stop,
}

enum Marker {
    Replace { start: usize, end: usize },
    Delete { start: usize, count: usize },
    Insert { after: usize },
}

/// Parses a diff document into file blocks, in document order.
///
/// Fails only when non-blank text contains no file block at all; every other
/// structural problem is scoped to the block it occurs in.
pub fn parse(text: &str) -> Result<Vec<ParsedBlock>, EditError> {
    let lines = split_diff_lines(text);
    let mut blocks = Vec::new();
    let mut idx = 0;

    while idx < lines.len() {
        let view = marker_view(lines[idx]);
        match classify_header(&view) {
            Some(Header::Modify(raw)) => {
                let (block, next) = parse_modify_block(&lines, idx, &raw);
                blocks.push(block);
                idx = next;
            }
            Some(Header::Create(raw)) => {
                let (block, next) = parse_create_block(&lines, idx, &raw);
                blocks.push(block);
                idx = next;
            }
            Some(Header::Delete(raw)) => {
                let header_line = idx + 1;
                let directive =
                    clean_path(&raw, header_line).map(|path| FileDirective::DeleteFile { path });
                blocks.push(ParsedBlock {
                    path: block_path(&raw),
                    label: "delete",
                    header_line,
                    directive,
                });
                idx += 1;
            }
            None => {
                if FILE_END.is_match(&view) {
                    debug!(line = idx + 1, "ignoring END FILE outside a block");
                }
                idx += 1;
            }
        }
    }

    if blocks.is_empty() && !text.trim().is_empty() {
        let has_ops = lines
            .iter()
            .any(|line| OP_MARKER.is_match(&marker_view(line)));
        let reason = if has_ops {
            "no file blocks found; operations need a === FILE: path === header"
        } else {
            "no file blocks found"
        };
        return Err(EditError::malformed(1, reason));
    }

    Ok(merge_modify_blocks(blocks))
}

/// Parses a bare operation list with no file headers, to be applied to a
/// file chosen by the caller.
pub fn parse_operations(text: &str) -> Result<Vec<EditOperation>, EditError> {
    let lines = split_diff_lines(text);
    let scan = scan_operations(&lines, 0);
    if let Some(err) = scan.error {
        return Err(err);
    }
    match scan.stop {
        Stop::Eof => Ok(scan.operations),
        Stop::Sentinel | Stop::Header => Err(EditError::malformed(
            scan.next.max(1),
            "file block markers found; parse this text as a full diff document",
        )),
    }
}

pub fn summarize(blocks: &[ParsedBlock]) -> DocumentSummary {
    let mut summary = DocumentSummary {
        files: blocks.len(),
        ..DocumentSummary::default()
    };
    for block in blocks {
        match &block.directive {
            Ok(FileDirective::Modify { operations, .. }) => {
                summary.modify += 1;
                for op in operations {
                    match op {
                        EditOperation::Replace { .. } => summary.replace_ops += 1,
                        EditOperation::Delete { .. } => summary.delete_ops += 1,
                        EditOperation::Insert { .. } => summary.insert_ops += 1,
                    }
                }
            }
            Ok(FileDirective::Create { .. }) => summary.create += 1,
            Ok(FileDirective::DeleteFile { .. }) => summary.delete_file += 1,
            Err(_) => summary.malformed += 1,
        }
    }
    summary
}

fn split_diff_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect()
}

fn classify_header(view: &str) -> Option<Header> {
    if let Some(caps) = CREATE_FILE.captures(view) {
        return Some(Header::Create(caps[1].to_string()));
    }
    if let Some(caps) = DELETE_FILE.captures(view) {
        return Some(Header::Delete(caps[1].to_string()));
    }
    FILE_START
        .captures(view)
        .map(|caps| Header::Modify(caps[1].to_string()))
}

fn clean_path(raw: &str, line: usize) -> Result<PathBuf, EditError> {
    let unquoted = raw.trim().trim_matches(['`', '\'', '"']).trim();
    let slashed = unquoted.replace('\\', "/");
    let cleaned = slashed.trim_start_matches("./");
    if cleaned.is_empty() {
        return Err(EditError::malformed(line, "file header has an empty path"));
    }
    Ok(PathBuf::from(cleaned))
}

fn parse_modify_block(lines: &[&str], header_idx: usize, raw: &str) -> (ParsedBlock, usize) {
    let header_line = header_idx + 1;
    let scan = scan_operations(lines, header_idx + 1);
    let mut error = scan.error;
    if scan.stop != Stop::Sentinel && error.is_none() {
        error = Some(EditError::malformed(
            header_line,
            format!("file block for {} is missing === END FILE ===", raw.trim()),
        ));
    }

    let directive = match (clean_path(raw, header_line), error) {
        (Err(err), _) | (Ok(_), Some(err)) => Err(err),
        (Ok(path), None) => Ok(FileDirective::Modify {
            path,
            operations: scan.operations,
        }),
    };
    let block = ParsedBlock {
        path: block_path(raw),
        label: "modify",
        header_line,
        directive,
    };
    (block, scan.next)
}

fn parse_create_block(lines: &[&str], header_idx: usize, raw: &str) -> (ParsedBlock, usize) {
    let header_line = header_idx + 1;
    let mut content = Vec::new();
    let mut idx = header_idx + 1;
    let mut closed = false;
    while idx < lines.len() {
        if FILE_END.is_match(&marker_view(lines[idx])) {
            closed = true;
            idx += 1;
            break;
        }
        content.push(lines[idx].to_string());
        idx += 1;
    }

    let directive = if closed {
        clean_path(raw, header_line).map(|path| FileDirective::Create {
            path,
            content,
            overwrite: false,
        })
    } else {
        Err(EditError::malformed(
            header_line,
            format!("create block for {} is missing === END FILE ===", raw.trim()),
        ))
    };
    let block = ParsedBlock {
        path: block_path(raw),
        label: "create",
        header_line,
        directive,
    };
    (block, idx)
}

fn block_path(raw: &str) -> PathBuf {
    clean_path(raw, 0).unwrap_or_else(|_| PathBuf::from(raw.trim()))
}

/// Reads operations until the closing sentinel, the next file header, or
/// the end of the text. Only the first error is kept; scanning continues so
/// the block boundary is still found.
fn scan_operations(lines: &[&str], from: usize) -> OpScan {
    let mut operations = Vec::new();
    let mut error: Option<EditError> = None;
    let mut idx = from;

    while idx < lines.len() {
        let view = marker_view(lines[idx]);
        if FILE_END.is_match(&view) {
            return OpScan {
                operations,
                error,
                next: idx + 1,
                stop: Stop::Sentinel,
            };
        }
        if classify_header(&view).is_some() {
            return OpScan {
                operations,
                error,
                next: idx,
                stop: Stop::Header,
            };
        }
        if !view.starts_with("@@") {
            idx += 1;
            continue;
        }
        if OP_END.is_match(&view) {
            debug!(line = idx + 1, "ignoring @@ END without an open operation");
            idx += 1;
            continue;
        }

        let marker_line = idx + 1;
        let marker = match parse_marker(&view, marker_line) {
            Ok(marker) => marker,
            Err(err) => {
                error.get_or_insert(err);
                idx += 1;
                continue;
            }
        };

        let (start, end, after) = match marker {
            Marker::Delete { start, count } => {
                operations.push(EditOperation::Delete { start, count });
                idx += 1;
                continue;
            }
            Marker::Replace { start, end } => (start, end, None),
            Marker::Insert { after } => (0, 0, Some(after)),
        };

        let mut content = Vec::new();
        let mut closed = false;
        idx += 1;
        while idx < lines.len() {
            let inner = marker_view(lines[idx]);
            if OP_END.is_match(&inner) {
                closed = true;
                idx += 1;
                break;
            }
            if FILE_END.is_match(&inner) || classify_header(&inner).is_some() {
                break;
            }
            content.push(lines[idx].to_string());
            idx += 1;
        }

        let operation = match after {
            Some(after) => EditOperation::Insert {
                after,
                lines: content,
            },
            None => EditOperation::Replace {
                start,
                end,
                lines: content,
            },
        };
        if !closed {
            error.get_or_insert(EditError::malformed(
                marker_line,
                format!("{} is missing its @@ END marker", marker_label(&operation)),
            ));
        }
        operations.push(operation);
    }

    OpScan {
        operations,
        error,
        next: idx,
        stop: Stop::Eof,
    }
}

fn marker_label(op: &EditOperation) -> String {
    match op {
        EditOperation::Replace { start, end, .. } => format!("REPLACE {start}-{end}"),
        EditOperation::Delete { start, count } => format!("DELETE {start} {count}"),
        EditOperation::Insert { after, .. } => format!("INSERT {after}"),
    }
}

fn parse_marker(view: &str, line: usize) -> Result<Marker, EditError> {
    let Some(caps) = OP_MARKER.captures(view) else {
        return Err(EditError::malformed(
            line,
            format!("unrecognized operation marker '{view}'"),
        ));
    };
    let args = caps.name("args").map_or("", |m| m.as_str()).trim();
    let tail = caps.name("tail").map_or("", |m| m.as_str()).trim();
    let kind = caps["kind"].to_ascii_uppercase();

    match kind.as_str() {
        "REPLACE" => {
            expect_empty(tail, "REPLACE", line)?;
            let Some(range) = RANGE_ARGS.captures(args) else {
                return Err(EditError::malformed(
                    line,
                    format!("REPLACE expects 'start-end', found '{args}'"),
                ));
            };
            let start = parse_number(&range[1], "REPLACE start", line)?;
            let end = parse_number(&range[2], "REPLACE end", line)?;
            if start == 0 {
                return Err(EditError::malformed(line, "REPLACE start must be 1 or greater"));
            }
            if end < start {
                return Err(EditError::malformed(
                    line,
                    format!("REPLACE range {start}-{end} ends before it starts"),
                ));
            }
            Ok(Marker::Replace { start, end })
        }
        "DELETE" => {
            let start = parse_number(args, "DELETE start", line)?;
            if tail.is_empty() {
                return Err(EditError::malformed(line, "DELETE expects 'start count'"));
            }
            let count = parse_number(tail, "DELETE count", line)?;
            if start == 0 {
                return Err(EditError::malformed(line, "DELETE start must be 1 or greater"));
            }
            if count == 0 {
                return Err(EditError::malformed(line, "DELETE count must be 1 or greater"));
            }
            Ok(Marker::Delete { start, count })
        }
        _ => {
            expect_empty(tail, "INSERT", line)?;
            let after = parse_number(args, "INSERT position", line)?;
            Ok(Marker::Insert { after })
        }
    }
}

fn expect_empty(tail: &str, kind: &str, line: usize) -> Result<(), EditError> {
    if tail.is_empty() {
        Ok(())
    } else {
        Err(EditError::malformed(
            line,
            format!("unexpected '{tail}' after {kind}"),
        ))
    }
}

fn parse_number(raw: &str, what: &str, line: usize) -> Result<usize, EditError> {
    if raw.is_empty() {
        return Err(EditError::malformed(line, format!("{what} is missing")));
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EditError::malformed(
            line,
            format!("{what} '{raw}' is not a non-negative integer"),
        ));
    }
    raw.parse::<usize>()
        .map_err(|_| EditError::malformed(line, format!("{what} '{raw}' is out of range")))
}

/// Repeated MODIFY blocks for one path become a single directive with the
/// operations in document order.
fn merge_modify_blocks(blocks: Vec<ParsedBlock>) -> Vec<ParsedBlock> {
    let mut merged: Vec<ParsedBlock> = Vec::with_capacity(blocks.len());
    let mut seen: HashMap<PathBuf, usize> = HashMap::new();

    for block in blocks {
        if block.label != "modify" {
            merged.push(block);
            continue;
        }
        let Some(&slot) = seen.get(&block.path) else {
            seen.insert(block.path.clone(), merged.len());
            merged.push(block);
            continue;
        };

        let existing = &mut merged[slot];
        let previous = std::mem::replace(
            &mut existing.directive,
            Err(EditError::malformed(0, "placeholder")),
        );
        existing.directive = match (previous, block.directive) {
            (Err(err), _) | (Ok(_), Err(err)) => Err(err),
            (
                Ok(FileDirective::Modify {
                    path,
                    mut operations,
                }),
                Ok(FileDirective::Modify {
                    operations: more, ..
                }),
            ) => {
                operations.extend(more);
                Ok(FileDirective::Modify { path, operations })
            }
            (Ok(first), Ok(_)) => Ok(first),
        };
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modify_ops(block: &ParsedBlock) -> &[EditOperation] {
        match &block.directive {
            Ok(FileDirective::Modify { operations, .. }) => operations,
            other => panic!("expected modify directive, got {other:?}"),
        }
    }

    fn error_line(block: &ParsedBlock) -> usize {
        match &block.directive {
            Err(EditError::MalformedDiff { line, .. }) => *line,
            other => panic!("expected malformed block, got {other:?}"),
        }
    }

    #[test]
    fn parses_all_directive_kinds() {
        let text = "\
Here are the changes:
