use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::applier;
use crate::directive::{EditOperation, FileDirective};
use crate::encoding::{EncodedFile, EncodingStrategy};
use crate::error::{BatchError, EditError};
use crate::files::{self, BackupNaming, ProjectRoot};
use crate::logging::{self, ChangeLogEntry};
use crate::parser::ParsedBlock;
use crate::report::{ApplyResult, ApplyStatus, BatchReport, Preview};
use crate::verify::{Candidate, Verifier, standard_verifiers};

pub struct ApplyOptions {
    /// Run every step except backups and writes.
    pub dry_run: bool,
    /// Let CREATE replace existing files even without an explicit request.
    pub overwrite: bool,
    /// Accept lossy decodes for MODIFY instead of failing the file.
    pub allow_uncertain: bool,
    pub encoding: EncodingStrategy,
    pub backup: BackupNaming,
    pub verifiers: Vec<Box<dyn Verifier>>,
    pub change_log: bool,
    /// Keep before/after text on each result for previews.
    pub keep_preview: bool,
    /// Command name written to the change log.
    pub command: &'static str,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            overwrite: false,
            allow_uncertain: false,
            encoding: EncodingStrategy::default(),
            backup: BackupNaming::default(),
            verifiers: standard_verifiers(true, Some(0.1)),
            change_log: true,
            keep_preview: false,
            command: "apply",
        }
    }
}

/// Applies every parsed block under `root`. Blocks that failed to parse are
/// reported as failed without touching disk.
pub fn apply_batch(
    blocks: Vec<ParsedBlock>,
    root: impl AsRef<Path>,
    options: &ApplyOptions,
) -> Result<BatchReport, BatchError> {
    let items = blocks
        .into_iter()
        .map(|block| (block.path, block.label, block.directive))
        .collect();
    run_batch(items, root.as_ref(), options)
}

/// Same as [`apply_batch`] for directives built in code, such as a
/// whole-file retry via [`FileDirective::whole_file`].
pub fn apply_directives(
    directives: Vec<FileDirective>,
    root: impl AsRef<Path>,
    options: &ApplyOptions,
) -> Result<BatchReport, BatchError> {
    let items = directives
        .into_iter()
        .map(|directive| {
            (
                directive.path().to_path_buf(),
                directive.label(),
                Ok(directive),
            )
        })
        .collect();
    run_batch(items, root.as_ref(), options)
}

type BatchItem = (PathBuf, &'static str, Result<FileDirective, EditError>);

fn run_batch(
    items: Vec<BatchItem>,
    root: &Path,
    options: &ApplyOptions,
) -> Result<BatchReport, BatchError> {
    let root = ProjectRoot::open(root)?;
    let mut results = Vec::with_capacity(items.len());
    for (path, label, directive) in items {
        let result = match directive {
            Ok(directive) => apply_directive(&directive, &root, options),
            Err(err) => ApplyResult::failed(path, label, err),
        };
        match &result.error {
            Some(err) => warn!(path = %result.path.display(), kind = err.kind(), %err, "file failed"),
            None => info!(path = %result.path.display(), status = %result.status, "file processed"),
        }
        if options.change_log && !options.dry_run {
            let entry = ChangeLogEntry::from_result(&root, options.command, &result);
            if let Err(err) = logging::record_change(&root, &entry) {
                warn!(%err, "unable to append to change log");
            }
        }
        results.push(result);
    }
    Ok(BatchReport {
        root: root.path().to_path_buf(),
        dry_run: options.dry_run,
        results,
    })
}

pub fn apply_directive(
    directive: &FileDirective,
    root: &ProjectRoot,
    options: &ApplyOptions,
) -> ApplyResult {
    let outcome = match directive {
        FileDirective::Modify { path, operations } => modify_file(path, operations, root, options),
        FileDirective::Create {
            path,
            content,
            overwrite,
        } => create_file(path, content, *overwrite || options.overwrite, root, options),
        FileDirective::DeleteFile { path } => delete_file(path, root, options),
    };
    outcome.unwrap_or_else(|err| ApplyResult::failed(directive.path(), directive.label(), err))
}

fn modify_file(
    path: &Path,
    operations: &[EditOperation],
    root: &ProjectRoot,
    options: &ApplyOptions,
) -> Result<ApplyResult, EditError> {
    let target = root.resolve(path)?;
    let bytes = read_existing(path, &target, root)?;
    let file = options.encoding.detect_and_decode(&bytes)?;
    if file.decision.uncertain {
        // An accepted guess must still write the untouched lines back unchanged.
        let faithful = options.allow_uncertain
            && file.encode().is_ok_and(|data| data == bytes);
        if !faithful {
            return Err(EditError::EncodingUncertain {
                encoding: file.decision.encoding.name(),
            });
        }
    }

    let mut result = ApplyResult::new(path, "modify", ApplyStatus::Skipped);
    result.resolved = Some(target.clone());
    result.encoding = Some(file.decision.encoding.name());
    result.encoding_uncertain = file.decision.uncertain;
    if operations.is_empty() {
        result.summary = Some("no operations".to_string());
        return Ok(result);
    }

    let new_lines = applier::apply(&file.lines, operations)?;
    if new_lines == file.lines {
        result.summary = Some("content unchanged".to_string());
        return Ok(result);
    }
    let updated = file.with_lines(new_lines);
    let before = file.text();
    let after = updated.text();
    run_verifiers(&options.verifiers, path, Some(&before), &after)?;
    let data = updated.encode()?;

    if !options.dry_run {
        let permissions = fs::metadata(&target).map(|meta| meta.permissions());
        let backup = files::create_backup(&target, &options.backup.suffix)?;
        files::write_via_temp(&target, &data)?;
        if let Ok(permissions) = permissions {
            if let Err(err) = fs::set_permissions(&target, permissions) {
                warn!(path = %target.display(), %err, "unable to restore permissions");
            }
        }
        debug!(backup = %backup.display(), "backup saved");
        result.backup = Some(backup);
    }

    result.status = ApplyStatus::Applied;
    result.summary = Some(format!(
        "{} -> {} line(s), {} operation(s)",
        file.lines.len(),
        updated.lines.len(),
        operations.len()
    ));
    if options.keep_preview {
        result.preview = Some(Preview { before, after });
    }
    Ok(result)
}

fn create_file(
    path: &Path,
    content: &[String],
    overwrite: bool,
    root: &ProjectRoot,
    options: &ApplyOptions,
) -> Result<ApplyResult, EditError> {
    let target = root.resolve(path)?;
    let existing = match fs::symlink_metadata(&target) {
        Ok(meta) => Some(meta),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => return Err(EditError::io("inspecting", &target, err)),
    };
    if existing
        .as_ref()
        .is_some_and(|meta| !overwrite || meta.is_dir())
    {
        return Err(EditError::AlreadyExists(path.to_path_buf()));
    }

    let previous = match existing {
        Some(_) => {
            let bytes =
                fs::read(&target).map_err(|err| EditError::io("reading", &target, err))?;
            previous_layout(&options.encoding, &bytes, options.allow_uncertain)
        }
        None => None,
    };
    let (decision, newline) = match &previous {
        Some(file) => (file.decision, file.newline),
        None => (
            options.encoding.default_decision(),
            options.encoding.default_newline(),
        ),
    };
    let created = EncodedFile {
        lines: content.to_vec(),
        newline,
        final_newline: true,
        decision,
    };
    let before = previous.as_ref().map(EncodedFile::text);
    let after = created.text();
    run_verifiers(&options.verifiers, path, before.as_deref(), &after)?;
    let data = created.encode()?;

    let mut result = ApplyResult::new(path, "create", ApplyStatus::Created);
    result.resolved = Some(target.clone());
    result.encoding = Some(decision.encoding.name());
    if !options.dry_run {
        if existing.is_some() {
            result.backup = Some(files::create_backup(&target, &options.backup.suffix)?);
        }
        files::write_via_temp(&target, &data)?;
    }
    result.summary = Some(if existing.is_some() {
        format!("{} line(s), replaced existing file", content.len())
    } else {
        format!("{} line(s)", content.len())
    });
    if options.keep_preview {
        result.preview = Some(Preview {
            before: before.unwrap_or_default(),
            after,
        });
    }
    Ok(result)
}

/// Encoding and newline style of a file about to be overwritten, when they
/// can be trusted.
fn previous_layout(
    strategy: &EncodingStrategy,
    bytes: &[u8],
    allow_uncertain: bool,
) -> Option<EncodedFile> {
    match strategy.detect_and_decode(bytes) {
        Ok(file) if !file.decision.uncertain || allow_uncertain => Some(file),
        Ok(_) => None,
        Err(err) => {
            debug!(%err, "existing content not reusable as a layout");
            None
        }
    }
}

fn delete_file(
    path: &Path,
    root: &ProjectRoot,
    options: &ApplyOptions,
) -> Result<ApplyResult, EditError> {
    let target = root.resolve(path)?;
    if let Err(err) = fs::symlink_metadata(&target) {
        return Err(not_found_or_io(path, &target, root, err));
    }
    let backup = files::next_backup_path(&target, &options.backup.deleted_suffix);

    let mut result = ApplyResult::new(path, "delete", ApplyStatus::Deleted);
    result.resolved = Some(target.clone());
    if options.dry_run {
        result.summary = Some(format!(
            "would move to {}",
            root.display_path(&backup).display()
        ));
        return Ok(result);
    }
    fs::rename(&target, &backup).map_err(|err| EditError::io("moving to backup", &target, err))?;
    result.summary = Some(format!("moved to {}", root.display_path(&backup).display()));
    result.backup = Some(backup);
    Ok(result)
}

fn read_existing(path: &Path, target: &Path, root: &ProjectRoot) -> Result<Vec<u8>, EditError> {
    fs::read(target).map_err(|err| not_found_or_io(path, target, root, err))
}

fn not_found_or_io(
    path: &Path,
    target: &Path,
    root: &ProjectRoot,
    err: std::io::Error,
) -> EditError {
    if err.kind() == ErrorKind::NotFound {
        EditError::NotFound {
            path: path.to_path_buf(),
            suggestion: root.suggest(path),
        }
    } else {
        EditError::io("reading", target, err)
    }
}

fn run_verifiers(
    verifiers: &[Box<dyn Verifier>],
    path: &Path,
    original: Option<&str>,
    content: &str,
) -> Result<(), EditError> {
    let candidate = Candidate {
        path,
        original,
        content,
    };
    for verifier in verifiers {
        verifier
            .verify(&candidate)
            .map_err(|message| EditError::VerificationFailed {
                verifier: verifier.name().to_string(),
                message,
            })?;
    }
    Ok(())
}

/// Puts the newest backup of `path` back in place. A deleted file is moved
/// back from its `.deleted_bak` copy; a modified file gets the bytes of its
/// latest `.bak` copy. Returns the backup that was used.
pub fn restore_latest_backup(
    root: &ProjectRoot,
    path: &Path,
    naming: &BackupNaming,
) -> Result<PathBuf, EditError> {
    let target = root.resolve(path)?;
    let moved_aside = match fs::symlink_metadata(&target) {
        Ok(_) => None,
        Err(_) => naming.backups_of(&target, &naming.deleted_suffix).pop(),
    };
    if let Some(moved) = moved_aside {
        fs::rename(&moved, &target).map_err(|err| EditError::io("restoring", &target, err))?;
        return Ok(moved);
    }

    let Some(latest) = naming.backups_of(&target, &naming.suffix).pop() else {
        return Err(EditError::NotFound {
            path: files::backup_candidate(path, &naming.suffix, 0),
            suggestion: None,
        });
    };
    let data = fs::read(&latest).map_err(|err| EditError::io("reading", &latest, err))?;
    files::write_via_temp(&target, &data)?;
    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use tempfile::{TempDir, tempdir};

    fn project(files: &[(&str, &str)]) -> TempDir {
        let temp = tempdir().expect("temp dir");
        for (name, text) in files {
            put(&temp, name, text);
        }
        temp
    }

    fn put(temp: &TempDir, name: &str, data: impl AsRef<[u8]>) {
        let path = temp.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("dirs");
        }
        fs::write(path, data).expect("write");
    }

    fn run(temp: &TempDir, diff: &str, options: &ApplyOptions) -> BatchReport {
        let blocks = parser::parse(diff).expect("parses");
        apply_batch(blocks, temp.path(), options).expect("batch")
    }

    #[test]
    fn modify_backs_up_and_preserves_layout() {
        let temp = project(&[("src/app.txt", "one\r\ntwo\r\nthree\r\n")]);
        let diff = "=== FILE: src/app.txt ===\n@@ 2-2 REPLACE\nTWO\n@@ END\n=== END FILE ===\n";
        let report = run(&temp, diff, &ApplyOptions::default());

        let result = &report.results[0];
        assert_eq!(result.status, ApplyStatus::Applied, "{:?}", result.error);
        assert_eq!(
            fs::read(temp.path().join("src/app.txt")).expect("read"),
            b"one\r\nTWO\r\nthree\r\n"
        );
        let backup = result.backup.as_ref().expect("backup");
        assert_eq!(fs::read(backup).expect("backup"), b"one\r\ntwo\r\nthree\r\n");
        assert!(temp.path().join(".linepatch/change_log.jsonl").exists());
    }

    #[test]
    fn legacy_encoding_is_written_back() {
        // "가\n나\n" in EUC-KR
        let temp = project(&[]);
        put(&temp, "ko.txt", [0xB0u8, 0xA1, 0x0A, 0xB3, 0xAA, 0x0A]);
        let diff = "=== FILE: ko.txt ===\n@@ 1 INSERT\n다\n@@ END\n=== END FILE ===\n";
        let options = ApplyOptions {
            encoding: EncodingStrategy::default().with_detector_hint(false),
            ..ApplyOptions::default()
        };
        let report = run(&temp, diff, &options);
        assert_eq!(report.results[0].encoding, Some("EUC-KR"));
        assert_eq!(
            fs::read(temp.path().join("ko.txt")).expect("read"),
            [0xB0, 0xA1, 0x0A, 0xB4, 0xD9, 0x0A, 0xB3, 0xAA, 0x0A]
        );
    }

    #[test]
    fn dry_run_touches_nothing() {
        let temp = project(&[("a.txt", "a\nb\n"), ("gone.txt", "x\n")]);
        let diff = "\