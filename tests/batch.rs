use std::fs;
use std::path::Path;

use linepatch::lifecycle::restore_latest_backup;
use linepatch::{
    ApplyOptions, ApplyStatus, BatchReport, EditError, EditOperation, FileDirective, ProjectRoot,
    apply_batch, apply_directives, parse,
};
use tempfile::{TempDir, tempdir};

fn numbered_lines(count: usize) -> String {
    (1..=count).map(|n| format!("line {n}\n")).collect()
}

fn write(root: &TempDir, name: &str, data: impl AsRef<[u8]>) {
    let path = root.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, data).expect("write");
}

fn read(root: &TempDir, name: &str) -> Vec<u8> {
    fs::read(root.path().join(name)).expect("read")
}

fn run(root: &TempDir, diff: &str, options: &ApplyOptions) -> BatchReport {
    let blocks = parse(diff).expect("diff parses");
    apply_batch(blocks, root.path(), options).expect("root is usable")
}

#[test]
fn conflicting_file_fails_while_sibling_applies() {
    let root = tempdir().expect("temp dir");
    let original = numbered_lines(20);
    write(&root, "a.txt", &original);
    write(&root, "b.txt", "first\nsecond\n");

    let diff = "\