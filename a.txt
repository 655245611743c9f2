@@ 2-2 REPLACE
TWO
@@ END
=== END FILE ===
=== CREATE FILE: docs/new.md ===
# New
=== END FILE ===
";
    let options = ApplyOptions {
        dry_run: true,
        ..ApplyOptions::default()
    };
    let report = run(&root, diff, &options);

    assert!(report.dry_run);
    assert_eq!(report.counts().applied, 1);
    assert_eq!(report.counts().created, 1);
    assert!(report.results.iter().all(|result| result.backup.is_none()));
    assert_eq!(read(&root, "a.txt"), b"one\ntwo\n");
    assert!(!root.path().join("docs").exists());
    assert!(!root.path().join(".linepatch").exists());
}

#[test]
fn utf8_bom_and_crlf_survive_an_edit() {
    let root = tempdir().expect("temp dir");
    write(&root, "win.txt", b"\xEF\xBB\xBFa\r\nb\r\n");
    let diff = "=== FILE: win.txt ===\n@@ 2-2 REPLACE\nB\n@@ END\n=== END FILE ===\n";

    let report = run(&root, diff, &ApplyOptions::default());
    assert_eq!(report.results[0].status, ApplyStatus::Applied);
    assert_eq!(read(&root, "win.txt"), b"\xEF\xBB\xBFa\r\nB\r\n");
}

#[test]
fn paths_outside_the_root_are_rejected() {
    let root = tempdir().expect("temp dir");
    let diff = "=== CREATE FILE: ../escape.txt ===\nnope\n=== END FILE ===\n";

    let report = run(&root, diff, &ApplyOptions::default());
    assert_eq!(report.results[0].error_kind(), Some("unsafe_path"));
    let parent = root.path().parent().expect("parent");
    assert!(!parent.join("escape.txt").exists());
}

#[test]
fn bare_operations_and_restore() {
    let root = tempdir().expect("temp dir");
    write(&root, "notes.txt", "alpha\nbeta\n");

    let directive = FileDirective::Modify {
        path: "notes.txt".into(),
        operations: vec![EditOperation::Insert {
            after: 0,
            lines: vec!["title".to_string()],
        }],
    };
    let report =
        apply_directives(vec![directive], root.path(), &ApplyOptions::default()).expect("batch");
    assert_eq!(report.results[0].status, ApplyStatus::Applied);
    assert_eq!(read(&root, "notes.txt"), b"title\nalpha\nbeta\n");

    let project = ProjectRoot::open(root.path()).expect("root");
    let naming = ApplyOptions::default().backup;
    restore_latest_backup(&project, Path::new("notes.txt"), &naming).expect("restore");
    assert_eq!(read(&root, "notes.txt"), b"alpha\nbeta\n");
}

#[test]
fn json_document_lists_every_file() {
    let root = tempdir().expect("temp dir");
    write(&root, "x.txt", "x\n");
    let diff = "\