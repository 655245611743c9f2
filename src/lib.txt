@@ 5 INSERT
inserted
@@ END
@@ 1 DELETE 2
@@ 4-4 REPLACE
four
@@ END
=== END FILE ===
";
    let report = run(&root, diff, &ApplyOptions::default());
    assert_eq!(report.results[0].status, ApplyStatus::Applied);
    assert_eq!(
        String::from_utf8(read(&root, "src/lib.txt")).expect("utf-8"),
        "line 3\nfour\nline 5\ninserted\nline 6\n"
    );
}

#[test]
fn stale_line_numbers_fail_on_second_run() {
    let root = tempdir().expect("temp dir");
    write(&root, "short.txt", "a\nb\nc\n");
    let diff = "=== FILE: short.txt ===\n@@ 3 DELETE 1\n=== END FILE ===\n";

    let first = run(&root, diff, &ApplyOptions::default());
    assert_eq!(first.results[0].status, ApplyStatus::Applied);
    assert_eq!(read(&root, "short.txt"), b"a\nb\n");

    let second = run(&root, diff, &ApplyOptions::default());
    assert_eq!(second.results[0].error_kind(), Some("out_of_range"));
    assert_eq!(read(&root, "short.txt"), b"a\nb\n");
}

#[test]
fn create_on_existing_file_is_refused() {
    let root = tempdir().expect("temp dir");
    write(&root, "keep.txt", "precious\n");
    let diff = "=== CREATE FILE: keep.txt ===\nreplacement\n=== END FILE ===\n";

    let report = run(&root, diff, &ApplyOptions::default());
    assert!(matches!(
        report.results[0].error,
        Some(EditError::AlreadyExists(_))
    ));
    assert_eq!(read(&root, "keep.txt"), b"precious\n");
}

#[test]
fn dry_run_reports_without_writing() {
    let root = tempdir().expect("temp dir");
    write(&root, "a.txt", "one\ntwo\n");
    let diff = "\