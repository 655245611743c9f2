@@ 1-1 REPLACE
FIRST
@@ END
=== END FILE ===
";
    let report = run(&root, diff, &ApplyOptions::default());

    let a = report.result_for(Path::new("a.txt")).expect("a result");
    assert_eq!(a.status, ApplyStatus::Failed);
    assert!(matches!(
        a.error,
        Some(EditError::ConflictingOperations { .. })
    ));
    assert_eq!(read(&root, "a.txt"), original.as_bytes());
    assert!(!root.path().join("a.txt.bak").exists());

    let b = report.result_for(Path::new("b.txt")).expect("b result");
    assert_eq!(b.status, ApplyStatus::Applied, "{:?}", b.error);
    assert!(b.resolved.as_ref().is_some_and(|path| path.ends_with("b.txt")));
    assert_eq!(read(&root, "b.txt"), b"FIRST\nsecond\n");
    assert_eq!(read(&root, "b.txt.bak"), b"first\nsecond\n");

    assert!(report.has_failures());
    assert_eq!(report.changed_paths(), vec![Path::new("b.txt")]);
}

#[test]
fn operations_address_original_line_numbers() {
    let root = tempdir().expect("temp dir");
    write(&root, "src/lib.txt", numbered_lines(6));

    let diff = "\