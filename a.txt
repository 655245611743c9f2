@@ 1 DELETE 1
=== END FILE ===
=== CREATE FILE: new/b.txt ===
b
=== END FILE ===
=== DELETE FILE: gone.txt ===
";
        let options = ApplyOptions {
            dry_run: true,
            keep_preview: true,
            ..ApplyOptions::default()
        };
        let report = run(&temp, diff, &options);
        let statuses: Vec<_> = report.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                ApplyStatus::Applied,
                ApplyStatus::Created,
                ApplyStatus::Deleted
            ]
        );
        assert_eq!(fs::read(temp.path().join("a.txt")).expect("read"), b"a\nb\n");
        assert!(!temp.path().join("new").exists());
        assert!(temp.path().join("gone.txt").exists());
        assert!(!temp.path().join(".linepatch").exists());
        let preview = report.results[0].preview.as_ref().expect("preview");
        assert_eq!(preview.after, "b\n");
    }

    #[test]
    fn create_refuses_existing_unless_overwrite() {
        let temp = project(&[("keep.txt", "old\n")]);
        let diff = "=== CREATE FILE: keep.txt ===\nnew\n=== END FILE ===\n";
        let report = run(&temp, diff, &ApplyOptions::default());
        assert_eq!(report.results[0].error_kind(), Some("already_exists"));
        assert_eq!(fs::read(temp.path().join("keep.txt")).expect("read"), b"old\n");

        let options = ApplyOptions {
            overwrite: true,
            ..ApplyOptions::default()
        };
        let report = run(&temp, diff, &options);
        assert_eq!(report.results[0].status, ApplyStatus::Created);
        assert_eq!(fs::read(temp.path().join("keep.txt")).expect("read"), b"new\n");
        assert_eq!(
            fs::read(temp.path().join("keep.txt.bak")).expect("backup"),
            b"old\n"
        );
    }

    #[test]
    fn whole_file_directive_overwrites() {
        let temp = project(&[("w.txt", "a\r\nb\r\n")]);
        let report = apply_directives(
            vec![FileDirective::whole_file("w.txt", "x\ny\n")],
            temp.path(),
            &ApplyOptions::default(),
        )
        .expect("batch");
        assert_eq!(report.results[0].status, ApplyStatus::Created);
        assert_eq!(fs::read(temp.path().join("w.txt")).expect("read"), b"x\r\ny\r\n");
    }

    #[test]
    fn delete_moves_file_aside_and_restore_brings_it_back() {
        let temp = project(&[("old.py", "print(1)\n")]);
        let report = run(&temp, "=== DELETE FILE: old.py ===\n", &ApplyOptions::default());
        assert_eq!(report.results[0].status, ApplyStatus::Deleted);
        assert!(!temp.path().join("old.py").exists());
        assert_eq!(
            fs::read(temp.path().join("old.py.deleted_bak")).expect("moved"),
            b"print(1)\n"
        );

        let root = ProjectRoot::open(temp.path()).expect("root");
        let used = restore_latest_backup(&root, Path::new("old.py"), &BackupNaming::default())
            .expect("restore");
        assert!(used.ends_with("old.py.deleted_bak"));
        assert_eq!(
            fs::read(temp.path().join("old.py")).expect("restored"),
            b"print(1)\n"
        );
    }

    #[test]
    fn restore_uses_latest_backup() {
        let temp = project(&[("r.txt", "v3\n"), ("r.txt.bak", "v1\n"), ("r.txt.bak1", "v2\n")]);
        let root = ProjectRoot::open(temp.path()).expect("root");
        restore_latest_backup(&root, Path::new("r.txt"), &BackupNaming::default())
            .expect("restore");
        assert_eq!(fs::read(temp.path().join("r.txt")).expect("read"), b"v2\n");
        assert!(
            restore_latest_backup(&root, Path::new("none.txt"), &BackupNaming::default())
                .is_err()
        );
    }

    #[test]
    fn failures_are_scoped_to_their_file() {
        let temp = project(&[("a.txt", "1\n2\n3\n"), ("b.txt", "x\n")]);
        let diff = "\