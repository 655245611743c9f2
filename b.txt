@@ 1 INSERT
y
@@ END
=== END FILE ===
";
        let report = run(&temp, diff, &ApplyOptions::default());
        let kinds: Vec<_> = report.results.iter().map(|r| r.error_kind()).collect();
        assert_eq!(
            kinds,
            vec![Some("out_of_range"), Some("not_found"), Some("unsafe_path"), None]
        );
        assert_eq!(fs::read(temp.path().join("a.txt")).expect("read"), b"1\n2\n3\n");
        assert_eq!(fs::read(temp.path().join("b.txt")).expect("read"), b"x\ny\n");
        assert_eq!(report.changed_paths(), vec![Path::new("b.txt")]);
    }

    #[test]
    fn uncertain_and_binary_files_fail_closed() {
        let temp = project(&[]);
        put(&temp, "bin.dat", b"ab\x00cd\n");
        put(&temp, "odd.txt", b"a\xFF\xFF\n");
        let diff = "\