@@ 2-2 REPLACE
new
@@ END
=== END FILE ===
";
        let options = ApplyOptions {
            allow_uncertain: true,
            encoding: EncodingStrategy::default()
                .with_candidates(&["euc-kr"])
                .expect("candidates"),
            ..ApplyOptions::default()
        };
        let report = run(&temp, diff, &options);
        assert_eq!(report.results[0].error_kind(), Some("encoding_uncertain"));
        assert_eq!(report.results[1].error_kind(), Some("encoding_uncertain"));
        assert_eq!(
            fs::read(temp.path().join("bom.txt")).expect("read"),
            b"\xEF\xBB\xBFcaf\xE9\nold\n"
        );
        assert_eq!(
            fs::read(temp.path().join("ko.txt")).expect("read"),
            b"a\xFF\xFF\nold\n"
        );
    }

    #[test]
    fn edits_keep_duplicate_code_points_intact() {
        // NEC-selected IBM extension in Shift_JIS; re-encodes as FA 5C
        let temp = project(&[]);
        put(&temp, "nec.txt", [0xEDu8, 0x40, 0x0A, b'o', b'l', b'd', 0x0A]);
        let diff = "=== FILE: nec.txt ===\n@@ 2-2 REPLACE\nnew\n@@ END\n=== END FILE ===\n";
        let report = run(&temp, diff, &ApplyOptions::default());

        let result = &report.results[0];
        assert_eq!(result.status, ApplyStatus::Applied, "{:?}", result.error);
        assert_eq!(
            fs::read(temp.path().join("nec.txt")).expect("read"),
            [0xED, 0x40, 0x0A, b'n', b'e', b'w', 0x0A]
        );
    }

    #[test]
    fn verification_failure_leaves_file_untouched() {
        let temp = project(&[("main.rs", "fn main() {\n    run();\n}\n")]);
        let diff = "=== FILE: main.rs ===\n@@ 3 DELETE 1\n=== END FILE ===\n";
        let report = run(&temp, diff, &ApplyOptions::default());
        let result = &report.results[0];
        assert_eq!(result.error_kind(), Some("verification_failed"));
        assert_eq!(
            fs::read(temp.path().join("main.rs")).expect("read"),
            b"fn main() {\n    run();\n}\n"
        );
        assert!(!temp.path().join("main.rs.bak").exists());
    }

    #[test]
    fn unchanged_result_is_skipped() {
        let temp = project(&[("same.txt", "a\nb\n")]);
        let diff = "=== FILE: same.txt ===\n@@ 2-2 REPLACE\nb\n@@ END\n=== END FILE ===\n";
        let report = run(&temp, diff, &ApplyOptions::default());
        assert_eq!(report.results[0].status, ApplyStatus::Skipped);
        assert!(!temp.path().join("same.txt.bak").exists());
    }

    #[test]
    fn inaccessible_root_is_fatal() {
        let temp = tempdir().expect("temp dir");
        let missing = temp.path().join("missing");
        let err = apply_batch(Vec::new(), &missing, &ApplyOptions::default()).unwrap_err();
        assert!(matches!(err, BatchError::RootInaccessible { .. }));
    }
}
