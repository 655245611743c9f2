@@ 1 DELETE 1
=== END FILE ===
";
        let options = ApplyOptions {
            encoding: EncodingStrategy::default()
                .with_candidates(&["euc-kr"])
                .expect("candidates"),
            ..ApplyOptions::default()
        };
        let report = run(&temp, diff, &options);
        assert_eq!(report.results[0].error_kind(), Some("binary_file_rejected"));
        assert_eq!(report.results[1].error_kind(), Some("encoding_uncertain"));
        assert_eq!(fs::read(temp.path().join("odd.txt")).expect("read"), b"a\xFF\xFF\n");
    }

    #[test]
    fn allowing_uncertain_never_rewrites_untouched_lines() {
        let temp = project(&[]);
        put(&temp, "bom.txt", b"\xEF\xBB\xBFcaf\xE9\nold\n");
        put(&temp, "ko.txt", b"a\xFF\xFF\nold\n");
        let diff = "\