@@ 1 INSERT
ok
@@ END
=== END FILE ===
";
        let blocks = parse(text).expect("parses");
        assert_eq!(error_line(&blocks[0]), 2);
        assert!(blocks[1].directive.is_ok());
    }

    #[test]
    fn missing_end_file_before_next_header() {
        let text = "\