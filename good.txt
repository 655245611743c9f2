@@ 2 DELETE 1
=== END FILE ===
";
        let blocks = parse(text).expect("parses");
        assert_eq!(blocks.len(), 2);
        assert_eq!(error_line(&blocks[0]), 2);
        assert_eq!(modify_ops(&blocks[1]).len(), 1);
    }

    #[test]
    fn rejects_bad_arguments_with_line_numbers() {
        let cases = [
            "@@ x INSERT",
            "@@ -1 INSERT",
            "@@ 3 DELETE 0",
            "@@ 3 DELETE",
            "@@ 0-2 REPLACE",
            "@@ 1-2 REPLACE now",
            "@@ 99999999999999999999999 INSERT",
            "@@ 4 MOVE",
        ];
        for marker in cases {
            let text = format!("=== FILE: f.txt ===\n\n{marker}\n=== END FILE ===\n");
            let blocks = parse(&text).expect("document parses");
            assert_eq!(error_line(&blocks[0]), 3, "marker {marker}");
        }
    }

    #[test]
    fn unclosed_operation_fails_at_sentinel() {
        let text = "\