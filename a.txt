@@ 1-1 REPLACE
@@ 7 INSERT
@@ END
=== END FILE ===
";
        let blocks = parse(text).expect("parses");
        assert_eq!(
            modify_ops(&blocks[0]),
            &[EditOperation::Replace {
                start: 1,
                end: 1,
                lines: vec!["@@ 7 INSERT".to_string()],
            }]
        );
    }

    #[test]
    fn malformed_block_does_not_abort_siblings() {
        let text = "\