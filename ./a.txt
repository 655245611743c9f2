@@ 3 INSERT
z
@@ END
=== END FILE ===
";
        let blocks = parse(text).expect("parses");
        assert_eq!(blocks.len(), 1);
        assert_eq!(modify_ops(&blocks[0]).len(), 2);
    }

    #[test]
    fn tolerates_crlf_case_and_invisible_characters() {
        let text = "\u{FEFF}=== FILE: `src\\main.rs` ===\r\n@@ 2 insert\r\n  body\r\n@@ end\r\n=== end file ===\r\n";
        let blocks = parse(text).expect("parses");
        assert_eq!(blocks[0].path, PathBuf::from("src/main.rs"));
        assert_eq!(
            modify_ops(&blocks[0]),
            &[EditOperation::Insert {
                after: 2,
                lines: vec!["  body".to_string()],
            }]
        );
    }

    #[test]
    fn document_without_blocks() {
        assert!(parse("").expect("empty").is_empty());
        assert!(parse("  \n").expect("blank").is_empty());
        assert!(parse("just some prose").is_err());
    }

    #[test]
    fn bare_operation_list() {
        let ops = parse_operations("@@ 1-1 REPLACE\nX\n@@ END\n@@ 3 DELETE 2\n").expect("parses");
        assert_eq!(ops.len(), 2);
        assert!(parse_operations("=== FILE: a ===\n@@ 1 DELETE 1\n=== END FILE ===").is_err());
        assert!(parse_operations("@@ 2 INSERT\nno end").is_err());
    }
}
