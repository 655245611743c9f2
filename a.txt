@@ 1 DELETE 1
=== DELETE FILE: b.txt ===
";
        let blocks = parse(text).expect("parses");
        assert_eq!(blocks.len(), 2);
        assert_eq!(error_line(&blocks[0]), 1);
        assert!(blocks[1].directive.is_ok());
    }

    #[test]
    fn repeated_blocks_for_one_path_merge() {
        let text = "\