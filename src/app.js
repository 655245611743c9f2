@@ 15-16 REPLACE
  let x = 1;
@@ END
@@ 50 DELETE 3
@@ 0 INSERT
// header
@@ END
=== END FILE ===

=== CREATE FILE: src/new.py ===
print('hi')
=== END FILE ===

=== DELETE FILE: old_module.py ===
";
        let blocks = parse(text).expect("parses");
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].path, PathBuf::from("src/app.js"));
        assert_eq!(blocks[0].header_line, 3);
        assert_eq!(
            modify_ops(&blocks[0]),
            &[
                EditOperation::Replace {
                    start: 15,
                    end: 16,
                    lines: vec!["  let x = 1;".to_string()],
                },
                EditOperation::Delete {
                    start: 50,
                    count: 3
                },
                EditOperation::Insert {
                    after: 0,
                    lines: vec!["// header".to_string()],
                },
            ]
        );
        assert!(matches!(
            &blocks[1].directive,
            Ok(FileDirective::Create { content, overwrite: false, .. }) if content == &vec!["print('hi')".to_string()]
        ));
        assert!(matches!(
            &blocks[2].directive,
            Ok(FileDirective::DeleteFile { path }) if path == &PathBuf::from("old_module.py")
        ));

        let summary = summarize(&blocks);
        assert_eq!(summary.files, 3);
        assert_eq!(summary.replace_ops, 1);
        assert_eq!(summary.delete_ops, 1);
        assert_eq!(summary.insert_ops, 1);
    }

    #[test]
    fn delete_headers_clean_their_path() {
        let blocks = parse("=== DELETE FILE: `./old.py` ===\n").expect("parses");
        assert_eq!(blocks[0].path, PathBuf::from("old.py"));
        assert!(matches!(
            &blocks[0].directive,
            Ok(FileDirective::DeleteFile { path }) if path == &PathBuf::from("old.py")
        ));
    }

    #[test]
    fn create_content_is_not_scanned_for_markers() {
        let text = concat!(
            "=== CREATE FILE: notes/protocol.md ===\n",
            "@@ 1-2 REPLACE\n",
            "    indented line   \n",
            "@@ END\n",
            "=== FILE: not/a/header.txt ===\n",
            "=== END FILE ===\n",
        );
        let blocks = parse(text).expect("parses");
        assert_eq!(blocks.len(), 1);
        match &blocks[0].directive {
            Ok(FileDirective::Create { content, .. }) => assert_eq!(
                content,
                &vec![
                    "@@ 1-2 REPLACE".to_string(),
                    "    indented line   ".to_string(),
                    "@@ END".to_string(),
                    "=== FILE: not/a/header.txt ===".to_string(),
                ]
            ),
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[test]
    fn content_lines_that_look_like_markers_stay_content() {
        let text = "\