@@ 1 DELETE 1
=== END FILE ===
";
    let report = run(&root, diff, &ApplyOptions::default());
    let value = serde_json::to_value(report.to_document()).expect("serializes");
    let rows = value["results"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["status"], "applied");
    assert_eq!(rows[1]["error_kind"], "not_found");
    assert_eq!(value["counts"]["failed"], 1);
}
