use squill::prelude::*;

#[test]
fn test_missing_select_and_bad_where() {
    let result = lint(r#"{"from":"users","wheres":[{"op":"=","value":"a"}]}"#);

    assert!(result.has_errors());
    assert_eq!(result.diagnostics.len(), 2);

    let first = &result.diagnostics[0];
    assert_eq!(first.code, "E100");
    assert_eq!(first.path, "select");
    assert!(first.position.line >= 1 && first.position.column >= 1);

    let second = &result.diagnostics[1];
    assert_eq!(second.code, "E120");
    assert_eq!(second.path, "wheres[0]");
    assert!(second.position.line >= 1 && second.position.column >= 1);
}

#[test]
fn test_json_syntax_error() {
    let result = lint(r#"{"select": ["id",}"#);
    assert!(result.has_errors());
    assert_eq!(result.diagnostics[0].code, "E001");
    assert!(result.diagnostics[0].position.line >= 1);
    assert!(result.diagnostics[0].position.column >= 1);
}

#[test]
fn test_having_without_group() {
    let result = lint(
        r#"{"select": "id", "from": "user", "havings": [{"field": "total", ">": 10}]}"#,
    );
    let codes: Vec<&str> = result.diagnostics.iter().map(|d| d.code.as_str()).collect();
    assert_eq!(codes, vec!["E150"]);
}

#[test]
fn test_positions_point_at_the_offending_entry() {
    let source = r#"{
    "select": ["id"],
    "from": "user",
    "wheres": [
        {"field": "status", "=": 1},
        {"field": "bad name", "=": 2}
    ]
}"#;
    let result = lint(source);
    assert_eq!(result.diagnostics.len(), 1);

    let d = &result.diagnostics[0];
    assert_eq!(d.code, "E120");
    assert_eq!(d.path, "wheres[1].field");
    // the second array entry sits on line 6
    assert_eq!(d.position.line, 6);
    assert!(d.position.column > 1);
}

#[test]
fn test_valid_document_has_no_diagnostics() {
    let result = lint(
        r#"{
            "select": ["id", "name", "meta$.color as color"],
            "from": "user",
            "wheres": [{"field": "status", "in": [1, 2]}],
            "orders": "id desc"
        }"#,
    );
    assert!(result.valid());
    assert!(result.diagnostics.is_empty());
}

#[test]
fn test_format_lines() {
    let result = lint(r#"{"from":"users"}"#);
    let formatted = result.format();
    assert!(formatted.contains(":select: error: "));

    for line in formatted.lines() {
        // line:col-endcol:path: severity: message
        let mut parts = line.splitn(2, ':');
        assert!(parts.next().unwrap().parse::<u32>().is_ok());
    }
}

#[test]
fn test_parse_returns_query_and_diagnostics_together() {
    let (query, result) = parse(r#"{"select": "id", "from": "user"}"#);
    assert!(result.valid());
    let query = query.unwrap();
    assert_eq!(query.select.len(), 1);

    let (query, result) = parse(r#"{"from": "user"}"#);
    assert!(query.is_some());
    assert!(result.has_errors());

    let (query, result) = parse("not json");
    assert!(query.is_none());
    assert_eq!(result.diagnostics[0].code, "E001");
}

#[test]
fn test_schema_validation() {
    let data = serde_json::json!({"select": ["id"], "from": "user", "wheres": "oops"});
    let problems = squill::lint::validate_schema(&data);
    assert!(!problems.is_empty());

    let data = serde_json::json!({"select": ["id"], "from": "user"});
    assert!(squill::lint::validate_schema(&data).is_empty());
}

#[test]
#[should_panic(expected = "missing select")]
fn test_must_parse_panics_on_invalid_input() {
    must_parse(r#"{"from": "user"}"#);
}
