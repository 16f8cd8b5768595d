use mnemo_core::{split_path_mode, JsonPathMode, MetadataFilter, StoreError};
use serde_json::json;

#[test]
fn parses_single_where_clause() {
    let filter =
        MetadataFilter::from_wire(&json!({"where": {"jsonpath": "$.author ? (@ == \"ann\")"}}))
            .unwrap();
    assert_eq!(
        filter,
        MetadataFilter::JsonPath("$.author ? (@ == \"ann\")".to_string())
    );
}

#[test]
fn parses_nested_and_or_groups() {
    let filter = MetadataFilter::from_wire(&json!({
        "where": {
            "and": [
                {"jsonpath": "$.a"},
                {"or": [{"jsonpath": "$.b"}, {"jsonpath": "$.c"}]}
            ]
        }
    }))
    .unwrap();

    assert_eq!(
        filter,
        MetadataFilter::All(vec![
            MetadataFilter::json_path("$.a"),
            MetadataFilter::Any(vec![
                MetadataFilter::json_path("$.b"),
                MetadataFilter::json_path("$.c"),
            ]),
        ])
    );
}

#[test]
fn sibling_keys_are_anded() {
    let filter = MetadataFilter::from_wire(&json!({
        "jsonpath": "$.a",
        "or": [{"jsonpath": "$.b"}]
    }))
    .unwrap();

    let MetadataFilter::All(parts) = filter else {
        panic!("expected an all(...) group");
    };
    assert_eq!(parts.len(), 2);
}

#[test]
fn rejects_malformed_wire_filters() {
    for bad in [
        json!([]),
        json!({}),
        json!({"jsonpath": 3}),
        json!({"and": {"jsonpath": "$.a"}}),
        json!({"and": []}),
        json!({"unknown": "x"}),
        json!({"jsonpath": "a.b"}),
    ] {
        let err = MetadataFilter::from_wire(&bad).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)), "{bad}: {err}");
    }
}

#[test]
fn path_mode_keywords_are_accepted() {
    assert_eq!(split_path_mode("$.a"), (JsonPathMode::Lax, "$.a"));
    assert_eq!(split_path_mode("lax $.a"), (JsonPathMode::Lax, "$.a"));
    assert_eq!(
        split_path_mode("  strict  $.a ? (@ > 1)"),
        (JsonPathMode::Strict, "$.a ? (@ > 1)")
    );
    assert_eq!(split_path_mode("strict$.a"), (JsonPathMode::Lax, "strict$.a"));

    for path in ["lax $.a", "strict $.tags ? (@ == \"x\")", "$"] {
        assert!(MetadataFilter::json_path(path).validate().is_ok(), "{path}");
    }
    assert!(MetadataFilter::json_path("strict a.b").validate().is_err());
}

#[test]
fn validate_rejects_unbounded_range_and_empty_in() {
    let range = MetadataFilter::Range {
        key: "score".to_string(),
        min: None,
        max: None,
    };
    assert!(range.validate().is_err());
    assert!(MetadataFilter::In("lang".to_string(), vec![]).validate().is_err());
    assert!(MetadataFilter::Eq("lang".to_string(), json!("en")).validate().is_ok());
}
