use mnemo_core::{Metadata, MetadataFilter};
use mnemo_retrieval::filter::{lookup_key, matches};
use serde_json::json;

fn metadata() -> Metadata {
    serde_json::from_value(json!({
        "author": "alice",
        "year": 2021,
        "tags": ["rust", "db"],
        "source": {"kind": "web", "rank": 3},
        "two words": true
    }))
    .unwrap()
}

#[test]
fn eq_in_and_range_leaves() {
    let metadata = metadata();

    assert!(matches(&MetadataFilter::Eq("author".into(), json!("alice")), &metadata));
    assert!(!matches(&MetadataFilter::Eq("author".into(), json!("bob")), &metadata));
    assert!(matches(&MetadataFilter::Eq("year".into(), json!(2021.0)), &metadata));
    assert!(matches(
        &MetadataFilter::In("author".into(), vec![json!("bob"), json!("alice")]),
        &metadata
    ));
    assert!(matches(
        &MetadataFilter::Range {
            key: "year".into(),
            min: Some(json!(2020)),
            max: Some(json!(2021)),
        },
        &metadata
    ));
    assert!(!matches(
        &MetadataFilter::Range {
            key: "author".into(),
            min: Some(json!(1)),
            max: None,
        },
        &metadata
    ));
}

#[test]
fn dotted_keys_reach_nested_objects() {
    let metadata = metadata();
    assert_eq!(lookup_key(&metadata, "source.kind"), Some(&json!("web")));
    assert_eq!(lookup_key(&metadata, "source.missing"), None);
    assert!(matches(
        &MetadataFilter::Eq("source.rank".into(), json!(3)),
        &metadata
    ));
}

#[test]
fn json_path_existence_and_predicates() {
    let metadata = metadata();
    let check = |path: &str| matches(&MetadataFilter::json_path(path), &metadata);

    assert!(check("$.author"));
    assert!(check("$.source.kind"));
    assert!(check("$[\"two words\"]"));
    assert!(check("$.tags[1]"));
    assert!(!check("$.missing"));
    assert!(!check("$.tags[5]"));

    assert!(check("$.author ? (@ == \"alice\")"));
    assert!(!check("$.author ? (@ == \"bob\")"));
    assert!(check("$.year ? (@ >= 2020)"));
    assert!(!check("$.year ? (@ < 2000)"));
    assert!(check("$.source.rank ? (@ != 4)"));
}

#[test]
fn json_path_predicates_unwrap_arrays() {
    let metadata = metadata();
    assert!(matches(
        &MetadataFilter::json_path("$.tags ? (@ == \"db\")"),
        &metadata
    ));
    assert!(!matches(
        &MetadataFilter::json_path("$.tags ? (@ == \"go\")"),
        &metadata
    ));
}

#[test]
fn root_path_always_exists() {
    let metadata = metadata();
    assert!(matches(&MetadataFilter::json_path("$"), &metadata));
    assert!(matches(&MetadataFilter::json_path("$"), &Metadata::new()));
    assert!(!matches(
        &MetadataFilter::json_path("$ ? (@ == 1)"),
        &metadata
    ));
}

#[test]
fn strict_mode_does_not_unwrap_arrays() {
    let metadata = metadata();
    assert!(matches(
        &MetadataFilter::json_path("lax $.tags ? (@ == \"db\")"),
        &metadata
    ));
    assert!(!matches(
        &MetadataFilter::json_path("strict $.tags ? (@ == \"db\")"),
        &metadata
    ));
    assert!(matches(
        &MetadataFilter::json_path("strict $.author ? (@ == \"alice\")"),
        &metadata
    ));
}

#[test]
fn unsupported_json_path_is_false() {
    let metadata = metadata();
    assert!(!matches(&MetadataFilter::json_path("$.tags[*]"), &metadata));
    assert!(!matches(&MetadataFilter::json_path("author"), &metadata));
    assert!(!matches(
        &MetadataFilter::json_path("$.author ? (@ like_regex \"^a\")"),
        &metadata
    ));
}

#[test]
fn groups_combine_children() {
    let metadata = metadata();
    let hit = MetadataFilter::json_path("$.author");
    let miss = MetadataFilter::json_path("$.missing");

    assert!(matches(&MetadataFilter::All(vec![hit.clone(), hit.clone()]), &metadata));
    assert!(!matches(&MetadataFilter::All(vec![hit.clone(), miss.clone()]), &metadata));
    assert!(matches(&MetadataFilter::Any(vec![miss.clone(), hit]), &metadata));
    assert!(!matches(&MetadataFilter::Any(vec![miss]), &metadata));
}

#[test]
fn wire_form_evaluates_like_the_tree() {
    let filter = MetadataFilter::from_wire(&json!({
        "where": {"jsonpath": "$.author ? (@ == \"alice\")"},
        "or": [{"jsonpath": "$.nope"}, {"jsonpath": "$.tags"}]
    }))
    .unwrap();

    assert!(matches(&filter, &metadata()));
}
