use mnemo_sql::naming::{
    collection_table_name, normalize_collection_name, validate_identifier, MAX_COLLECTION_NAME_LEN,
};

#[test]
fn table_name_is_prefixed_slug_and_width() {
    assert_eq!(
        collection_table_name("My Coll", 384).unwrap(),
        "docstore_my_coll_384"
    );
    assert_eq!(
        collection_table_name("notes_2024", 1536).unwrap(),
        "docstore_notes_2024_1536"
    );
}

#[test]
fn names_longer_than_the_limit_are_rejected() {
    let at_limit = "a".repeat(MAX_COLLECTION_NAME_LEN);
    assert!(normalize_collection_name(&at_limit).is_ok());

    let too_long = "a".repeat(MAX_COLLECTION_NAME_LEN + 1);
    let err = collection_table_name(&too_long, 3).unwrap_err();
    assert!(err.to_string().contains("at most 47 characters"), "{err}");
}

#[test]
fn table_names_over_postgres_limit_are_rejected() {
    // 47 chars + "docstore_" + "_" + a wide dimension suffix overflows 63
    let name = "b".repeat(MAX_COLLECTION_NAME_LEN);
    let err = collection_table_name(&name, 1_000_000).unwrap_err();
    assert!(err.to_string().contains("exceeds 63"), "{err}");
}

#[test]
fn unsupported_characters_and_empty_names_fail() {
    for bad in ["", "  ", "semi;colon", "dash-name", "quote'd"] {
        assert!(collection_table_name(bad, 8).is_err(), "{bad:?} accepted");
    }
    assert!(collection_table_name("ok", 0).is_err());
}

#[test]
fn identifiers_must_be_lowercase_sql_words() {
    assert!(validate_identifier("docstore_a_3").is_ok());
    assert!(validate_identifier("_private").is_ok());
    for bad in ["", "1table", "Upper", "has space", "a;drop"] {
        assert!(validate_identifier(bad).is_err(), "{bad:?} accepted");
    }
    assert!(validate_identifier(&"x".repeat(64)).is_err());
}
