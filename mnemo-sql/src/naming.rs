use mnemo_core::StoreError;

pub const COLLECTION_TABLE_PREFIX: &str = "docstore";
/// Longest collection name accepted.
pub const MAX_COLLECTION_NAME_LEN: usize = 47;
/// Postgres identifier limit (NAMEDATALEN - 1).
pub const MAX_TABLE_NAME_LEN: usize = 63;

/// Validates a collection name and lowercases it.
pub fn normalize_collection_name(name: &str) -> Result<String, StoreError> {
    if name.trim().is_empty() {
        return Err(StoreError::invalid("collection name must not be empty"));
    }
    let length = name.chars().count();
    if length > MAX_COLLECTION_NAME_LEN {
        return Err(StoreError::invalid(format!(
            "collection name must be at most {MAX_COLLECTION_NAME_LEN} characters, got {length}"
        )));
    }
    Ok(name.to_lowercase())
}

/// Physical table for a collection: `docstore_<slug>_<dimensions>`.
///
/// The slug is the lowercased name with spaces turned into underscores; it
/// may only contain `[a-z0-9_]`. Names are never truncated to fit.
pub fn collection_table_name(name: &str, dimensions: usize) -> Result<String, StoreError> {
    if dimensions == 0 {
        return Err(StoreError::invalid(
            "embedding dimensions must be greater than 0",
        ));
    }
    let slug = normalize_collection_name(name)?.replace(' ', "_");
    if let Some(bad) = slug
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_'))
    {
        return Err(StoreError::invalid(format!(
            "collection name '{name}' contains unsupported character '{bad}'"
        )));
    }

    let table = format!("{COLLECTION_TABLE_PREFIX}_{slug}_{dimensions}");
    if table.len() > MAX_TABLE_NAME_LEN {
        return Err(StoreError::invalid(format!(
            "table name '{table}' exceeds {MAX_TABLE_NAME_LEN} characters"
        )));
    }
    Ok(table)
}

/// Checks that `identifier` is safe to splice into SQL unquoted.
pub fn validate_identifier(identifier: &str) -> Result<(), StoreError> {
    let mut chars = identifier.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid_start || !valid_rest || identifier.len() > MAX_TABLE_NAME_LEN {
        return Err(StoreError::invalid(format!(
            "invalid SQL identifier '{identifier}'"
        )));
    }
    Ok(())
}
