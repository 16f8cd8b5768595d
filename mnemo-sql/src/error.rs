use mnemo_core::StoreError;
use thiserror::Error;

/// SQLSTATE for `unique_violation`.
pub const UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE for `undefined_table`.
pub const UNDEFINED_TABLE: &str = "42P01";

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("mnemo SQL connection error: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("mnemo SQL migration error: {0}")]
    Migration(#[source] sqlx::Error),
}

impl From<SqlError> for StoreError {
    fn from(error: SqlError) -> Self {
        match error {
            SqlError::Connection(source) => StoreError::storage("connect", source),
            SqlError::Migration(source) => StoreError::storage("migrate", source),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SqlStateClass {
    UniqueViolation,
    UndefinedTable,
    Other,
}

pub(crate) fn classify_sqlstate(code: Option<&str>) -> SqlStateClass {
    match code {
        Some(UNIQUE_VIOLATION) => SqlStateClass::UniqueViolation,
        Some(UNDEFINED_TABLE) => SqlStateClass::UndefinedTable,
        _ => SqlStateClass::Other,
    }
}

/// Wraps a driver error with the operation that hit it, keeping conflicts
/// and missing tables distinguishable from generic storage failures.
pub fn map_sqlx(operation: &str, error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(database_error) = &error {
        let code = database_error.code();
        match classify_sqlstate(code.as_deref()) {
            SqlStateClass::UniqueViolation => {
                return StoreError::Conflict(format!(
                    "{operation}: already exists ({})",
                    database_error.message()
                ));
            }
            SqlStateClass::UndefinedTable => {
                return StoreError::not_found("table", database_error.message());
            }
            SqlStateClass::Other => {}
        }
    }
    if matches!(error, sqlx::Error::RowNotFound) {
        return StoreError::not_found("row", operation);
    }
    StoreError::storage(operation, error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlstate_classes() {
        assert_eq!(
            classify_sqlstate(Some("23505")),
            SqlStateClass::UniqueViolation
        );
        assert_eq!(
            classify_sqlstate(Some("42P01")),
            SqlStateClass::UndefinedTable
        );
        assert_eq!(classify_sqlstate(Some("40001")), SqlStateClass::Other);
        assert_eq!(classify_sqlstate(None), SqlStateClass::Other);
    }

    #[test]
    fn row_not_found_is_not_found() {
        let error = map_sqlx("get_session", sqlx::Error::RowNotFound);
        assert!(error.is_not_found());
    }

    #[test]
    fn other_errors_keep_operation_context() {
        let error = map_sqlx("put_messages", sqlx::Error::PoolTimedOut);
        match error {
            StoreError::Storage { operation, .. } => assert_eq!(operation, "put_messages"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn sql_errors_convert_into_store_errors() {
        let connection: StoreError = SqlError::Connection(sqlx::Error::PoolTimedOut).into();
        assert!(connection
            .to_string()
            .starts_with("storage error during connect:"));

        let migration: StoreError = SqlError::Migration(sqlx::Error::PoolClosed).into();
        assert!(migration
            .to_string()
            .starts_with("storage error during migrate:"));
    }
}
