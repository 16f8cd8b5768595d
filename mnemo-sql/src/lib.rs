//! SQL for the Postgres backend that can be built and tested without a database.

pub mod error;
pub mod filter;
pub mod index;
pub mod migrations;
pub mod naming;
pub mod rows;
pub mod schema;
pub mod search;

pub use error::{map_sqlx, SqlError};
pub use index::{IvfFlatParams, PgVectorVersion};
pub use naming::collection_table_name;
pub use search::{build_search_query, SearchScope};
