use async_trait::async_trait;
use mnemo_core::{Document, DocumentType, Message, StoreError, Summary};
use mnemo_retrieval::{Candidate, SearchBackend, SearchPlan};
use mnemo_sql::rows::{candidate_from_row, document_from_row, message_from_row, summary_from_row};
use mnemo_sql::schema::set_ivfflat_probes_sql;
use mnemo_sql::{build_search_query, map_sqlx, SearchScope};
use sqlx::postgres::PgRow;
use sqlx::PgPool;

type RowDecoder<T> = fn(&PgRow) -> Result<T, sqlx::Error>;

/// One search scope over the live database.
///
/// Collections indexed with IVFFLAT search inside a transaction so the
/// `ivfflat.probes` setting stays local to the query.
pub struct PgSearchBackend<'a, T> {
    pool: &'a PgPool,
    scope: SearchScope<'a>,
    document_type: DocumentType,
    dimensions: usize,
    probes: Option<i32>,
    decode: RowDecoder<T>,
}

impl<'a> PgSearchBackend<'a, Message> {
    pub fn messages(pool: &'a PgPool, session_id: &'a str, dimensions: usize) -> Self {
        Self {
            pool,
            scope: SearchScope::Messages { session_id },
            document_type: DocumentType::Message,
            dimensions,
            probes: None,
            decode: message_from_row,
        }
    }
}

impl<'a> PgSearchBackend<'a, Summary> {
    pub fn summaries(pool: &'a PgPool, session_id: &'a str, dimensions: usize) -> Self {
        Self {
            pool,
            scope: SearchScope::Summaries { session_id },
            document_type: DocumentType::Summary,
            dimensions,
            probes: None,
            decode: summary_from_row,
        }
    }
}

impl<'a> PgSearchBackend<'a, Document> {
    pub fn documents(pool: &'a PgPool, table: &'a str, dimensions: usize) -> Self {
        Self {
            pool,
            scope: SearchScope::Documents { table },
            document_type: DocumentType::Document,
            dimensions,
            probes: None,
            decode: document_from_row,
        }
    }

    pub fn with_ivfflat_probes(mut self, probes: i32) -> Self {
        self.probes = Some(probes);
        self
    }
}

#[async_trait]
impl<T: Send> SearchBackend for PgSearchBackend<'_, T> {
    type Item = T;

    fn document_type(&self) -> DocumentType {
        self.document_type
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn candidates(&self, plan: &SearchPlan) -> Result<Vec<Candidate<T>>, StoreError> {
        let mut query = build_search_query(&self.scope, plan)?;
        let rows = match self.probes {
            Some(probes) => {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|error| map_sqlx("begin search", error))?;
                sqlx::query(&set_ivfflat_probes_sql(probes))
                    .execute(&mut *tx)
                    .await
                    .map_err(|error| map_sqlx("set ivfflat probes", error))?;
                let rows = query
                    .build()
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|error| map_sqlx("search", error))?;
                tx.commit()
                    .await
                    .map_err(|error| map_sqlx("commit search", error))?;
                rows
            }
            None => query
                .build()
                .fetch_all(self.pool)
                .await
                .map_err(|error| map_sqlx("search", error))?,
        };

        rows.iter()
            .map(|row| candidate_from_row(row, (self.decode)(row)?))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| map_sqlx("decode search row", error))
    }
}
