use mnemo_core::{
    CreateCollectionRequest, DistanceFunction, DocumentCollection, DocumentType, IndexType,
    MetadataTarget, StoreError, UpdateCollectionRequest,
};
use mnemo_sql::index::{index_type_for, MIN_ROWS_FOR_IVFFLAT_INDEX};
use mnemo_sql::naming::{collection_table_name, normalize_collection_name, validate_identifier};
use mnemo_sql::rows::collection_from_row;
use mnemo_sql::schema::{
    collection_counts_sql, create_document_id_index_sql, create_document_table_sql,
    create_hnsw_index_sql, create_ivfflat_index_sql, drop_index_sql, drop_table_sql,
    migrate_embedding_width_sql, DOCUMENT_COLLECTION_TABLE, EMBEDDING_COLUMN_WIDTH_SQL, MESSAGE_EMBEDDING_TABLE,
    PGVECTOR_VERSION_SQL, SUMMARY_EMBEDDING_TABLE,
};
use mnemo_sql::{map_sqlx, IvfFlatParams, PgVectorVersion};
use sqlx::types::Json;
use sqlx::Row;
use tracing::Instrument;
use uuid::Uuid;

use crate::PostgresMemoryStore;

const COLLECTION_COLUMNS: &str = "uuid, created_at, updated_at, name, description, metadata, \
    table_name, embedding_model_name, embedding_dimensions, is_auto_embedded, distance_function, \
    is_normalized, is_indexed, index_type, list_count, probe_count";

/// Model name recorded for collections whose embeddings come from the caller.
const EXTERNAL_EMBEDDING_MODEL: &str = "external";

impl PostgresMemoryStore {
    /// Registers a collection and creates its document table.
    ///
    /// The similarity index is built right away when the extension supports
    /// HNSW; IVFFLAT collections are indexed later with
    /// [`create_collection_index`](Self::create_collection_index).
    pub async fn create_collection(
        &self,
        request: CreateCollectionRequest,
    ) -> Result<DocumentCollection, StoreError> {
        let name = normalize_collection_name(&request.name)?;
        let dimensions = request.embedding_dimensions;
        let table = collection_table_name(&name, dimensions)?;
        let stored_dimensions = i32::try_from(dimensions)
            .map_err(|_| StoreError::invalid("embedding dimensions out of range"))?;

        let model_name = if request.is_auto_embedded {
            let model = self.embedder().model(DocumentType::Document);
            if model.dimensions != dimensions {
                return Err(StoreError::DimensionMismatch {
                    expected: model.dimensions,
                    got: dimensions,
                });
            }
            model.name
        } else {
            EXTERNAL_EMBEDDING_MODEL.to_string()
        };

        let span = tracing::info_span!("create_collection", collection = %name, table = %table);
        async {
            let version = self.pgvector_version().await?;
            let index_type = index_type_for(version);
            tracing::debug!(
                pgvector = ?version.map(|version| version.to_string()),
                index_type = index_type.as_str(),
                "collection index type selected"
            );

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|error| map_sqlx("begin create collection", error))?;
            sqlx::query(
                "INSERT INTO document_collection (uuid, name, description, metadata, table_name, \
                 embedding_model_name, embedding_dimensions, is_auto_embedded, distance_function, \
                 is_normalized, is_indexed, index_type) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, FALSE, $11)",
            )
            .bind(Uuid::new_v4())
            .bind(&name)
            .bind(&request.description)
            .bind(Json(&request.metadata))
            .bind(&table)
            .bind(&model_name)
            .bind(stored_dimensions)
            .bind(request.is_auto_embedded)
            .bind(DistanceFunction::Cosine.as_str())
            .bind(request.is_normalized)
            .bind(index_type.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|error| map_sqlx("create collection", error))?;
            for statement in [
                create_document_table_sql(&table, dimensions)?,
                create_document_id_index_sql(&table)?,
            ] {
                sqlx::query(&statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(|error| map_sqlx("create collection table", error))?;
            }
            tx.commit()
                .await
                .map_err(|error| map_sqlx("commit create collection", error))?;

            // CONCURRENTLY cannot run inside a transaction block
            if index_type == IndexType::Hnsw {
                if let Err(error) = self.build_hnsw_index(&name, &table).await {
                    if let Err(cleanup) = self.delete_collection(&name).await {
                        tracing::error!(error = %cleanup, "failed to remove collection after index creation failed");
                    }
                    return Err(error);
                }
            }
            tracing::info!(index_type = index_type.as_str(), "collection created");
            self.get_collection(&name).await
        }
        .instrument(span)
        .await
    }

    /// Collection record with live document counts.
    pub async fn get_collection(&self, name: &str) -> Result<DocumentCollection, StoreError> {
        let collection = self.collection_record(name).await?;
        self.with_counts(collection).await
    }

    pub async fn list_collections(&self) -> Result<Vec<DocumentCollection>, StoreError> {
        let sql = format!(
            "SELECT {COLLECTION_COLUMNS} FROM document_collection WHERE deleted_at IS NULL ORDER BY name"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| map_sqlx("list collections", error))?;

        let mut collections = Vec::with_capacity(rows.len());
        for row in &rows {
            let collection =
                collection_from_row(row).map_err(|error| map_sqlx("decode collection", error))?;
            collections.push(self.with_counts(collection).await?);
        }
        Ok(collections)
    }

    /// Replaces the description and deep-merges metadata.
    pub async fn update_collection(
        &self,
        request: UpdateCollectionRequest,
    ) -> Result<DocumentCollection, StoreError> {
        let collection = self.collection_record(&request.name).await?;
        if let Some(description) = &request.description {
            sqlx::query(
                "UPDATE document_collection SET description = $1, updated_at = now() WHERE name = $2",
            )
            .bind(description)
            .bind(&collection.name)
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx("update collection", error))?;
        }
        if let Some(metadata) = request.metadata.filter(|metadata| !metadata.is_empty()) {
            let target = MetadataTarget::new(DOCUMENT_COLLECTION_TABLE, "name", &collection.name);
            self.merger.merge(&target, metadata, false).await?;
        }
        self.get_collection(&collection.name).await
    }

    /// Removes the record and drops the document table in one transaction.
    pub async fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
        let name = normalize_collection_name(name)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| map_sqlx("begin delete collection", error))?;
        let table: String = sqlx::query_scalar(
            "DELETE FROM document_collection WHERE name = $1 RETURNING table_name",
        )
        .bind(&name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|error| map_sqlx("delete collection", error))?
        .ok_or_else(|| StoreError::not_found("collection", &name))?;

        sqlx::query(&drop_table_sql(&table)?)
            .execute(&mut *tx)
            .await
            .map_err(|error| map_sqlx("drop collection table", error))?;
        tx.commit()
            .await
            .map_err(|error| map_sqlx("commit delete collection", error))?;
        tracing::info!(collection = %name, table = %table, "collection deleted");
        Ok(())
    }

    /// Builds the collection's similarity index.
    ///
    /// IVFFLAT needs at least [`MIN_ROWS_FOR_IVFFLAT_INDEX`] documents unless
    /// `force` is set; an existing IVFFLAT index is rebuilt with lists and
    /// probes sized to the current row count.
    pub async fn create_collection_index(
        &self,
        name: &str,
        force: bool,
    ) -> Result<DocumentCollection, StoreError> {
        let collection = self.get_collection(name).await?;
        let span = tracing::info_span!(
            "create_collection_index",
            collection = %collection.name,
            index_type = collection.index_type.as_str()
        );
        async {
            match collection.index_type {
                IndexType::Hnsw => {
                    if !collection.is_indexed {
                        self.build_hnsw_index(&collection.name, &collection.table_name)
                            .await?;
                    }
                }
                IndexType::IvfFlat => {
                    let rows = collection.document_count;
                    if rows < MIN_ROWS_FOR_IVFFLAT_INDEX && !force {
                        return Err(StoreError::invalid(format!(
                            "collection {} has {rows} documents; at least \
                             {MIN_ROWS_FOR_IVFFLAT_INDEX} are needed for an IVFFLAT index",
                            collection.name
                        )));
                    }
                    let params = IvfFlatParams::for_row_count(rows);
                    self.build_ivfflat_index(&collection.name, &collection.table_name, params)
                        .await?;
                }
            }
            self.get_collection(&collection.name).await
        }
        .instrument(span)
        .await
    }

    /// Replaces `table`'s vector column with one of `dimensions` width.
    ///
    /// Destructive: stored vectors are dropped and every row is marked
    /// unembedded. Runs in one transaction.
    pub async fn migrate_embedding_width(
        &self,
        table: &str,
        dimensions: usize,
    ) -> Result<(), StoreError> {
        let statements = migrate_embedding_width_sql(table, dimensions)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| map_sqlx("begin width migration", error))?;
        for statement in &statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|error| map_sqlx("migrate embedding width", error))?;
        }
        tx.commit()
            .await
            .map_err(|error| map_sqlx("commit width migration", error))?;
        tracing::debug!(table, dimensions, "embedding column width migrated");
        Ok(())
    }

    /// Aligns the message and summary embedding columns with the embedder.
    pub async fn ensure_embedding_width(&self) -> Result<(), StoreError> {
        for (table, kind) in [
            (MESSAGE_EMBEDDING_TABLE, DocumentType::Message),
            (SUMMARY_EMBEDDING_TABLE, DocumentType::Summary),
        ] {
            let expected = self.dimensions(kind);
            let width: Option<i32> = sqlx::query_scalar(EMBEDDING_COLUMN_WIDTH_SQL)
                .bind(table)
                .fetch_optional(&self.pool)
                .await
                .map_err(|error| map_sqlx("read embedding width", error))?;
            let Some(width) = width.and_then(|width| usize::try_from(width).ok()) else {
                continue;
            };
            if width != expected {
                tracing::warn!(
                    table,
                    stored = width,
                    expected,
                    "embedding width changed; existing vectors will be discarded"
                );
                self.migrate_embedding_width(table, expected).await?;
            }
        }
        Ok(())
    }

    /// Installed pgvector version; `None` when unknown.
    pub async fn pgvector_version(&self) -> Result<Option<PgVectorVersion>, StoreError> {
        let raw: Option<String> = sqlx::query_scalar(PGVECTOR_VERSION_SQL)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx("read pgvector version", error))?;
        Ok(raw.and_then(|raw| match raw.parse() {
            Ok(version) => Some(version),
            Err(error) => {
                tracing::warn!(version = %raw, error = %error, "could not parse pgvector version");
                None
            }
        }))
    }

    /// Collection record without counts.
    pub(crate) async fn collection_record(
        &self,
        name: &str,
    ) -> Result<DocumentCollection, StoreError> {
        let name = normalize_collection_name(name)?;
        let sql = format!(
            "SELECT {COLLECTION_COLUMNS} FROM document_collection \
             WHERE name = $1 AND deleted_at IS NULL"
        );
        let row = sqlx::query(&sql)
            .bind(&name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx("get collection", error))?
            .ok_or_else(|| StoreError::not_found("collection", &name))?;
        let collection =
            collection_from_row(&row).map_err(|error| map_sqlx("decode collection", error))?;
        validate_identifier(&collection.table_name)?;
        Ok(collection)
    }

    async fn with_counts(
        &self,
        mut collection: DocumentCollection,
    ) -> Result<DocumentCollection, StoreError> {
        let row = sqlx::query(&collection_counts_sql(&collection.table_name)?)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| map_sqlx("count documents", error))?;
        collection.document_count = row
            .try_get("document_count")
            .map_err(|error| map_sqlx("decode document count", error))?;
        collection.document_embedded_count = row
            .try_get("document_embedded_count")
            .map_err(|error| map_sqlx("decode document count", error))?;
        Ok(collection)
    }

    async fn build_hnsw_index(&self, name: &str, table: &str) -> Result<(), StoreError> {
        sqlx::query(&create_hnsw_index_sql(table)?)
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx("create hnsw index", error))?;
        sqlx::query(
            "UPDATE document_collection SET is_indexed = TRUE, updated_at = now() WHERE name = $1",
        )
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx("mark collection indexed", error))?;
        tracing::debug!(table, "hnsw index created");
        Ok(())
    }

    async fn build_ivfflat_index(
        &self,
        name: &str,
        table: &str,
        params: IvfFlatParams,
    ) -> Result<(), StoreError> {
        sqlx::query(&drop_index_sql(table)?)
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx("drop ivfflat index", error))?;
        sqlx::query(&create_ivfflat_index_sql(table, params)?)
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx("create ivfflat index", error))?;
        sqlx::query(
            "UPDATE document_collection SET is_indexed = TRUE, list_count = $1, probe_count = $2, \
             updated_at = now() WHERE name = $3",
        )
        .bind(params.lists)
        .bind(params.probes)
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx("mark collection indexed", error))?;
        tracing::debug!(table, lists = params.lists, probes = params.probes, "ivfflat index created");
        Ok(())
    }
}
