use std::collections::HashSet;

use mnemo_core::tasks::DOCUMENT_EMBEDDER_TOPIC;
use mnemo_core::{
    check_dimensions, CreateDocumentRequest, Document, DocumentCollection, DocumentSelection,
    DocumentType, EmbeddingTask, EmbeddingUpdate, IndexType, SearchQuery, SearchResult,
    StoreError, UpdateDocumentRequest,
};
use mnemo_sql::map_sqlx;
use mnemo_sql::rows::document_from_row;
use pgvector::Vector;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use tracing::Instrument;
use uuid::Uuid;

use crate::publish::routing;
use crate::search::PgSearchBackend;
use crate::PostgresMemoryStore;

const DOCUMENT_COLUMNS: &str =
    "uuid, created_at, updated_at, document_id, content, metadata, is_embedded, embedding";

impl PostgresMemoryStore {
    /// Inserts a batch of documents in one transaction.
    ///
    /// Auto-embedded collections refuse caller embeddings and embed the
    /// content themselves; other collections require an embedding of the
    /// collection's width on every document.
    pub async fn create_documents(
        &self,
        collection: &str,
        documents: Vec<CreateDocumentRequest>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let collection = self.collection_record(collection).await?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        validate_new_documents(&collection, &documents)?;

        let span = tracing::info_span!(
            "create_documents",
            collection = %collection.name,
            count = documents.len()
        );
        let pending = async {
            let uuids: Vec<Uuid> = documents.iter().map(|_| Uuid::new_v4()).collect();
            let mut inline = if collection.is_auto_embedded && self.embeds_inline() {
                let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
                self.embed_inline(DocumentType::Document, &texts)
                    .await?
                    .into_iter()
                    .map(Some)
                    .collect()
            } else {
                vec![None; documents.len()]
            };

            let mut insert = QueryBuilder::<Postgres>::new(format!(
                "INSERT INTO {} (uuid, document_id, content, metadata, embedding, is_embedded) ",
                collection.table_name
            ));
            insert.push_values(
                uuids.iter().zip(&documents).zip(inline.iter_mut()),
                |mut row, ((uuid, document), inline)| {
                    let embedding = inline
                        .take()
                        .or_else(|| document.embedding.clone())
                        .map(Vector::from);
                    let embedded = embedding.is_some();
                    row.push_bind(*uuid)
                        .push_bind(document.document_id.clone())
                        .push_bind(document.content.clone())
                        .push_bind(Json(document.metadata.clone()))
                        .push_bind(embedding)
                        .push_bind(embedded);
                },
            );

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|error| map_sqlx("begin create documents", error))?;
            insert
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|error| map_sqlx("create documents", error))?;
            tx.commit()
                .await
                .map_err(|error| map_sqlx("commit create documents", error))?;

            let pending: Vec<EmbeddingTask> = if collection.is_auto_embedded && !self.embeds_inline()
            {
                uuids
                    .iter()
                    .zip(&documents)
                    .map(|(uuid, document)| EmbeddingTask {
                        uuid: *uuid,
                        content: document.content.clone(),
                    })
                    .collect()
            } else {
                Vec::new()
            };
            Ok::<_, StoreError>((uuids, pending))
        }
        .instrument(span)
        .await?;

        let (uuids, tasks) = pending;
        if !tasks.is_empty() {
            self.publish_tasks(
                DOCUMENT_EMBEDDER_TOPIC,
                routing("collection", &collection.name),
                tasks,
            )
            .await;
        }
        Ok(uuids)
    }

    /// Sets `document_id` and replaces metadata per uuid; all or nothing.
    pub async fn update_documents(
        &self,
        collection: &str,
        updates: Vec<UpdateDocumentRequest>,
    ) -> Result<(), StoreError> {
        let collection = self.collection_record(collection).await?;
        if let Some(update) = updates
            .iter()
            .find(|update| update.document_id.as_deref().is_some_and(|id| id.trim().is_empty()))
        {
            return Err(StoreError::invalid(format!(
                "document {} has an empty document_id",
                update.uuid
            )));
        }

        let sql = format!(
            "UPDATE {} SET document_id = COALESCE($1, document_id), \
             metadata = COALESCE($2, metadata), updated_at = now() \
             WHERE uuid = $3 AND deleted_at IS NULL",
            collection.table_name
        );
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| map_sqlx("begin update documents", error))?;
        for update in &updates {
            let result = sqlx::query(&sql)
                .bind(&update.document_id)
                .bind(update.metadata.as_ref().map(Json))
                .bind(update.uuid)
                .execute(&mut *tx)
                .await
                .map_err(|error| map_sqlx("update document", error))?;
            if result.rows_affected() == 0 {
                return Err(StoreError::not_found("document", update.uuid));
            }
        }
        tx.commit()
            .await
            .map_err(|error| map_sqlx("commit update documents", error))?;
        Ok(())
    }

    /// Live documents by uuid and/or `document_id`, oldest first; an empty
    /// selection with `limit == 0` returns the whole collection.
    pub async fn get_documents(
        &self,
        collection: &str,
        selection: DocumentSelection,
    ) -> Result<Vec<Document>, StoreError> {
        let collection = self.collection_record(collection).await?;
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {DOCUMENT_COLUMNS} FROM {} WHERE deleted_at IS NULL",
            collection.table_name
        ));
        if !selection.uuids.is_empty() {
            query.push(" AND uuid = ANY(");
            query.push_bind(selection.uuids);
            query.push(")");
        }
        if !selection.document_ids.is_empty() {
            query.push(" AND document_id = ANY(");
            query.push_bind(selection.document_ids);
            query.push(")");
        }
        query.push(" ORDER BY created_at, uuid");
        if selection.limit > 0 {
            query.push(" LIMIT ");
            query.push_bind(i64::try_from(selection.limit).unwrap_or(i64::MAX));
        }

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|error| map_sqlx("get documents", error))?;
        rows.iter()
            .map(document_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| map_sqlx("decode document", error))
    }

    /// Soft-deletes documents; if any uuid is unknown or already deleted,
    /// nothing is deleted.
    pub async fn delete_documents(&self, collection: &str, uuids: &[Uuid]) -> Result<(), StoreError> {
        let collection = self.collection_record(collection).await?;
        let unique: HashSet<Uuid> = uuids.iter().copied().collect();
        if unique.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "UPDATE {} SET deleted_at = now() WHERE uuid = ANY($1) AND deleted_at IS NULL \
             RETURNING uuid",
            collection.table_name
        );
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| map_sqlx("begin delete documents", error))?;
        let deleted: Vec<Uuid> = sqlx::query_scalar(&sql)
            .bind(unique.iter().copied().collect::<Vec<_>>())
            .fetch_all(&mut *tx)
            .await
            .map_err(|error| map_sqlx("delete documents", error))?;
        if deleted.len() != unique.len() {
            let deleted: HashSet<Uuid> = deleted.into_iter().collect();
            let missing = unique
                .iter()
                .find(|uuid| !deleted.contains(uuid))
                .map(Uuid::to_string)
                .unwrap_or_default();
            return Err(StoreError::not_found("document", missing));
        }
        tx.commit()
            .await
            .map_err(|error| map_sqlx("commit delete documents", error))?;
        Ok(())
    }

    pub async fn search_collection(
        &self,
        collection: &str,
        query: &SearchQuery,
        limit: usize,
    ) -> Result<Vec<SearchResult<Document>>, StoreError> {
        let collection = self.collection_record(collection).await?;
        let mut backend = PgSearchBackend::documents(
            &self.pool,
            &collection.table_name,
            collection.embedding_dimensions,
        );
        if collection.index_type == IndexType::IvfFlat && collection.is_indexed {
            backend = backend.with_ivfflat_probes(collection.probe_count);
        }
        let span = tracing::info_span!("search_collection", collection = %collection.name, limit);
        self.search.search(&backend, query, limit).instrument(span).await
    }

    pub async fn update_document_embeddings(
        &self,
        collection: &str,
        updates: &[EmbeddingUpdate],
    ) -> Result<usize, StoreError> {
        let collection = self.collection_record(collection).await?;
        for update in updates {
            check_dimensions(collection.embedding_dimensions, &update.embedding)?;
        }
        if updates.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "UPDATE {} SET embedding = $1, is_embedded = TRUE, updated_at = now() \
             WHERE uuid = $2 AND deleted_at IS NULL",
            collection.table_name
        );
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| map_sqlx("begin document embedding update", error))?;
        let mut skipped = 0usize;
        for update in updates {
            let result = sqlx::query(&sql)
                .bind(Vector::from(update.embedding.clone()))
                .bind(update.uuid)
                .execute(&mut *tx)
                .await
                .map_err(|error| map_sqlx("update document embedding", error))?;
            if result.rows_affected() == 0 {
                skipped += 1;
            }
        }
        tx.commit()
            .await
            .map_err(|error| map_sqlx("commit document embedding update", error))?;
        if skipped > 0 {
            tracing::warn!(
                collection = %collection.name,
                skipped,
                "embedding updates for missing or deleted documents skipped"
            );
        }
        Ok(updates.len() - skipped)
    }
}

fn validate_new_documents(
    collection: &DocumentCollection,
    documents: &[CreateDocumentRequest],
) -> Result<(), StoreError> {
    for document in documents {
        if document.document_id.trim().is_empty() {
            return Err(StoreError::invalid("document_id must not be empty"));
        }
        match (&document.embedding, collection.is_auto_embedded) {
            (Some(_), true) => {
                return Err(StoreError::invalid(format!(
                    "collection {} is auto-embedded; document {} must not carry an embedding",
                    collection.name, document.document_id
                )));
            }
            (Some(embedding), false) => {
                check_dimensions(collection.embedding_dimensions, embedding)?;
            }
            (None, false) => {
                return Err(StoreError::invalid(format!(
                    "collection {} is not auto-embedded; document {} needs an embedding",
                    collection.name, document.document_id
                )));
            }
            (None, true) => {}
        }
    }
    Ok(())
}
