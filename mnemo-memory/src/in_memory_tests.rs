#[cfg(test)]
mod tests {
    use crate::{InMemoryStore, MemoryStore};
    use mnemo_core::{
        DocumentType, MetadataFilter, NewMessage, NewSummary, SearchQuery, SearchType, StoreError,
    };
    use mnemo_retrieval::HashEmbedder;
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    fn store() -> InMemoryStore {
        InMemoryStore::new(Arc::new(HashEmbedder::new(64)))
    }

    #[tokio::test]
    async fn test_put_messages_creates_session_and_keeps_order() {
        let store = store();
        let given = Uuid::new_v4();
        let mut first = NewMessage::new("user", "first");
        first.uuid = Some(given);
        let stored = store
            .put_messages("s", vec![first, NewMessage::new("assistant", "second")])
            .await
            .unwrap();

        assert_eq!(stored[0].uuid, given);
        let messages = store.last_messages("s", 10).await.unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_put_messages_rejects_duplicate_uuid() {
        let store = store();
        let mut message = NewMessage::new("user", "hi");
        message.uuid = Some(Uuid::new_v4());
        store.put_messages("s", vec![message.clone()]).await.unwrap();

        let err = store.put_messages("s", vec![message]).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_summary_checkpoint_must_exist_in_session() {
        let store = store();
        let other = store
            .put_messages("other", vec![NewMessage::new("user", "elsewhere")])
            .await
            .unwrap();
        store
            .put_messages("s", vec![NewMessage::new("user", "here")])
            .await
            .unwrap();

        let err = store
            .put_summary(
                "s",
                NewSummary {
                    content: "bad".to_string(),
                    summary_point_uuid: other[0].uuid,
                    ..NewSummary::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = store
            .put_summary("missing", NewSummary::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_latest_summary_is_most_recent() {
        let store = store();
        let messages = store
            .put_messages(
                "s",
                vec![NewMessage::new("user", "a"), NewMessage::new("user", "b")],
            )
            .await
            .unwrap();
        for (content, message) in [("older", &messages[0]), ("newer", &messages[1])] {
            store
                .put_summary(
                    "s",
                    NewSummary {
                        content: content.to_string(),
                        summary_point_uuid: message.uuid,
                        ..NewSummary::default()
                    },
                )
                .await
                .unwrap();
        }

        let latest = store.latest_summary("s").await.unwrap().unwrap();
        assert_eq!(latest.content, "newer");
    }

    #[tokio::test]
    async fn test_messages_since_unknown_checkpoint_is_none() {
        let store = store();
        store
            .put_messages("s", vec![NewMessage::new("user", "a")])
            .await
            .unwrap();
        assert_eq!(
            store.messages_since("s", Uuid::new_v4(), 5).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_deleted_messages_are_hidden() {
        let store = store();
        let messages = store
            .put_messages(
                "s",
                vec![NewMessage::new("user", "keep"), NewMessage::new("user", "drop")],
            )
            .await
            .unwrap();
        store.delete_messages("s", &[messages[1].uuid]).await.unwrap();

        let remaining = store.last_messages("s", 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].content, "keep");

        let err = store
            .delete_messages("s", &[messages[1].uuid])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_search_messages_by_text_and_metadata() {
        let store = store();
        let mut tagged = NewMessage::new("user", "postgres vector index tuning");
        tagged.metadata = serde_json::from_value(json!({"topic": "db"})).unwrap();
        store
            .put_messages(
                "s",
                vec![
                    tagged,
                    NewMessage::new("assistant", "try hnsw for vector search"),
                    NewMessage::new("user", "thanks"),
                ],
            )
            .await
            .unwrap();

        let by_text = store
            .search_messages("s", &SearchQuery::text("postgres vector index tuning"), 1)
            .await
            .unwrap();
        assert_eq!(by_text[0].item.content, "postgres vector index tuning");

        let by_metadata = store
            .search_messages(
                "s",
                &SearchQuery::default()
                    .with_metadata(MetadataFilter::json_path("$.topic ? (@ == \"db\")")),
                10,
            )
            .await
            .unwrap();
        assert_eq!(by_metadata.len(), 1);
        assert!(by_metadata[0].dist.is_nan());
    }

    #[tokio::test]
    async fn test_search_summaries_with_mmr_returns_at_most_limit() {
        let store = store();
        let messages = store
            .put_messages("s", vec![NewMessage::new("user", "anchor")])
            .await
            .unwrap();
        for content in ["alpha beta", "alpha beta gamma", "delta epsilon"] {
            store
                .put_summary(
                    "s",
                    NewSummary {
                        content: content.to_string(),
                        summary_point_uuid: messages[0].uuid,
                        ..NewSummary::default()
                    },
                )
                .await
                .unwrap();
        }

        let results = store
            .search_summaries(
                "s",
                &SearchQuery::text("alpha beta").with_search_type(SearchType::Mmr),
                2,
            )
            .await
            .unwrap();
        assert!(results.len() <= 2);
        assert_eq!(results[0].item.content, "alpha beta");
    }

    #[tokio::test]
    async fn test_embedding_width_comes_from_model() {
        let embedder = HashEmbedder::new(8).with_dimensions(DocumentType::Summary, 16);
        let store = InMemoryStore::new(Arc::new(embedder));
        store
            .put_messages("s", vec![NewMessage::new("user", "x")])
            .await
            .unwrap();

        let err = store
            .search_messages("s", &SearchQuery::embedding(vec![0.0; 16]), 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 8,
                got: 16
            }
        ));
    }
}
