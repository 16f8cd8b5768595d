use mnemo_core::{DocumentType, Embedder};
use mnemo_retrieval::similarity::cosine_similarity;
use mnemo_retrieval::HashEmbedder;

#[tokio::test]
async fn hash_embedder_is_deterministic() {
    let embedder = HashEmbedder::new(16);
    let first = embedder
        .embed_one(DocumentType::Message, "hello world")
        .await
        .unwrap();
    let second = embedder
        .embed_one(DocumentType::Message, "hello world")
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn hash_embedder_batch_matches_single() {
    let embedder = HashEmbedder::new(16);
    let batch = embedder
        .embed(
            DocumentType::Document,
            &["alpha beta".to_string(), "gamma".to_string()],
        )
        .await
        .unwrap();
    let single = embedder
        .embed_one(DocumentType::Document, "gamma")
        .await
        .unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[1], single);
}

#[tokio::test]
async fn vectors_are_unit_length_and_sized_per_kind() {
    let embedder = HashEmbedder::new(8).with_dimensions(DocumentType::Summary, 32);
    assert_eq!(embedder.model(DocumentType::Message).dimensions, 8);
    assert_eq!(embedder.model(DocumentType::Summary).dimensions, 32);
    assert_eq!(embedder.model(DocumentType::Summary).name, "hash-summary");

    let vector = embedder
        .embed_one(DocumentType::Summary, "The quick brown fox")
        .await
        .unwrap();
    assert_eq!(vector.len(), 32);
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn shared_words_score_closer() {
    let embedder = HashEmbedder::new(256);
    let kind = DocumentType::Message;
    let base = embedder.hash_to_vec(kind, "the cat sat on the mat");
    let near = embedder.hash_to_vec(kind, "The cat sat on a mat!");
    let far = embedder.hash_to_vec(kind, "quarterly revenue projections");

    assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
}

#[tokio::test]
async fn blank_text_is_zero_vector() {
    let embedder = HashEmbedder::new(4);
    assert_eq!(embedder.hash_to_vec(DocumentType::Message, "  "), vec![0.0; 4]);
}
