use mnemo_retrieval::mmr::rerank;

#[test]
fn lambda_one_matches_similarity_order() {
    let query = [1.0, 0.0];
    let candidates = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.7, 0.7]];

    assert_eq!(rerank(&query, &candidates, 1.0, 3), vec![1, 2, 0]);
}

#[test]
fn ties_keep_candidate_order() {
    let query = [1.0, 0.0];
    let candidates = vec![vec![0.5, 0.5]; 3];

    assert_eq!(rerank(&query, &candidates, 1.0, 3), vec![0, 1, 2]);
}

#[test]
fn pool_smaller_than_limit_returns_whole_pool() {
    let query = [1.0, 0.0, 0.0];
    let candidates = vec![
        vec![0.2, 0.9, 0.1],
        vec![0.9, 0.1, 0.0],
        vec![0.1, 0.1, 0.9],
    ];

    let mut picked = rerank(&query, &candidates, 0.5, 10);
    assert_eq!(picked.len(), 3);
    picked.sort_unstable();
    assert_eq!(picked, vec![0, 1, 2]);
}

#[test]
fn penalises_near_duplicates() {
    let query = [1.0, 0.0];
    let candidates = vec![
        vec![0.95, 0.312],
        vec![0.94, 0.341],
        vec![0.8, -0.6],
    ];

    assert_eq!(rerank(&query, &candidates, 1.0, 3), vec![0, 1, 2]);
    assert_eq!(rerank(&query, &candidates, 0.5, 3), vec![0, 2, 1]);
    assert_eq!(rerank(&query, &candidates, 0.5, 2), vec![0, 2]);
}

#[test]
fn empty_pool_or_zero_limit_selects_nothing() {
    assert!(rerank(&[1.0], &[], 0.5, 4).is_empty());
    assert!(rerank(&[1.0], &[vec![1.0]], 0.5, 0).is_empty());
}

#[test]
fn nan_candidates_are_picked_last() {
    let query = [1.0, 0.0];
    let candidates = vec![vec![f32::NAN, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]];

    assert_eq!(rerank(&query, &candidates, 1.0, 3), vec![2, 1, 0]);
}
