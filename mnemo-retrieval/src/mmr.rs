use crate::similarity::cosine_similarity;

/// Greedy Maximal Marginal Relevance selection.
///
/// Returns indices into `candidates`, in selection order. Each step picks the
/// candidate maximising `lambda * sim(c, query) - (1 - lambda) * max sim(c, selected)`;
/// the redundancy term is zero while nothing is selected. Ties keep the earlier
/// candidate. Stops after `limit` picks or when the pool is exhausted.
pub fn rerank(query: &[f32], candidates: &[Vec<f32>], lambda: f32, limit: usize) -> Vec<usize> {
    let relevance: Vec<f32> = candidates
        .iter()
        .map(|candidate| cosine_similarity(query, candidate))
        .collect();
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    let mut selected = Vec::with_capacity(limit.min(candidates.len()));

    while selected.len() < limit && !remaining.is_empty() {
        let mut best: Option<(usize, f32)> = None;
        for (position, &index) in remaining.iter().enumerate() {
            let penalty = if selected.is_empty() {
                0.0
            } else {
                redundancy[index]
            };
            let mut score = lambda * relevance[index] - (1.0 - lambda) * penalty;
            if score.is_nan() {
                score = f32::NEG_INFINITY;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((position, score)),
            }
        }

        let Some((position, _)) = best else {
            break;
        };
        let picked = remaining.remove(position);
        selected.push(picked);

        for &index in &remaining {
            let similarity = cosine_similarity(&candidates[index], &candidates[picked]);
            if similarity > redundancy[index] {
                redundancy[index] = similarity;
            }
        }
    }

    selected
}
