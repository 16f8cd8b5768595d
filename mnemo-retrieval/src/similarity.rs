/// Cosine similarity; `0.0` when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = dot_and_norms(a, b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Cosine similarity as the database reports it: `NaN` when a vector has zero norm.
pub fn cosine_score(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = dot_and_norms(a, b);
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn dot_and_norms(a: &[f32], b: &[f32]) -> (f32, f32, f32) {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    (dot, norm_a, norm_b)
}
