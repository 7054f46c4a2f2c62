//! Merge ranking across the three views (spec §4.F), grounded in the
//! teacher's `search::hybrid` reciprocal-rank-fusion module, generalized
//! to the unit ranking formula `α·norm(sem) + β·norm(lex) + γ·sym_boost`.

use std::collections::HashMap;

/// Default weights from spec §4.F.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalWeights {
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        RetrievalWeights { alpha: 0.6, beta: 0.3, gamma: 0.1 }
    }
}

/// Min-max normalize a set of (id, score) pairs to [0, 1]. A zero-variance
/// set (all scores equal, including the empty or singleton case) maps to
/// 1.0 for every member rather than dividing by zero.
pub fn min_max_normalize(scored: &[(i64, f32)]) -> HashMap<i64, f32> {
    if scored.is_empty() {
        return HashMap::new();
    }
    let min = scored.iter().map(|(_, s)| *s).fold(f32::INFINITY, f32::min);
    let max = scored.iter().map(|(_, s)| *s).fold(f32::NEG_INFINITY, f32::max);
    let span = max - min;
    scored
        .iter()
        .map(|(id, s)| {
            let norm = if span <= f32::EPSILON { 1.0 } else { (s - min) / span };
            (*id, norm)
        })
        .collect()
}

/// Fuse the three views into one ranked list (spec §4.F steps 1-2).
/// `sym_matched` is the set of ids that passed the symbolic filter (if any
/// filter was present in the plan).
pub fn fuse(
    semantic: &[(i64, f32)],
    lexical: &[(i64, f32)],
    sym_matched: Option<&[i64]>,
    weights: RetrievalWeights,
) -> Vec<(i64, f32)> {
    let sem_norm = min_max_normalize(semantic);
    let lex_norm = min_max_normalize(lexical);
    let sym_set: Option<std::collections::HashSet<i64>> =
        sym_matched.map(|ids| ids.iter().copied().collect());

    let mut all_ids: std::collections::HashSet<i64> = sem_norm.keys().copied().collect();
    all_ids.extend(lex_norm.keys().copied());
    if let Some(set) = &sym_set {
        all_ids.extend(set.iter().copied());
    }

    let mut ranked: Vec<(i64, f32)> = all_ids
        .into_iter()
        .map(|id| {
            let sem = sem_norm.get(&id).copied().unwrap_or(0.0);
            let lex = lex_norm.get(&id).copied().unwrap_or(0.0);
            let sym_boost = match &sym_set {
                Some(set) if set.contains(&id) => 1.0,
                Some(_) => 0.0,
                None => 0.0,
            };
            let score = weights.alpha * sem + weights.beta * lex + weights.gamma * sym_boost;
            (id, score)
        })
        .collect();

    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}
