//! Execute the plan across three views in parallel; deduplicate; rank
//! (spec §4.F).

use std::time::Duration;

use crate::memory::MemoryUnit;
use crate::planner::Plan;
use crate::search::{fuse, RetrievalWeights};
use crate::storage::{StoreError, TenantStore};

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("request deadline exceeded with no view returning in time")]
    DeadlineExceeded,
}

/// `score_decay` bump applied to a unit each time it's actually returned to
/// a caller, offsetting the consolidator's age-based decay (spec §3
/// "score_decay rises on recall").
const RECALL_BUMP: f64 = 0.1;

pub struct Retriever {
    pub weights: RetrievalWeights,
}

impl Default for Retriever {
    fn default() -> Self {
        Self { weights: RetrievalWeights::default() }
    }
}

impl Retriever {
    /// Runs the three view searches concurrently under a shared timeout
    /// (spec §5 "Cancellation"). A view that doesn't finish in time
    /// contributes no results; `DeadlineExceeded` is returned only if no
    /// view produced anything (scenario S5).
    pub async fn retrieve(
        &self,
        store: &TenantStore,
        plan: &Plan,
        query_embedding: &[f32],
        deadline: Duration,
        gateway_embedding_dim_check: usize,
    ) -> Result<Vec<MemoryUnit>, RetrieverError> {
        debug_assert_eq!(query_embedding.len(), gateway_embedding_dim_check);

        let sem_fut = tokio::time::timeout(deadline, async {
            store.vector_search(query_embedding, plan.depth.max(4))
        });
        let lex_fut = tokio::time::timeout(deadline, async {
            store.lexical_search(&plan.q_lex, plan.depth.max(4))
        });
        let sym_fut = tokio::time::timeout(deadline, async {
            match &plan.q_sym {
                Some(predicate) => store.symbolic_filter(predicate, plan.depth.max(4)).map(Some),
                None => Ok(None),
            }
        });

        let (sem_res, lex_res, sym_res) = tokio::join!(sem_fut, lex_fut, sym_fut);

        let semantic = sem_res.ok().transpose()?.unwrap_or_default();
        let lexical = lex_res.ok().transpose()?.unwrap_or_default();
        let symbolic = sym_res.ok().transpose()?.flatten();

        if semantic.is_empty() && lexical.is_empty() && symbolic.as_ref().map(Vec::is_empty).unwrap_or(true) {
            return Err(RetrieverError::DeadlineExceeded);
        }

        let ranked = fuse(&semantic, &lexical, symbolic.as_deref(), self.weights);

        let mut top_ids: Vec<i64> = ranked.iter().take(plan.depth).map(|(id, _)| *id).collect();
        let mut units = store.get(&top_ids)?;
        units.sort_by(|a, b| {
            rank_of(&ranked, a.id)
                .partial_cmp(&rank_of(&ranked, b.id))
                .unwrap_or(std::cmp::Ordering::Equal)
                .reverse()
                .then_with(|| b.metadata.timestamp_utc.cmp(&a.metadata.timestamp_utc))
                .then_with(|| b.id.cmp(&a.id))
        });

        // One-hop expansion: for synthesized units in the top-K, include
        // their children as supporting evidence (spec §4.F step 3).
        let mut expansion_ids = Vec::new();
        for unit in &units {
            for &child in &unit.children {
                if !top_ids.contains(&child) && !expansion_ids.contains(&child) {
                    expansion_ids.push(child);
                }
            }
        }
        if !expansion_ids.is_empty() {
            let children = store.get(&expansion_ids)?;
            units.extend(children);
            top_ids.extend(expansion_ids);
        }

        units.truncate(plan.depth);

        for unit in &units {
            // Best-effort: a failed recall bump must never fail retrieval itself.
            let _ = store.record_recall(unit.id, RECALL_BUMP);
        }

        Ok(units)
    }
}

fn rank_of(ranked: &[(i64, f32)], id: i64) -> f32 {
    ranked.iter().find(|(rid, _)| *rid == id).map(|(_, s)| *s).unwrap_or(0.0)
}
