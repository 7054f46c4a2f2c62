//! Online merge of related units into higher-level abstractions during
//! write (spec §4.D), the multi-tenant generalization of the teacher's
//! prediction-error-gate `smart_ingest` flow.

use serde_json::json;

use crate::memory::{tokenize, DraftUnit, MemoryUnit, UnitMetadata};
use crate::provider::{ChatMessage, ProviderError, ProviderGateway};
use crate::storage::{StoreError, TenantStore};

const DEFAULT_CANDIDATE_COUNT: usize = 8;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SynthesizerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("cyclic merge: unit {0} would become its own descendant")]
    CyclicMerge(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    KeepSeparate,
    MergeIntoNewAbstraction,
    USubsumesCandidate,
    CandidateSubsumesU,
}

fn verdict_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "verdict": {
                "type": "string",
                "enum": ["keep_separate", "merge_into_new_abstraction", "u_subsumes_candidate", "candidate_subsumes_u"]
            },
            "merged_text": { "type": "string" }
        },
        "required": ["verdict"]
    })
}

/// Insert `draft` as an atomic unit, then run the synthesizer inline
/// against it (spec §4.D). This is the write path every caller — live
/// ingestion and the consolidator's merge phase alike — goes through.
pub async fn insert_with_synthesis(
    store: &TenantStore,
    draft: DraftUnit,
    source_session_id: Option<&str>,
    gateway: &dyn ProviderGateway,
) -> Result<MemoryUnit, SynthesizerError> {
    let inserted = store.insert(draft)?;
    synthesize(store, &inserted, source_session_id, gateway).await
}

/// Run the synthesizer over an already-inserted unit `u`. Idempotent: a
/// unit whose `synthesized_at` is already set is a no-op that returns
/// itself unchanged (spec §4.D step 4, Testable Property #6).
pub async fn synthesize(
    store: &TenantStore,
    u: &MemoryUnit,
    source_session_id: Option<&str>,
    gateway: &dyn ProviderGateway,
) -> Result<MemoryUnit, SynthesizerError> {
    if u.synthesized_at.is_some() {
        return Ok(u.clone());
    }

    let candidate_ids = store.vector_search(&u.embedding, DEFAULT_CANDIDATE_COUNT)?;
    let mut candidates = store.get(&candidate_ids.iter().map(|(id, _)| *id).collect::<Vec<_>>())?;
    candidates.retain(|c| {
        c.id != u.id
            && !c.tombstoned
            && match source_session_id {
                Some(sid) => c.metadata.source_session_id.as_deref() == Some(sid),
                None => true,
            }
    });

    for candidate in candidates {
        let verdict = ask_verdict(u, &candidate, gateway).await?;
        match verdict.0 {
            Verdict::KeepSeparate => continue,
            Verdict::USubsumesCandidate => {
                return merge(store, u, &candidate, &[candidate.id], verdict.1.as_deref()).await;
            }
            Verdict::CandidateSubsumesU => {
                return merge(store, &candidate, u, &[u.id], verdict.1.as_deref()).await;
            }
            Verdict::MergeIntoNewAbstraction => {
                return merge(store, u, &candidate, &[u.id, candidate.id], verdict.1.as_deref()).await;
            }
        }
    }

    Ok(u.clone())
}

async fn ask_verdict(
    u: &MemoryUnit,
    candidate: &MemoryUnit,
    gateway: &dyn ProviderGateway,
) -> Result<(Verdict, Option<String>), SynthesizerError> {
    let system = "Decide the relationship between two memory units: are they the same fact, is one a \
                  subsuming abstraction of the other, or should they remain separate?";
    let prompt = format!("Unit U: {}\nCandidate: {}", u.text, candidate.text);
    let response = gateway.chat(system, &[ChatMessage::user(prompt)], Some(&verdict_schema())).await?;
    let Some(structured) = response.structured else {
        return Ok((Verdict::KeepSeparate, None));
    };
    let verdict = match structured["verdict"].as_str() {
        Some("merge_into_new_abstraction") => Verdict::MergeIntoNewAbstraction,
        Some("u_subsumes_candidate") => Verdict::USubsumesCandidate,
        Some("candidate_subsumes_u") => Verdict::CandidateSubsumesU,
        _ => Verdict::KeepSeparate,
    };
    let merged_text = structured["merged_text"].as_str().map(str::to_string);
    Ok((verdict, merged_text))
}

/// Write the merged abstraction, tombstoning `children_ids`. Refuses if
/// the merge would create a cycle (spec §9 "Cyclic references").
async fn merge(
    store: &TenantStore,
    base: &MemoryUnit,
    other: &MemoryUnit,
    children_ids: &[i64],
    merged_text: Option<&str>,
) -> Result<MemoryUnit, SynthesizerError> {
    for &child_id in children_ids {
        if would_create_cycle(store, base.id, child_id)? {
            return Err(SynthesizerError::CyclicMerge(child_id));
        }
    }

    let text = merged_text.map(str::to_string).unwrap_or_else(|| format!("{} {}", base.text, other.text));
    let metadata = UnitMetadata::merge(&base.metadata, &other.metadata);
    let tokens = tokenize(&text);

    let merged = store.insert_synthesized(&text, &base.embedding, &tokens, &metadata, children_ids)?;
    Ok(merged)
}

/// Walk `candidate_id`'s children chain; refuse if `new_unit_id` would
/// appear among its own descendants.
fn would_create_cycle(store: &TenantStore, new_unit_id: i64, candidate_id: i64) -> Result<bool, StoreError> {
    if new_unit_id == candidate_id {
        return Ok(true);
    }
    let mut frontier = vec![candidate_id];
    let mut visited = std::collections::HashSet::new();
    while let Some(id) = frontier.pop() {
        if !visited.insert(id) {
            continue;
        }
        if id == new_unit_id {
            return Ok(true);
        }
        let units = store.get(&[id])?;
        if let Some(unit) = units.first() {
            frontier.extend(unit.children.iter().copied());
        }
    }
    Ok(false)
}
