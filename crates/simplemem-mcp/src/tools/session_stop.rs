//! `session_stop`: freeze the session, extract observations, then hand
//! them to the compress-then-synthesize pipeline in `config.window_size`
//! batches, the same windowed shape `memory_add` buffers up to before
//! compressing (spec §4.H "hand observations to the compressor", §4.C).

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use simplemem_core::compressor::Compressor;
use simplemem_core::memory::DialogueTurn;
use simplemem_core::prelude::*;
use simplemem_core::synthesizer::insert_with_synthesis;

use crate::server::AppShared;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "memory_session_id": { "type": "string" }
        },
        "required": ["memory_session_id"]
    })
}

#[derive(Debug, Deserialize)]
struct Args {
    memory_session_id: String,
}

pub async fn execute(shared: &AppShared, tenant: &TenantContext, args: Option<Value>) -> Result<Value> {
    let args: Args = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| Error::InvalidArgument(format!("invalid arguments: {e}")))?,
        None => return Err(Error::InvalidArgument("missing arguments".to_string())),
    };

    let store = shared.registry.open(&tenant.user_id, tenant.embedding_dim).await?;
    let gateway = shared.gateway_for(tenant)?;

    let report = shared.session_manager.stop(&tenant.user_id, &args.memory_session_id, &gateway).await?;

    let anchor = Utc::now();
    let window_size = shared.config.window_size.max(1);
    let mut stored_units = Vec::new();
    for chunk in report.observations.chunks(window_size) {
        let turns: Vec<DialogueTurn> = chunk
            .iter()
            .map(|obs| DialogueTurn { speaker: "session".to_string(), text: obs.text.clone(), timestamp_utc: anchor })
            .collect();
        let evidence_event_ids: Vec<String> = chunk.iter().flat_map(|obs| obs.evidence_event_ids.clone()).collect();

        let drafts = Compressor::compress(&turns, anchor, Some(&args.memory_session_id), &evidence_event_ids, &gateway).await?;
        for draft in drafts {
            let unit = insert_with_synthesis(&store, draft, Some(&args.memory_session_id), &gateway).await?;
            stored_units.push(json!({ "id": unit.id, "text": unit.text }));
        }
    }

    Ok(json!({
        "entries_stored": report.entries_stored,
        "observations": report.observations.iter().map(|o| json!({ "category": o.category.as_str(), "text": o.text })).collect::<Vec<_>>(),
        "summary": report.summary,
        "units_stored": stored_units
    }))
}
