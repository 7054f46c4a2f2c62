//! `memory_add`: buffer a dialogue turn until a full `config.window_size`
//! window has accumulated, then run the compress-then-synthesize pipeline
//! over the whole window (spec §4.C, §4.D).

use chrono::{DateTime, Utc};
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
            "text": { "type": "string", "description": "the dialogue turn's text" },
            "speaker": { "type": "string", "description": "who said it, default 'user'" },
            "timestamp_utc": { "type": "string", "description": "RFC3339 timestamp, default now" },
            "source_session_id": { "type": "string" }
        },
        "required": ["text"]
    })
}

#[derive(Debug, Deserialize)]
struct Args {
    text: String,
    speaker: Option<String>,
    timestamp_utc: Option<String>,
    source_session_id: Option<String>,
}

pub async fn execute(shared: &AppShared, tenant: &TenantContext, args: Option<Value>) -> Result<Value> {
    let args: Args = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| Error::InvalidArgument(format!("invalid arguments: {e}")))?,
        None => return Err(Error::InvalidArgument("missing arguments".to_string())),
    };

    let anchor = args
        .timestamp_utc
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let turn = DialogueTurn { speaker: args.speaker.unwrap_or_else(|| "user".to_string()), text: args.text, timestamp_utc: anchor };

    let window = shared.push_turn_and_drain_if_full(&tenant.user_id, args.source_session_id.as_deref(), turn).await;
    let Some(window) = window else {
        return Ok(json!({ "units": [], "buffered": true }));
    };

    let store = shared.registry.open(&tenant.user_id, tenant.embedding_dim).await?;
    let gateway = shared.gateway_for(tenant)?;

    let drafts = Compressor::compress(&window, anchor, args.source_session_id.as_deref(), &[], &gateway).await?;

    let mut units = Vec::new();
    for draft in drafts {
        let unit = insert_with_synthesis(&store, draft, args.source_session_id.as_deref(), &gateway).await?;
        units.push(json!({ "id": unit.id, "text": unit.text, "kind": unit.kind }));
    }

    Ok(json!({ "units": units, "buffered": false }))
}
