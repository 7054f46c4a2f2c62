//! `memory_query`: plan → retrieve → answer, citing only units actually
//! retrieved (spec §4.E-§4.G).

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use simplemem_core::prelude::*;

use crate::server::AppShared;

const DEFAULT_TOP_K: usize = 8;
const DEFAULT_DEADLINE_MS: u64 = 5_000;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": { "type": "string" },
            "top_k": { "type": "integer", "description": "default 8" },
            "deadline_ms": { "type": "integer", "description": "retrieval deadline, default 5000" }
        },
        "required": ["query"]
    })
}

#[derive(Debug, Deserialize)]
struct Args {
    query: String,
    top_k: Option<usize>,
    deadline_ms: Option<u64>,
}

pub async fn execute(shared: &AppShared, tenant: &TenantContext, args: Option<Value>) -> Result<Value> {
    let args: Args = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| Error::InvalidArgument(format!("invalid arguments: {e}")))?,
        None => return Err(Error::InvalidArgument("missing arguments".to_string())),
    };

    let store = shared.registry.open(&tenant.user_id, tenant.embedding_dim).await?;
    let gateway = shared.gateway_for(tenant)?;

    let planner = Planner::new(args.top_k.unwrap_or(DEFAULT_TOP_K));
    let plan = planner.plan(&args.query, &gateway).await?;

    let query_embedding = gateway.embed(&[plan.q_sem.clone()]).await?.remove(0);

    let deadline = Duration::from_millis(args.deadline_ms.unwrap_or(DEFAULT_DEADLINE_MS));
    let retriever = Retriever::default();
    let units = retriever.retrieve(&store, &plan, &query_embedding, deadline, tenant.embedding_dim).await?;

    let result = Answerer::answer(&args.query, &units, &gateway).await?;

    Ok(json!({
        "answer_text": result.answer_text,
        "cited_unit_ids": result.cited_unit_ids,
        "units": units.iter().map(|u| json!({ "id": u.id, "text": u.text, "kind": u.kind.as_str() })).collect::<Vec<_>>()
    }))
}
