//! `session_start`: open a session and hand back a budgeted context bundle
//! assembled from the tenant's most recent session summary plus whatever
//! units the prompt retrieves (spec §4.H, §4.I).

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use simplemem_core::prelude::*;

use crate::server::AppShared;

const CONTEXT_BUDGET_TOKENS: usize = 2_000;
const RETRIEVAL_DEADLINE_MS: u64 = 3_000;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "content_session_id": { "type": "string" },
            "project": { "type": "string" },
            "user_prompt": { "type": "string", "description": "the prompt opening this session, used to seed retrieval" }
        },
        "required": ["content_session_id"]
    })
}

#[derive(Debug, Deserialize)]
struct Args {
    content_session_id: String,
    project: Option<String>,
    user_prompt: Option<String>,
}

pub async fn execute(shared: &AppShared, tenant: &TenantContext, args: Option<Value>) -> Result<Value> {
    let args: Args = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| Error::InvalidArgument(format!("invalid arguments: {e}")))?,
        None => return Err(Error::InvalidArgument("missing arguments".to_string())),
    };

    let memory_session_id = shared.session_manager.start(&tenant.user_id, &args.content_session_id, args.project.as_deref())?;

    let store = shared.registry.open(&tenant.user_id, tenant.embedding_dim).await?;
    let gateway = shared.gateway_for(tenant)?;

    let summary = shared.metadata.latest_session_summary(&tenant.user_id)?.unwrap_or_default();
    let user_prompt = args.user_prompt.unwrap_or_default();

    let query_embedding = if user_prompt.is_empty() {
        vec![0.0; tenant.embedding_dim]
    } else {
        gateway.embed(&[user_prompt.clone()]).await?.remove(0)
    };

    let injector = ContextInjector::new(shared.config.top_k);
    let bundle = injector
        .build(&store, &summary, &user_prompt, &query_embedding, CONTEXT_BUDGET_TOKENS, Duration::from_millis(RETRIEVAL_DEADLINE_MS), &gateway)
        .await?;

    Ok(json!({
        "memory_session_id": memory_session_id,
        "context": {
            "summary_block": bundle.summary_block,
            "total_tokens": bundle.total_tokens,
            "units": bundle.units.iter().map(|u| json!({ "id": u.id, "text": u.text })).collect::<Vec<_>>()
        }
    }))
}
