//! `session_end`: finalize a stopped session.

use serde::Deserialize;
use serde_json::{json, Value};
use simplemem_core::prelude::*;

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

    shared.session_manager.end(&tenant.user_id, &args.memory_session_id)?;

    Ok(json!({ "ended": true }))
}
