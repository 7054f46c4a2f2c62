//! `session_record`: append a redacted event to an active session.

use serde::Deserialize;
use serde_json::{json, Value};
use simplemem_core::prelude::*;
use simplemem_core::session::EventKind;

use crate::server::AppShared;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "memory_session_id": { "type": "string" },
            "kind": { "type": "string", "enum": ["message", "tool_use", "file_change"] },
            "payload": { "type": "string" }
        },
        "required": ["memory_session_id", "kind", "payload"]
    })
}

#[derive(Debug, Deserialize)]
struct Args {
    memory_session_id: String,
    kind: String,
    payload: String,
}

pub async fn execute(shared: &AppShared, tenant: &TenantContext, args: Option<Value>) -> Result<Value> {
    let args: Args = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| Error::InvalidArgument(format!("invalid arguments: {e}")))?,
        None => return Err(Error::InvalidArgument("missing arguments".to_string())),
    };

    let kind = match args.kind.as_str() {
        "message" => EventKind::Message,
        "tool_use" => EventKind::ToolUse,
        "file_change" => EventKind::FileChange,
        other => return Err(Error::InvalidArgument(format!("unknown event kind '{other}'"))),
    };

    let event_id = shared.session_manager.record_event(&tenant.user_id, &args.memory_session_id, kind, &args.payload)?;

    Ok(json!({ "event_id": event_id }))
}
