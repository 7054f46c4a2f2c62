//! `memory_delete`: tombstone a memory unit by id (spec §4.J garbage
//! collection operates on tombstoned units, never a hard delete here).

use serde::Deserialize;
use serde_json::{json, Value};
use simplemem_core::prelude::*;

use crate::server::AppShared;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "unit_id": { "type": "integer" }
        },
        "required": ["unit_id"]
    })
}

#[derive(Debug, Deserialize)]
struct Args {
    unit_id: i64,
}

pub async fn execute(shared: &AppShared, tenant: &TenantContext, args: Option<Value>) -> Result<Value> {
    let args: Args = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| Error::InvalidArgument(format!("invalid arguments: {e}")))?,
        None => return Err(Error::InvalidArgument("missing arguments".to_string())),
    };

    let store = shared.registry.open(&tenant.user_id, tenant.embedding_dim).await?;
    store.tombstone(args.unit_id)?;

    Ok(json!({ "tombstoned": true, "id": args.unit_id }))
}
