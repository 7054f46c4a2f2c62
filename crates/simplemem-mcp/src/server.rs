//! MCP server core: routes JSON-RPC requests to the seven tools this
//! surface exposes, with every `tools/call` resolved against a tenant
//! context established by the HTTP layer before dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use simplemem_core::memory::DialogueTurn;
use simplemem_core::prelude::*;
use tracing::{debug, warn};
use tokio::sync::Mutex as AsyncMutex;

use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult, ServerCapabilities,
    ServerInfo, ToolDescription, ToolResultContent,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_VERSION};
use crate::tools;

/// Everything a tool needs to serve a request, shared across every
/// session and every tenant. No tenant data is held here directly — all
/// of it is reached through `registry`/`metadata`, keyed by the
/// `TenantContext` resolved per request.
pub struct AppShared {
    pub registry: TenantRegistry,
    pub metadata: Arc<MetadataStore>,
    pub auth: Arc<AuthService>,
    pub session_manager: Arc<SessionManager>,
    pub config: Config,
    /// Per-tenant, per-session buffer of dialogue turns awaiting a full
    /// `config.window_size` batch before `memory_add` hands them to the
    /// compressor (spec §4.C "windowed sequence of dialogue turns").
    /// Keyed by `(user_id, source_session_id)`, the latter empty when the
    /// caller didn't supply one.
    pub turn_buffers: AsyncMutex<HashMap<(String, String), Vec<DialogueTurn>>>,
}

impl AppShared {
    /// Builds a provider gateway using the tenant's own decrypted key,
    /// fresh for this call (see DESIGN.md, "per-tenant API key").
    pub fn gateway_for(&self, tenant: &TenantContext) -> Result<simplemem_core::provider::RetryingGateway, simplemem_core::auth::AuthError> {
        let api_key = self.auth.provider_api_key(&tenant.user_id)?;
        Ok(build_gateway(&self.config, Some(api_key)))
    }

    /// Push `turn` onto its tenant/session window, returning the full
    /// window (drained) once it reaches `config.window_size`, or `None`
    /// while still accumulating.
    pub async fn push_turn_and_drain_if_full(
        &self,
        user_id: &str,
        source_session_id: Option<&str>,
        turn: DialogueTurn,
    ) -> Option<Vec<DialogueTurn>> {
        let key = (user_id.to_string(), source_session_id.unwrap_or("").to_string());
        let mut buffers = self.turn_buffers.lock().await;
        let window = buffers.entry(key.clone()).or_default();
        window.push(turn);
        if window.len() >= self.config.window_size.max(1) {
            buffers.remove(&key)
        } else {
            None
        }
    }
}

/// One open MCP session. Holds no tenant data directly — that is the
/// whole point of keeping it separate from `AppShared` (spec §4.L
/// "per-session state holds only a handle, never tenant data directly").
pub struct McpServer {
    shared: Arc<AppShared>,
    initialized: bool,
}

impl McpServer {
    pub fn new(shared: Arc<AppShared>) -> Self {
        Self { shared, initialized: false }
    }

    /// Handle one JSON-RPC request. `tenant` is `None` only when the
    /// `Authorization` header was absent or failed verification; every
    /// method on this surface requires it (spec §4.L "All calls require
    /// Authorization: Bearer <token>").
    pub async fn handle_request(
        &mut self,
        request: JsonRpcRequest,
        tenant: Option<&TenantContext>,
    ) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, "handling MCP request");

        if request.method == "notifications/initialized" {
            self.initialized = true;
            return None;
        }

        let Some(tenant) = tenant else {
            return Some(JsonRpcResponse::error(request.id, JsonRpcError::invalid_params("missing or invalid Authorization header")));
        };

        if !self.initialized && request.method != "initialize" {
            warn!(method = %request.method, "rejecting request: session not initialized");
            return Some(JsonRpcResponse::error(request.id, JsonRpcError::server_not_initialized()));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "tools/list" => self.handle_tools_list().await,
            "tools/call" => self.handle_tools_call(request.params, tenant).await,
            "ping" => Ok(serde_json::json!({})),
            method => {
                warn!(method, "unknown MCP method");
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    async fn handle_initialize(&mut self, params: Option<serde_json::Value>) -> Result<serde_json::Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        let negotiated_version =
            if request.protocol_version.as_str() < MCP_VERSION { request.protocol_version.clone() } else { MCP_VERSION.to_string() };

        self.initialized = true;

        let result = InitializeResult {
            protocol_version: negotiated_version,
            server_info: ServerInfo { name: "simplemem".to_string(), version: env!("CARGO_PKG_VERSION").to_string() },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
            },
            instructions: Some(
                "SimpleMem is a long-term memory service. Use memory_add to store durable facts, \
                 memory_query to recall them, and the session_* tools to bracket a conversation so \
                 prior-session context is injected at the next session's start."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let tools = vec![
            ToolDescription {
                name: "memory_add".to_string(),
                description: Some("Store a durable fact from a single dialogue turn. Runs the full compress-then-synthesize pipeline.".to_string()),
                input_schema: tools::memory_add::schema(),
            },
            ToolDescription {
                name: "memory_query".to_string(),
                description: Some("Answer a question from stored memory, citing only units actually retrieved.".to_string()),
                input_schema: tools::memory_query::schema(),
            },
            ToolDescription {
                name: "memory_delete".to_string(),
                description: Some("Tombstone a memory unit by id.".to_string()),
                input_schema: tools::memory_delete::schema(),
            },
            ToolDescription {
                name: "session_start".to_string(),
                description: Some("Begin a cross-session memory session, returning a budgeted context bundle from prior sessions.".to_string()),
                input_schema: tools::session_start::schema(),
            },
            ToolDescription {
                name: "session_record".to_string(),
                description: Some("Append a redacted event to an active session.".to_string()),
                input_schema: tools::session_record::schema(),
            },
            ToolDescription {
                name: "session_stop".to_string(),
                description: Some("Freeze a session's events, extract observations, compress them into memory, and compute a summary.".to_string()),
                input_schema: tools::session_stop::schema(),
            },
            ToolDescription {
                name: "session_end".to_string(),
                description: Some("Finalize a stopped session.".to_string()),
                input_schema: tools::session_end::schema(),
            },
        ];

        Ok(serde_json::json!({ "tools": tools }))
    }

    /// Tool failures surface as a JSON-RPC protocol-level error carrying the
    /// engine's own numeric code (spec §7), not a `CallToolResult` wrapped
    /// in a success envelope — only a successful tool call reaches that.
    async fn handle_tools_call(&self, params: Option<serde_json::Value>, tenant: &TenantContext) -> Result<serde_json::Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("missing tool call parameters")),
        };

        let result = match request.name.as_str() {
            "memory_add" => tools::memory_add::execute(&self.shared, tenant, request.arguments).await,
            "memory_query" => tools::memory_query::execute(&self.shared, tenant, request.arguments).await,
            "memory_delete" => tools::memory_delete::execute(&self.shared, tenant, request.arguments).await,
            "session_start" => tools::session_start::execute(&self.shared, tenant, request.arguments).await,
            "session_record" => tools::session_record::execute(&self.shared, tenant, request.arguments).await,
            "session_stop" => tools::session_stop::execute(&self.shared, tenant, request.arguments).await,
            "session_end" => tools::session_end::execute(&self.shared, tenant, request.arguments).await,
            other => return Err(JsonRpcError::method_not_found_with_message(&format!("unknown tool '{other}'"))),
        };

        let content = result.map_err(|e| JsonRpcError { code: e.rpc_code(), message: e.to_string(), data: None })?;

        let call_result = CallToolResult {
            content: vec![ToolResultContent { content_type: "text".to_string(), text: serde_json::to_string_pretty(&content).unwrap_or_else(|_| content.to_string()) }],
            is_error: Some(false),
        };

        serde_json::to_value(call_result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }
}
