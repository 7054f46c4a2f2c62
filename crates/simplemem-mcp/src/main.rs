//! SimpleMem MCP server.
//!
//! Serves the seven-tool MCP surface (spec §4.L) over Streamable HTTP,
//! alongside a plain `/api/auth/*` REST surface for registration and token
//! refresh, and runs a periodic per-tenant consolidation pass in the
//! background.

mod auth_http;
mod protocol;
mod server;
mod tools;

use std::sync::Arc;

use simplemem_core::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::protocol::http::{HttpTransport, HttpTransportConfig};
use crate::server::AppShared;

fn init_logging() {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let json = std::env::var("LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Runs every `consolidation_interval_hours`, skipping any tenant whose
/// last run was more recent than that (mirrors the teacher's staleness
/// check, re-targeted at `MetadataStore::last_consolidation` per tenant
/// instead of a single global timestamp).
fn spawn_consolidation_task(shared: Arc<AppShared>) {
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(shared.config.consolidation_interval_hours * 3600);
        loop {
            let user_ids = match shared.metadata.all_user_ids() {
                Ok(ids) => ids,
                Err(e) => {
                    warn!("could not list tenants for consolidation: {e}");
                    tokio::time::sleep(interval).await;
                    continue;
                }
            };

            for user_id in user_ids {
                let stale = match shared.metadata.last_consolidation(&user_id) {
                    Ok(Some(last)) => chrono::Utc::now() - last > chrono::Duration::hours(shared.config.consolidation_interval_hours as i64),
                    Ok(None) => true,
                    Err(e) => {
                        warn!(user_id, "could not read consolidation history: {e} — running anyway");
                        true
                    }
                };
                if !stale {
                    continue;
                }

                let dim = match shared.metadata.user_embedding_dim(&user_id) {
                    Ok(d) => d,
                    Err(e) => {
                        warn!(user_id, "skipping consolidation: {e}");
                        continue;
                    }
                };
                let store = match shared.registry.open(&user_id, dim).await {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(user_id, "skipping consolidation: could not open tenant store: {e}");
                        continue;
                    }
                };
                let api_key = match shared.auth.provider_api_key(&user_id) {
                    Ok(k) => k,
                    Err(e) => {
                        warn!(user_id, "skipping consolidation: could not decrypt provider key: {e}");
                        continue;
                    }
                };
                let gateway = build_gateway(&shared.config, Some(api_key));

                match Consolidator::default().run(&store, &gateway).await {
                    Ok(report) => {
                        info!(
                            user_id,
                            decayed = report.decayed,
                            merged = report.merged,
                            pruned = report.pruned,
                            gc_deleted = report.gc_deleted,
                            "consolidation complete"
                        );
                        if let Err(e) = shared.metadata.record_consolidation(&user_id, report.decayed, report.merged, report.pruned) {
                            warn!(user_id, "could not record consolidation run: {e}");
                        }
                    }
                    Err(e) => warn!(user_id, "consolidation failed: {e}"),
                }
            }

            tokio::time::sleep(interval).await;
        }
    });
}

#[tokio::main]
async fn main() {
    init_logging();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let metadata = match MetadataStore::open(&config.user_db_path) {
        Ok(m) => Arc::new(m),
        Err(e) => {
            error!("failed to open metadata store: {e}");
            std::process::exit(1);
        }
    };

    let registry = TenantRegistry::new(config.vector_db_path.clone(), 3600);
    let auth = Arc::new(AuthService::new(
        metadata.clone(),
        config.jwt_secret_key.clone(),
        config.encryption_key,
        config.jwt_expiration_days,
        config.jwt_refresh_grace_hours,
    ));
    let session_manager = Arc::new(SessionManager::new(metadata.clone(), &config.redaction_patterns));

    let host = config.host.clone();
    let port = config.port;

    let shared = Arc::new(AppShared {
        registry,
        metadata,
        auth,
        session_manager,
        config,
        turn_buffers: tokio::sync::Mutex::new(std::collections::HashMap::new()),
    });

    spawn_consolidation_task(shared.clone());

    info!("SimpleMem MCP server v{} starting on {}:{}", env!("CARGO_PKG_VERSION"), host, port);

    let transport = HttpTransport::new(HttpTransportConfig { host, port });
    if let Err(e) = transport.run(shared).await {
        error!("server error: {e}");
        std::process::exit(1);
    }

    info!("SimpleMem MCP server shutting down");
}
