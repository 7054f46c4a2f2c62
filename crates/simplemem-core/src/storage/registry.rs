//! Caches one open `TenantStore` handle per active tenant, evicting idle
//! ones so the process doesn't accumulate an open SQLite connection pair
//! per tenant forever (spec §9 "Per-tenant resource graphs": a scoped
//! handle whose release closes all underlying resources together).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use super::{StoreError, TenantStore};

struct Entry {
    store: Arc<TenantStore>,
    last_used: Instant,
}

pub struct TenantRegistry {
    dir: PathBuf,
    entries: Mutex<HashMap<String, Entry>>,
    idle_evict: std::time::Duration,
}

impl TenantRegistry {
    pub fn new(dir: PathBuf, idle_evict_secs: u64) -> Self {
        Self {
            dir,
            entries: Mutex::new(HashMap::new()),
            idle_evict: std::time::Duration::from_secs(idle_evict_secs),
        }
    }

    /// Open (or return the cached handle for) a tenant's shard.
    pub async fn open(&self, user_id: &str, dimension: usize) -> Result<Arc<TenantStore>, StoreError> {
        let mut entries = self.entries.lock().await;
        self.evict_idle(&mut entries);

        if let Some(entry) = entries.get_mut(user_id) {
            entry.last_used = Instant::now();
            return Ok(entry.store.clone());
        }

        let store = Arc::new(TenantStore::open(&self.dir, user_id, dimension)?);
        entries.insert(user_id.to_string(), Entry { store: store.clone(), last_used: Instant::now() });
        Ok(store)
    }

    fn evict_idle(&self, entries: &mut HashMap<String, Entry>) {
        let now = Instant::now();
        entries.retain(|user_id, entry| {
            let keep = now.duration_since(entry.last_used) < self.idle_evict || Arc::strong_count(&entry.store) > 1;
            if !keep {
                tracing::debug!(user_id, "evicting idle tenant store");
            }
            keep
        });
    }

    pub async fn active_tenant_count(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_caches_handle_across_calls() {
        let dir = TempDir::new().unwrap();
        let registry = TenantRegistry::new(dir.path().to_path_buf(), 3600);
        let a = registry.open("u1", 4).await.unwrap();
        let b = registry.open("u1", 4).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn distinct_tenants_get_distinct_stores() {
        let dir = TempDir::new().unwrap();
        let registry = TenantRegistry::new(dir.path().to_path_buf(), 3600);
        let a = registry.open("u1", 4).await.unwrap();
        let b = registry.open("u2", 4).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
