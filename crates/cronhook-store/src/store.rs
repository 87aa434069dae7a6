use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use cronhook_core::{JobSet, JobSpec};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::{Result, StoreError};
use crate::types::{Document, TenantData};

#[derive(Default)]
struct State {
    users: Document,
    /// Bumped by every mutation that changes the document.
    version: u64,
    /// Version last written to disk.
    saved_version: u64,
}

impl State {
    fn touch(&mut self) {
        self.version += 1;
    }

    fn tenant_mut(&mut self, tenant: &str) -> Result<&mut TenantData> {
        self.users
            .get_mut(tenant)
            .ok_or_else(|| StoreError::UserNotFound(tenant.to_string()))
    }
}

/// Thread-safe in-memory view of the configuration document.
///
/// All reads return owned copies. Mutations only mark the store dirty when
/// they actually change something, so an idle service never rewrites the
/// file.
#[derive(Default)]
pub struct ConfigStore {
    state: RwLock<State>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing document. The result is considered saved.
    pub fn from_document(users: Document) -> Self {
        Self {
            state: RwLock::new(State {
                users,
                ..State::default()
            }),
        }
    }

    /// Read and parse the document at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let users = read_document(path.as_ref())?;
        info!(tenants = users.len(), "config store loaded");
        Ok(Self::from_document(users))
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_changed(&self) -> bool {
        let state = self.read();
        state.version != state.saved_version
    }

    /// Write the document to `path` if it changed since the last save.
    /// Returns whether a write happened.
    ///
    /// The file is replaced through a sibling temporary file. A mutation that
    /// lands while the file is being written leaves the store dirty.
    pub fn save_if_changed(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let (users, version) = {
            let state = self.read();
            if state.version == state.saved_version {
                return Ok(false);
            }
            (state.users.clone(), state.version)
        };

        write_document(path, &users)?;

        let mut state = self.write();
        state.saved_version = state.saved_version.max(version);
        debug!(path = %path.display(), tenants = users.len(), "config store saved");
        Ok(true)
    }

    // ── Whole document ───────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Document {
        self.read().users.clone()
    }

    pub fn replace_all(&self, users: Document) {
        let mut state = self.write();
        if state.users != users {
            state.users = users;
            state.touch();
        }
    }

    /// Every tenant's job list, including tenants with none.
    pub fn list_tenants_with_jobs(&self) -> JobSet {
        self.read()
            .users
            .iter()
            .map(|(tenant, data)| (tenant.clone(), data.cron.clone()))
            .collect()
    }

    // ── Tenants ──────────────────────────────────────────────────────────────

    pub fn tenants(&self) -> Vec<String> {
        self.read().users.keys().cloned().collect()
    }

    pub fn tenant_exists(&self, tenant: &str) -> bool {
        self.read().users.contains_key(tenant)
    }

    /// Returns `false` if the tenant already existed.
    pub fn create_tenant(&self, tenant: &str) -> bool {
        let mut state = self.write();
        if state.users.contains_key(tenant) {
            return false;
        }
        state.users.insert(tenant.to_string(), TenantData::default());
        state.touch();
        true
    }

    pub fn delete_tenant(&self, tenant: &str) -> bool {
        let mut state = self.write();
        let removed = state.users.remove(tenant).is_some();
        if removed {
            state.touch();
        }
        removed
    }

    // ── Jobs ─────────────────────────────────────────────────────────────────

    pub fn jobs(&self, tenant: &str) -> Option<Vec<JobSpec>> {
        self.read().users.get(tenant).map(|d| d.cron.clone())
    }

    pub fn job(&self, tenant: &str, id: &str) -> Option<JobSpec> {
        self.read()
            .users
            .get(tenant)?
            .cron
            .iter()
            .find(|j| j.id == id)
            .cloned()
    }

    /// Replace the job with the same ID in place, or append it.
    /// Returns `true` when an existing job was replaced.
    pub fn upsert_job(&self, tenant: &str, job: JobSpec) -> Result<bool> {
        let mut state = self.write();
        let data = state.tenant_mut(tenant)?;
        let (replaced, changed) = match data.cron.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => {
                let changed = *existing != job;
                *existing = job;
                (true, changed)
            }
            None => {
                data.cron.push(job);
                (false, true)
            }
        };
        if changed {
            state.touch();
        }
        Ok(replaced)
    }

    pub fn delete_job(&self, tenant: &str, id: &str) -> bool {
        let mut state = self.write();
        let Ok(data) = state.tenant_mut(tenant) else {
            return false;
        };
        let before = data.cron.len();
        data.cron.retain(|j| j.id != id);
        let removed = data.cron.len() != before;
        if removed {
            state.touch();
        }
        removed
    }

    /// Returns `false` if the job does not exist.
    pub fn set_job_active(&self, tenant: &str, id: &str, active: bool) -> bool {
        let mut state = self.write();
        let Ok(data) = state.tenant_mut(tenant) else {
            return false;
        };
        let Some(job) = data.cron.iter_mut().find(|j| j.id == id) else {
            return false;
        };
        if job.active != active {
            job.active = active;
            state.touch();
        }
        true
    }

    /// Set the flag on every job of a tenant. Returns the number of jobs,
    /// or `None` for an unknown tenant.
    pub fn set_all_jobs_active(&self, tenant: &str, active: bool) -> Option<usize> {
        let mut state = self.write();
        let data = state.users.get_mut(tenant)?;
        let mut changed = false;
        for job in data.cron.iter_mut().filter(|j| j.active != active) {
            job.active = active;
            changed = true;
        }
        let count = data.cron.len();
        if changed {
            state.touch();
        }
        Some(count)
    }

    pub fn replace_jobs(&self, tenant: &str, jobs: Vec<JobSpec>) -> Result<()> {
        let mut state = self.write();
        let data = state.tenant_mut(tenant)?;
        if data.cron != jobs {
            data.cron = jobs;
            state.touch();
        }
        Ok(())
    }

    // ── Key-value data ───────────────────────────────────────────────────────

    pub fn data_keys(&self, tenant: &str) -> Option<Vec<String>> {
        self.read()
            .users
            .get(tenant)
            .map(|d| d.data.keys().cloned().collect())
    }

    pub fn get_data(&self, tenant: &str, key: &str) -> Option<Value> {
        self.read().users.get(tenant)?.data.get(key).cloned()
    }

    pub fn set_data(&self, tenant: &str, key: &str, value: Value) -> Result<()> {
        let mut state = self.write();
        let data = state.tenant_mut(tenant)?;
        if data.data.get(key) != Some(&value) {
            data.data.insert(key.to_string(), value);
            state.touch();
        }
        Ok(())
    }

    pub fn delete_data(&self, tenant: &str, key: &str) -> bool {
        let mut state = self.write();
        let Ok(data) = state.tenant_mut(tenant) else {
            return false;
        };
        let removed = data.data.remove(key).is_some();
        if removed {
            state.touch();
        }
        removed
    }
}

/// Parse the document at `path`. Exposed for the reload path, which swaps
/// in a fresh copy of the file without rebuilding the store.
pub fn read_document(path: &Path) -> Result<Document> {
    let raw = std::fs::read(path).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_slice(&raw)?)
}

fn write_document(path: &Path, users: &Document) -> Result<()> {
    let io_err = |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let body = serde_json::to_vec_pretty(users)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with_alice() -> ConfigStore {
        let store = ConfigStore::new();
        store.create_tenant("alice");
        store
    }

    #[test]
    fn create_is_idempotent_and_marks_change_once() {
        let store = ConfigStore::new();
        assert!(!store.is_changed());
        assert!(store.create_tenant("alice"));
        assert!(store.is_changed());
        assert!(!store.create_tenant("alice"));
        assert_eq!(store.tenants(), vec!["alice"]);
        assert!(store.tenant_exists("alice"));
        assert!(!store.tenant_exists("bob"));
    }

    #[test]
    fn upsert_replaces_in_place_or_appends() {
        let store = store_with_alice();
        let a = JobSpec::new("a", "0 * * * * *", "http://a", true);
        let b = JobSpec::new("b", "0 * * * * *", "http://b", false);
        assert!(!store.upsert_job("alice", a.clone()).unwrap());
        assert!(!store.upsert_job("alice", b.clone()).unwrap());

        let a2 = JobSpec::new("a", "*/5 * * * * *", "http://a2", false);
        assert!(store.upsert_job("alice", a2.clone()).unwrap());
        assert_eq!(store.jobs("alice").unwrap(), vec![a2.clone(), b]);
        assert_eq!(store.job("alice", "a"), Some(a2));

        assert!(matches!(
            store.upsert_job("nobody", a),
            Err(StoreError::UserNotFound(_))
        ));
    }

    #[test]
    fn activation_flags() {
        let store = store_with_alice();
        for id in ["a", "b", "c"] {
            store
                .upsert_job("alice", JobSpec::new(id, "0 * * * * *", "http://x", true))
                .unwrap();
        }
        assert!(store.set_job_active("alice", "b", false));
        assert!(!store.set_job_active("alice", "zzz", false));
        assert_eq!(store.set_all_jobs_active("alice", false), Some(3));
        assert!(store.jobs("alice").unwrap().iter().all(|j| !j.active));
        assert_eq!(store.set_all_jobs_active("nobody", true), None);
    }

    #[test]
    fn delete_job_and_tenant() {
        let store = store_with_alice();
        store
            .upsert_job("alice", JobSpec::new("a", "0 * * * * *", "http://x", true))
            .unwrap();
        assert!(store.delete_job("alice", "a"));
        assert!(!store.delete_job("alice", "a"));
        assert!(store.delete_tenant("alice"));
        assert!(!store.delete_tenant("alice"));
        assert!(store.jobs("alice").is_none());
    }

    #[test]
    fn key_value_data() {
        let store = store_with_alice();
        store.set_data("alice", "threshold", json!(42)).unwrap();
        store.set_data("alice", "labels", json!(["a", "b"])).unwrap();
        assert_eq!(store.data_keys("alice").unwrap(), vec!["labels", "threshold"]);
        assert_eq!(store.get_data("alice", "threshold"), Some(json!(42)));
        assert!(store.delete_data("alice", "threshold"));
        assert!(!store.delete_data("alice", "threshold"));
        assert!(store.get_data("alice", "threshold").is_none());
        assert!(store.set_data("bob", "k", json!(1)).is_err());
    }

    #[test]
    fn list_tenants_with_jobs_includes_empty_tenants() {
        let store = store_with_alice();
        store.create_tenant("bob");
        store
            .upsert_job("alice", JobSpec::new("a", "0 * * * * *", "http://x", true))
            .unwrap();
        let set = store.list_tenants_with_jobs();
        assert_eq!(set.len(), 2);
        assert_eq!(set["alice"].len(), 1);
        assert!(set["bob"].is_empty());
    }

    #[test]
    fn document_wire_shape() {
        let raw = json!({
            "alice": {
                "cron": [{"id": "a", "cron": "0 * * * * *", "url": "http://x", "active": true}],
                "data": {"k": {"nested": true}}
            },
            "bob": {}
        });
        let doc: Document = serde_json::from_value(raw).unwrap();
        let store = ConfigStore::from_document(doc);
        assert!(!store.is_changed());
        assert_eq!(store.job("alice", "a").unwrap().url, "http://x");
        assert_eq!(store.get_data("alice", "k"), Some(json!({"nested": true})));
        assert!(store.jobs("bob").unwrap().is_empty());
    }
}
