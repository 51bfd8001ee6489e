//! JSON-file [`DomainStore`] so renewal markers survive process restarts.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::collaborators::DomainStore;
use crate::error::WorkflowError;
use crate::state::DomainRecord;

/// Every record lives in one JSON document, rewritten on each `put` through
/// a sibling temp file and a rename.
pub struct FileDomainStore {
    path: PathBuf,
    domains: Mutex<BTreeMap<String, DomainRecord>>,
}

impl FileDomainStore {
    /// Open `path`, starting empty when it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WorkflowError> {
        let path = path.into();
        let domains = match fs::read_to_string(&path) {
            Ok(json) if json.trim().is_empty() => BTreeMap::new(),
            Ok(json) => serde_json::from_str(&json)
                .map_err(|e| WorkflowError::Store(format!("corrupt state file {}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(WorkflowError::Store(format!("cannot read {}: {}", path.display(), e))),
        };
        tracing::debug!(path = %path.display(), domains = domains.len(), "domain state loaded");
        Ok(Self { path, domains: Mutex::new(domains) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> Result<Vec<DomainRecord>, WorkflowError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, DomainRecord>>, WorkflowError> {
        self.domains
            .lock()
            .map_err(|_| WorkflowError::Store("state file lock poisoned".into()))
    }

    fn write(&self, domains: &BTreeMap<String, DomainRecord>) -> Result<(), WorkflowError> {
        let json = serde_json::to_string_pretty(domains)
            .map_err(|e| WorkflowError::Store(format!("cannot encode domain state: {}", e)))?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .map_err(|e| WorkflowError::Store(format!("cannot create {}: {}", dir.display(), e)))?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(|e| WorkflowError::Store(format!("cannot write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| WorkflowError::Store(format!("cannot replace {}: {}", self.path.display(), e)))
    }
}

#[async_trait]
impl DomainStore for FileDomainStore {
    async fn get(&self, domain_id: &str) -> Result<Option<DomainRecord>, WorkflowError> {
        Ok(self.lock()?.get(domain_id).cloned())
    }

    async fn put(&self, domain: DomainRecord) -> Result<(), WorkflowError> {
        let mut domains = self.lock()?;
        let previous = domains.insert(domain.domain_id.clone(), domain.clone());
        if let Err(err) = self.write(&domains) {
            match previous {
                Some(previous) => domains.insert(domain.domain_id.clone(), previous),
                None => domains.remove(&domain.domain_id),
            };
            return Err(err);
        }
        Ok(())
    }
}
