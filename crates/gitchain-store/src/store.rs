//! # VersionStore: Namespace Registry
//!
//! Entry point of the crate. A `VersionStore` maps each `(type, namespace)`
//! to a single shared [`Repository`] handle, so every writer to a namespace
//! within this store contends on the same lock. Registries are per instance;
//! there is no process-wide state.

use std::fs;
use std::sync::Arc;

use dashmap::DashMap;
use gitchain_core::{
    ContainerId, ContainerRef, ContainerType, Namespace, NamespaceKey, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::commit::{Commit, Container, WriteReceipt};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::repository::Repository;

/// Summary of one namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    /// Container type.
    #[serde(rename = "type")]
    pub container_type: ContainerType,
    /// Namespace name.
    pub namespace: Namespace,
    /// Containers present at head.
    pub container_count: usize,
    /// Head commit, if any.
    pub last_commit: Option<Commit>,
    /// Creation time from `namespace.json`.
    pub created_at: Timestamp,
}

/// The version store: a registry of per-namespace repositories.
#[derive(Debug)]
pub struct VersionStore {
    config: StoreConfig,
    repositories: DashMap<NamespaceKey, Arc<Repository>>,
}

impl VersionStore {
    /// Create a store with the given configuration.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            repositories: DashMap::new(),
        }
    }

    /// The store's configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The shared handle for a namespace. Created on first use.
    pub fn repository(&self, key: &NamespaceKey) -> Arc<Repository> {
        self.repositories
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Repository::open(&self.config, key.clone())))
            .clone()
    }

    fn repository_for(&self, id: &ContainerId) -> Arc<Repository> {
        self.repository(&id.namespace_key())
    }

    /// Create a namespace explicitly. Idempotent.
    pub fn create_namespace(
        &self,
        container_type: ContainerType,
        namespace: Namespace,
    ) -> Result<NamespaceInfo, StoreError> {
        let repo = self.repository(&NamespaceKey::new(container_type, namespace));
        repo.ensure_metadata()?;
        self.info(&repo)?
            .ok_or_else(|| StoreError::Storage(format!("namespace {} not created", repo.key())))
    }

    fn info(&self, repo: &Repository) -> Result<Option<NamespaceInfo>, StoreError> {
        let Some(meta) = repo.metadata()? else {
            return Ok(None);
        };
        Ok(Some(NamespaceInfo {
            container_type: meta.container_type,
            namespace: meta.namespace,
            container_count: repo.container_count()?,
            last_commit: repo.log(Some(1))?.into_iter().next(),
            created_at: meta.created_at,
        }))
    }

    /// Namespaces on disk, optionally restricted to one type, sorted by
    /// type then name.
    pub fn list_namespaces(
        &self,
        container_type: Option<ContainerType>,
    ) -> Result<Vec<NamespaceInfo>, StoreError> {
        let types: Vec<ContainerType> = match container_type {
            Some(t) => vec![t],
            None => ContainerType::ALL.to_vec(),
        };

        let mut out = Vec::new();
        for t in types {
            let dir = self.config.base_dir.join(t.as_str());
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let mut names = Vec::new();
            for entry in entries {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                // Directories that are not valid namespace names are not ours.
                if let Some(ns) = entry.file_name().to_str().and_then(|n| Namespace::new(n).ok()) {
                    names.push(ns);
                }
            }
            names.sort();
            for ns in names {
                let repo = self.repository(&NamespaceKey::new(t, ns));
                if let Some(info) = self.info(&repo)? {
                    out.push(info);
                }
            }
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Container-level shorthands
    // -----------------------------------------------------------------------

    /// Commit a new version of a container.
    pub fn write(&self, id: &ContainerId, data: &Value, message: &str) -> Result<WriteReceipt, StoreError> {
        self.repository_for(id).write(&id.identifier, data, message)
    }

    /// Latest data of a container.
    pub fn read(&self, id: &ContainerId) -> Result<Value, StoreError> {
        self.repository_for(id).read(&id.identifier)
    }

    /// Latest version of a container as a full record.
    pub fn read_container(&self, id: &ContainerId) -> Result<Container, StoreError> {
        self.repository_for(id).read_container(&id.identifier)
    }

    /// Resolve a versioned reference.
    pub fn read_ref(&self, r: &ContainerRef) -> Result<Container, StoreError> {
        self.repository_for(&r.id).read_spec(&r.id.identifier, r.version)
    }

    /// History of a container, newest first.
    pub fn history(&self, id: &ContainerId, limit: Option<usize>) -> Result<Vec<Commit>, StoreError> {
        self.repository_for(id).history(&id.identifier, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitchain_core::{Identifier, VersionSpec};
    use serde_json::json;

    fn cid(s: &str) -> ContainerId {
        ContainerId::parse(s).unwrap()
    }

    #[test]
    fn same_key_same_handle() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::new(StoreConfig::with_base_dir(dir.path()));
        let key = NamespaceKey::new(ContainerType::Memory, Namespace::new("agents").unwrap());
        let a = store.repository(&key);
        let b = store.repository(&key);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn separate_stores_have_separate_registries() {
        let dir = tempfile::tempdir().unwrap();
        let s1 = VersionStore::new(StoreConfig::with_base_dir(dir.path()));
        let s2 = VersionStore::new(StoreConfig::with_base_dir(dir.path()));
        let key = NamespaceKey::new(ContainerType::Memory, Namespace::new("agents").unwrap());
        assert!(!Arc::ptr_eq(&s1.repository(&key), &s2.repository(&key)));
    }

    #[test]
    fn create_and_list_namespaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::new(StoreConfig::with_base_dir(dir.path()));

        let info = store
            .create_namespace(ContainerType::Product, Namespace::new("acme").unwrap())
            .unwrap();
        assert_eq!(info.container_count, 0);
        assert!(info.last_commit.is_none());

        // Idempotent: creation time is preserved.
        let again = store
            .create_namespace(ContainerType::Product, Namespace::new("acme").unwrap())
            .unwrap();
        assert_eq!(again.created_at, info.created_at);

        store
            .write(&cid("0711:product:beta:sku-1"), &json!({"a": 1}), "implicit create")
            .unwrap();
        store
            .write(&cid("0711:campaign:acme:spring"), &json!({"b": 2}), "other type")
            .unwrap();
        fs::create_dir_all(dir.path().join("product").join("Not_A_Namespace")).unwrap();

        let products = store.list_namespaces(Some(ContainerType::Product)).unwrap();
        let names: Vec<_> = products.iter().map(|i| i.namespace.as_str()).collect();
        assert_eq!(names, vec!["acme", "beta"]);
        assert_eq!(products[1].container_count, 1);
        assert_eq!(products[1].last_commit.as_ref().unwrap().message, "implicit create");

        let all = store.list_namespaces(None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].container_type, ContainerType::Campaign);
    }

    #[test]
    fn read_ref_resolves_versions() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::new(StoreConfig::with_base_dir(dir.path()));
        let id = cid("0711:knowledge:docs:faq");
        let r1 = store.write(&id, &json!({"q": 1}), "v1").unwrap();
        let r2 = store.write(&id, &json!({"q": 2}), "v2").unwrap();

        let v1 = store.read_ref(&id.at(VersionSpec::Exact(1))).unwrap();
        assert_eq!(v1.commit_hash, r1.commit_hash);
        assert_eq!(v1.content_hash, r1.content_hash);

        let latest = store.read_ref(&id.at(VersionSpec::Latest)).unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.commit_hash, r2.commit_hash);
        assert_eq!(latest.id.identifier, Identifier::new("faq").unwrap());
    }
}
