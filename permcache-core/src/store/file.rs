//! File-backed permission store
//!
//! Keeps all grants in one JSON document. Every mutation rewrites the
//! document to a sibling temp file and renames it over the original, so a
//! crash mid-write leaves either the old or the new document on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::PermissionStore;
use crate::error::{PermCacheError, Result};
use crate::grant::{Action, PermissionGrant, ResourceRef, SubjectId};

#[derive(Debug, Default, Serialize, Deserialize)]
struct GrantDocument {
    #[serde(default)]
    grants: Vec<PermissionGrant>,
}

/// JSON file store
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (or lazily create) a store at `path`
    ///
    /// The parent directory is created if missing. The file itself is only
    /// written on the first mutation; a missing file reads as no grants.
    pub fn new<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PermCacheError::Io {
                message: format!("Failed to create store directory: {}", e),
            })?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every grant in the store, ordered by resource then grant time
    pub async fn all_grants(&self) -> Result<Vec<PermissionGrant>> {
        let mut grants = self.load().await?.grants;
        grants.sort_by(|a, b| {
            a.resource
                .cmp(&b.resource)
                .then(a.granted_at.cmp(&b.granted_at))
        });
        Ok(grants)
    }

    fn unavailable(&self, action: &str, err: std::io::Error) -> PermCacheError {
        PermCacheError::store_unavailable(
            self.name(),
            format!("failed to {} {}: {}", action, self.path.display(), err),
        )
    }

    async fn load(&self) -> Result<GrantDocument> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(GrantDocument::default()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GrantDocument::default()),
            Err(e) => Err(self.unavailable("read", e)),
        }
    }

    async fn persist(&self, doc: &GrantDocument) -> Result<()> {
        let json = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.unavailable("write", e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.unavailable("replace", e))?;
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for FileStore {
    async fn select_grants(&self, resource: &ResourceRef) -> Result<Vec<PermissionGrant>> {
        let doc = self.load().await?;
        Ok(doc
            .grants
            .into_iter()
            .filter(|g| &g.resource == resource)
            .collect())
    }

    async fn insert_grant(&self, grant: &PermissionGrant) -> Result<PermissionGrant> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await?;
        if let Some(existing) = doc
            .grants
            .iter()
            .find(|g| g.matches(&grant.resource, &grant.subject, &grant.action))
        {
            return Ok(existing.clone());
        }
        doc.grants.push(grant.clone());
        self.persist(&doc).await?;
        Ok(grant.clone())
    }

    async fn delete_grant(
        &self,
        resource: &ResourceRef,
        subject: &SubjectId,
        action: &Action,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await?;
        let before = doc.grants.len();
        doc.grants.retain(|g| !g.matches(resource, subject, action));
        if doc.grants.len() == before {
            return Ok(false);
        }
        self.persist(&doc).await?;
        Ok(true)
    }

    async fn health_check(&self) -> Result<()> {
        self.load().await.map(|_| ())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
