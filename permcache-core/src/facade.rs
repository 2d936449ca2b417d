//! Authorization facade boundary
//!
//! Upstream code depends on [`Authorizer`], not on the manager, so tests and
//! other deployments can substitute their own answerer.
//!
//! The cache layer never decides what an unknown answer means. Callers that
//! want a plain yes/no pick an [`OnStoreFailure`] explicitly and go through
//! [`authorize`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::grant::{Action, ResourceRef, SubjectId};
use crate::manager::PermissionCacheManager;

/// Yes/no permission answers, or an error when the answer is unknown
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn has_permission(
        &self,
        subject: &SubjectId,
        resource: &ResourceRef,
        action: &Action,
    ) -> Result<bool>;
}

#[async_trait]
impl Authorizer for PermissionCacheManager {
    async fn has_permission(
        &self,
        subject: &SubjectId,
        resource: &ResourceRef,
        action: &Action,
    ) -> Result<bool> {
        PermissionCacheManager::has_permission(self, subject, resource, action).await
    }
}

/// What a caller wants when the store cannot answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnStoreFailure {
    /// Treat unknown as denied
    Deny,
    /// Treat unknown as allowed
    Allow,
    /// Surface the error
    Propagate,
}

/// Ask `authorizer`, resolving store unavailability per `on_failure`
///
/// Only store unavailability is folded into a boolean; validation and other
/// errors always propagate.
pub async fn authorize(
    authorizer: &dyn Authorizer,
    on_failure: OnStoreFailure,
    subject: &SubjectId,
    resource: &ResourceRef,
    action: &Action,
) -> Result<bool> {
    match authorizer.has_permission(subject, resource, action).await {
        Err(e) if e.is_store_unavailable() => match on_failure {
            OnStoreFailure::Deny => {
                warn!(%subject, %resource, %action, error = %e, "store unavailable, failing closed");
                Ok(false)
            }
            OnStoreFailure::Allow => {
                warn!(%subject, %resource, %action, error = %e, "store unavailable, failing open");
                Ok(true)
            }
            OnStoreFailure::Propagate => Err(e),
        },
        other => other,
    }
}
