//! Grant data model
//!
//! A [`PermissionGrant`] is the durable row the store owns. A
//! [`ResourcePermissionSet`] is the derived, cacheable view of all grants on
//! one resource, flattened to `"{subject}:{action}"` entries.
//!
//! Identifiers are validated at construction so malformed input never
//! reaches a store or cache call.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PermCacheError, Result};

/// Longest identifier accepted for any field
pub const MAX_IDENT_LEN: usize = 128;

/// Separator between subject and action in a set entry, and between
/// resource type and id in a cache key
pub const SEPARATOR: char = ':';

/// Resource type used by the device-management deployment
pub const DEVICE_RESOURCE_TYPE: &str = "device";

fn validate_ident(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(PermCacheError::invalid(field, "must not be empty"));
    }
    if value.len() > MAX_IDENT_LEN {
        return Err(PermCacheError::invalid(
            field,
            format!("must be at most {} bytes, got {}", MAX_IDENT_LEN, value.len()),
        ));
    }
    if value.contains(SEPARATOR) {
        return Err(PermCacheError::invalid(
            field,
            format!("must not contain '{}'", SEPARATOR),
        ));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(PermCacheError::invalid(
            field,
            "must not contain whitespace or control characters",
        ));
    }
    Ok(())
}

/// A user, role or department identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        validate_ident("subject", &value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SubjectId {
    type Error = PermCacheError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SubjectId> for String {
    fn from(value: SubjectId) -> Self {
        value.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An action name, normalized to ASCII uppercase (`read` == `READ`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Action(String);

impl Action {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        validate_ident("action", &value)?;
        Ok(Self(value.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Action {
    type Error = PermCacheError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Action> for String {
    fn from(value: Action) -> Self {
        value.0
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A typed resource reference; its cache key is `"{type}:{id}"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawResourceRef")]
pub struct ResourceRef {
    resource_type: String,
    resource_id: String,
}

// Unvalidated wire form; every decoded ResourceRef goes through `ResourceRef::new`
#[derive(Deserialize)]
struct RawResourceRef {
    resource_type: String,
    resource_id: String,
}

impl TryFrom<RawResourceRef> for ResourceRef {
    type Error = PermCacheError;

    fn try_from(raw: RawResourceRef) -> Result<Self> {
        Self::new(raw.resource_type, raw.resource_id)
    }
}

impl ResourceRef {
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Result<Self> {
        let resource_type = resource_type.into();
        let resource_id = resource_id.into();
        validate_ident("resource_type", &resource_type)?;
        validate_ident("resource_id", &resource_id)?;
        Ok(Self {
            resource_type,
            resource_id,
        })
    }

    /// Reference a device by id
    pub fn device(resource_id: impl fmt::Display) -> Result<Self> {
        Self::new(DEVICE_RESOURCE_TYPE, resource_id.to_string())
    }

    /// Parse `"type:id"`, or a bare id which is taken as a device
    pub fn parse(value: &str) -> Result<Self> {
        match value.split_once(SEPARATOR) {
            Some((resource_type, resource_id)) => Self::new(resource_type, resource_id),
            None => Self::device(value),
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Key under which this resource's permission set is cached
    pub fn cache_key(&self) -> String {
        format!("{}{}{}", self.resource_type, SEPARATOR, self.resource_id)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.resource_type, SEPARATOR, self.resource_id)
    }
}

/// A durable authorization record. Immutable once created; deleted on revoke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub grant_id: Uuid,
    pub resource: ResourceRef,
    pub subject: SubjectId,
    pub action: Action,
    pub granted_at: DateTime<Utc>,
}

impl PermissionGrant {
    /// Create a new grant stamped with the current time
    pub fn new(resource: ResourceRef, subject: SubjectId, action: Action) -> Self {
        Self {
            grant_id: Uuid::new_v4(),
            resource,
            subject,
            action,
            granted_at: Utc::now(),
        }
    }

    /// True when this grant covers the same (resource, subject, action) triple
    pub fn matches(&self, resource: &ResourceRef, subject: &SubjectId, action: &Action) -> bool {
        &self.resource == resource && &self.subject == subject && &self.action == action
    }

    /// The entry this grant contributes to its resource's permission set
    pub fn entry(&self) -> String {
        entry_key(&self.subject, &self.action)
    }
}

/// `"{subject}:{action}"`
pub fn entry_key(subject: &SubjectId, action: &Action) -> String {
    format!("{}{}{}", subject, SEPARATOR, action)
}

/// Every `"{subject}:{action}"` allowed on one resource
///
/// Built wholesale from the store; there is deliberately no insert or remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePermissionSet {
    entries: BTreeSet<String>,
}

impl ResourcePermissionSet {
    /// An empty set (resource with no grants)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Flatten a resource's grants into a set
    pub fn from_grants<'a, I>(grants: I) -> Self
    where
        I: IntoIterator<Item = &'a PermissionGrant>,
    {
        Self {
            entries: grants.into_iter().map(PermissionGrant::entry).collect(),
        }
    }

    /// Membership test for `"{subject}:{action}"`
    pub fn allows(&self, subject: &SubjectId, action: &Action) -> bool {
        self.entries.contains(&entry_key(subject, action))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(SubjectId::new("42").is_ok());
        assert!(SubjectId::new("role.admin").is_ok());
        assert!(SubjectId::new("").is_err());
        assert!(SubjectId::new("a:b").is_err());
        assert!(SubjectId::new("has space").is_err());
        assert!(SubjectId::new("x".repeat(MAX_IDENT_LEN + 1)).is_err());
        assert!(SubjectId::new("x".repeat(MAX_IDENT_LEN)).is_ok());
    }

    #[test]
    fn test_action_is_uppercased() {
        let action = Action::new("read").unwrap();
        assert_eq!(action.as_str(), "READ");
        assert_eq!(action, Action::new("READ").unwrap());
    }

    #[test]
    fn test_resource_ref_parse_and_key() {
        let r = ResourceRef::parse("device:7").unwrap();
        assert_eq!(r.resource_type(), "device");
        assert_eq!(r.resource_id(), "7");
        assert_eq!(r.cache_key(), "device:7");

        let bare = ResourceRef::parse("99").unwrap();
        assert_eq!(bare, ResourceRef::device(99).unwrap());

        assert!(ResourceRef::parse("device:7:extra").is_err());
        assert!(ResourceRef::parse(":7").is_err());
    }

    #[test]
    fn test_permission_set_membership() {
        let resource = ResourceRef::device(7).unwrap();
        let grants = vec![
            PermissionGrant::new(
                resource.clone(),
                SubjectId::new("42").unwrap(),
                Action::new("READ").unwrap(),
            ),
            PermissionGrant::new(
                resource,
                SubjectId::new("ops").unwrap(),
                Action::new("CONTROL").unwrap(),
            ),
        ];

        let set = ResourcePermissionSet::from_grants(&grants);
        assert_eq!(set.len(), 2);
        assert!(set.allows(&SubjectId::new("42").unwrap(), &Action::new("read").unwrap()));
        assert!(!set.allows(&SubjectId::new("42").unwrap(), &Action::new("WRITE").unwrap()));
        assert!(set.iter().any(|e| e == "ops:CONTROL"));
    }

    #[test]
    fn test_deserialize_rejects_bad_subject() {
        let bad = serde_json::from_str::<SubjectId>("\"bad:subject\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_deserialize_validates_resource_ref() {
        let good: ResourceRef =
            serde_json::from_str(r#"{ "resource_type": "device", "resource_id": "7" }"#).unwrap();
        assert_eq!(good, ResourceRef::device(7).unwrap());

        for bad in [
            r#"{ "resource_type": "device", "resource_id": "7:x" }"#,
            r#"{ "resource_type": "", "resource_id": "7" }"#,
            r#"{ "resource_type": "device", "resource_id": "has space" }"#,
        ] {
            assert!(serde_json::from_str::<ResourceRef>(bad).is_err(), "{}", bad);
        }
    }
}
