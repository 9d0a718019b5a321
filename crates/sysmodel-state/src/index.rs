//! Organization index: per-organization sets of child identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StateResult;

/// Kinds of entity an organization owns through the index.
///
/// Every kind lives in the same table under its own key prefix and has the
/// same semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildKind {
    Cluster,
    Node,
    Descriptor,
    Instance,
    User,
    Role,
}

impl ChildKind {
    pub const ALL: [ChildKind; 6] = [
        ChildKind::Cluster,
        ChildKind::Node,
        ChildKind::Descriptor,
        ChildKind::Instance,
        ChildKind::User,
        ChildKind::Role,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChildKind::Cluster => "cluster",
            ChildKind::Node => "node",
            ChildKind::Descriptor => "descriptor",
            ChildKind::Instance => "instance",
            ChildKind::User => "user",
            ChildKind::Role => "role",
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Association table between organizations and the entities they own.
pub trait OrganizationIndex: Send + Sync {
    /// Register a child. Fails with `NotFound` if the organization does not
    /// exist and with `AlreadyExists` if the child is already registered.
    fn add_child(&self, organization_id: &str, kind: ChildKind, child_id: &str) -> StateResult<()>;

    fn child_exists(&self, organization_id: &str, kind: ChildKind, child_id: &str)
        -> StateResult<bool>;

    /// Child identifiers in key order. Fails with `NotFound` if the
    /// organization does not exist; an organization without children of
    /// this kind yields an empty list.
    fn list_children(&self, organization_id: &str, kind: ChildKind) -> StateResult<Vec<String>>;

    /// Unregister a child. Fails with `NotFound` if absent.
    fn delete_child(&self, organization_id: &str, kind: ChildKind, child_id: &str)
        -> StateResult<()>;
}

/// Key prefix for all children of one kind inside one organization.
pub(crate) fn child_prefix(organization_id: &str, kind: ChildKind) -> String {
    format!("{organization_id}/{kind}/")
}

/// Full index key for a child.
pub(crate) fn child_key(organization_id: &str, kind: ChildKind, child_id: &str) -> String {
    format!("{organization_id}/{kind}/{child_id}")
}

/// Human readable subject used in `NotFound` / `AlreadyExists` messages.
pub(crate) fn child_subject(organization_id: &str, kind: ChildKind, child_id: &str) -> String {
    format!("{kind} {child_id} in organization {organization_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_share_prefix() {
        let key = child_key("acme", ChildKind::Cluster, "c1");
        assert_eq!(key, "acme/cluster/c1");
        assert!(key.starts_with(&child_prefix("acme", ChildKind::Cluster)));
        assert!(!key.starts_with(&child_prefix("acme", ChildKind::Node)));
    }
}
