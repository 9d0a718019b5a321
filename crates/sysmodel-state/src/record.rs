//! The `Record` and `EntityStore` contracts shared by every backend.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StateResult;
use crate::tables;
use crate::types::*;

/// A persisted registry record.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table (or map) holding this record type.
    const TABLE: &'static str;

    /// Primary key.
    fn key(&self) -> &str;

    /// Identifier of the owning organization (or account), if any.
    fn owner(&self) -> Option<&str>;

    /// Revision used by [`EntityStore::replace`]. Records without
    /// optimistic concurrency always report 0.
    fn revision(&self) -> u64 {
        0
    }

    fn set_revision(&mut self, _revision: u64) {}
}

/// Per-entity persistence.
///
/// Every method takes one lock or one transaction; callers combining two
/// stores get no atomicity across them.
pub trait EntityStore<T: Record>: Send + Sync {
    /// Insert a new record. Fails with `AlreadyExists` on a duplicate key.
    fn add(&self, record: &T) -> StateResult<()>;

    /// Fetch a record. Fails with `NotFound` if absent.
    fn get(&self, key: &str) -> StateResult<T>;

    /// Overwrite an existing record. Fails with `NotFound` if absent.
    fn update(&self, record: &T) -> StateResult<()>;

    /// Overwrite an existing record only if its stored revision still equals
    /// `expected_revision`. The stored copy gets `expected_revision + 1` and
    /// is returned. Fails with `Conflict` if the revision moved.
    fn replace(&self, record: &T, expected_revision: u64) -> StateResult<T>;

    /// Delete a record. Fails with `NotFound` if absent.
    fn remove(&self, key: &str) -> StateResult<()>;

    fn exists(&self, key: &str) -> StateResult<bool>;

    /// All records, in key order.
    fn list(&self) -> StateResult<Vec<T>>;

    /// Records whose owner equals `owner`, in key order.
    fn list_by_owner(&self, owner: &str) -> StateResult<Vec<T>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.owner() == Some(owner))
            .collect())
    }
}

macro_rules! record {
    ($ty:ty, $table:expr, key = $key:ident, owner = $owner:ident) => {
        impl Record for $ty {
            const TABLE: &'static str = $table;

            fn key(&self) -> &str {
                &self.$key
            }

            fn owner(&self) -> Option<&str> {
                Some(&self.$owner)
            }
        }
    };
}

impl Record for Organization {
    const TABLE: &'static str = tables::ORGANIZATIONS;

    fn key(&self) -> &str {
        &self.organization_id
    }

    fn owner(&self) -> Option<&str> {
        None
    }
}

impl Record for Account {
    const TABLE: &'static str = tables::ACCOUNTS;

    fn key(&self) -> &str {
        &self.account_id
    }

    fn owner(&self) -> Option<&str> {
        None
    }
}

impl Record for AppInstance {
    const TABLE: &'static str = tables::INSTANCES;

    fn key(&self) -> &str {
        &self.app_instance_id
    }

    fn owner(&self) -> Option<&str> {
        Some(&self.organization_id)
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }
}

impl Record for Cluster {
    const TABLE: &'static str = tables::CLUSTERS;

    fn key(&self) -> &str {
        &self.cluster_id
    }

    fn owner(&self) -> Option<&str> {
        Some(&self.organization_id)
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }
}

record!(Node, tables::NODES, key = node_id, owner = organization_id);
record!(User, tables::USERS, key = email, owner = organization_id);
record!(Role, tables::ROLES, key = role_id, owner = organization_id);
record!(AppDescriptor, tables::DESCRIPTORS, key = app_descriptor_id, owner = organization_id);
record!(
    ParametrizedDescriptor,
    tables::PARAMETRIZED_DESCRIPTORS,
    key = app_instance_id,
    owner = organization_id
);
record!(
    InstanceParameters,
    tables::INSTANCE_PARAMETERS,
    key = app_instance_id,
    owner = organization_id
);
record!(DeviceGroup, tables::DEVICE_GROUPS, key = device_group_id, owner = organization_id);
record!(Device, tables::DEVICES, key = device_id, owner = organization_id);
record!(Asset, tables::ASSETS, key = asset_id, owner = organization_id);
record!(Project, tables::PROJECTS, key = project_id, owner = owner_account_id);
