//! Shared write protocol for entities an organization owns through the index.
//!
//! Adds go store-then-index under [`dual_write`]; removals go store-then-index
//! without compensation; reads check index membership before touching the
//! store.

use sysmodel_state::{ChildKind, EntityStore, OrganizationIndex, Record, StateError};
use tracing::{debug, warn};

use crate::compensation::dual_write;
use crate::error::{RegistryError, RegistryResult};

/// One entity store paired with the index entries of its kind.
pub(crate) struct Owned<'r, T: Record> {
    store: &'r dyn EntityStore<T>,
    index: &'r dyn OrganizationIndex,
    kind: ChildKind,
}

impl<'r, T: Record> Owned<'r, T> {
    pub(crate) fn new(
        store: &'r dyn EntityStore<T>,
        index: &'r dyn OrganizationIndex,
        kind: ChildKind,
    ) -> Self {
        Self { store, index, kind }
    }

    /// Store the record, then index it. A failed index write removes the
    /// record again.
    pub(crate) fn add(
        &self,
        operation: &'static str,
        organization_id: &str,
        record: &T,
    ) -> RegistryResult<()> {
        let key = record.key();
        dual_write(
            operation,
            key,
            || Ok(self.store.add(record)?),
            || Ok(self.store.remove(key)?),
            || Ok(self.index.add_child(organization_id, self.kind, key)?),
        )
    }

    pub(crate) fn require(&self, organization_id: &str, id: &str) -> RegistryResult<()> {
        if self.index.child_exists(organization_id, self.kind, id)? {
            Ok(())
        } else {
            Err(RegistryError::not_found(format!(
                "{} {id} in organization {organization_id}",
                self.kind
            )))
        }
    }

    /// Fetch a record the organization owns.
    ///
    /// An indexed record owned by someone else is corruption, not a miss.
    pub(crate) fn get(&self, organization_id: &str, id: &str) -> RegistryResult<T> {
        self.require(organization_id, id)?;
        let record = self.store.get(id)?;
        self.check_owner(organization_id, &record)?;
        Ok(record)
    }

    /// Records listed in the index, in index order. Identifiers whose
    /// record has gone are skipped.
    pub(crate) fn list(&self, organization_id: &str) -> RegistryResult<Vec<T>> {
        let ids = self.index.list_children(organization_id, self.kind)?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.get(&id) {
                Ok(record) => {
                    self.check_owner(organization_id, &record)?;
                    records.push(record);
                }
                Err(StateError::NotFound(_)) => {
                    warn!(
                        %organization_id,
                        kind = %self.kind,
                        %id,
                        "indexed record missing from store, skipping"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(records)
    }

    /// Delete the record, then its index entry. A failed store delete
    /// leaves the index untouched.
    pub(crate) fn remove(&self, organization_id: &str, id: &str) -> RegistryResult<()> {
        self.require(organization_id, id)?;
        self.store.remove(id)?;
        self.index.delete_child(organization_id, self.kind, id)?;
        debug!(%organization_id, kind = %self.kind, %id, "owned record removed");
        Ok(())
    }

    fn check_owner(&self, organization_id: &str, record: &T) -> RegistryResult<()> {
        match record.owner() {
            Some(owner) if owner == organization_id => Ok(()),
            owner => Err(RegistryError::Internal(format!(
                "{} {} is indexed under {organization_id} but owned by {}",
                self.kind,
                record.key(),
                owner.unwrap_or("nobody")
            ))),
        }
    }
}
