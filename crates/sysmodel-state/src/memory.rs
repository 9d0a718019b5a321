//! In-memory backend: mutex-guarded ordered maps.
//!
//! Handles are `Clone` and share the same underlying map, so a registry and
//! a test can hold the same store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::index::{child_key, child_prefix, child_subject, ChildKind, OrganizationIndex};
use crate::record::{EntityStore, Record};
use crate::types::Organization;

fn lock<'a, V>(mutex: &'a Mutex<V>, what: &str) -> StateResult<MutexGuard<'a, V>> {
    mutex
        .lock()
        .map_err(|e| StateError::Lock(format!("{what}: {e}")))
}

/// Thread-safe in-memory entity store.
pub struct MemoryStore<T: Record> {
    entries: Arc<Mutex<BTreeMap<String, T>>>,
}

impl<T: Record> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T: Record> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    fn entries(&self) -> StateResult<MutexGuard<'_, BTreeMap<String, T>>> {
        lock(&self.entries, T::TABLE)
    }
}

impl<T: Record> EntityStore<T> for MemoryStore<T> {
    fn add(&self, record: &T) -> StateResult<()> {
        let mut entries = self.entries()?;
        let key = record.key();
        if entries.contains_key(key) {
            return Err(StateError::AlreadyExists(format!("{} {key}", T::TABLE)));
        }
        entries.insert(key.to_string(), record.clone());
        debug!(table = T::TABLE, %key, "record added");
        Ok(())
    }

    fn get(&self, key: &str) -> StateResult<T> {
        self.entries()?
            .get(key)
            .cloned()
            .ok_or_else(|| StateError::NotFound(format!("{} {key}", T::TABLE)))
    }

    fn update(&self, record: &T) -> StateResult<()> {
        let mut entries = self.entries()?;
        let key = record.key();
        match entries.get_mut(key) {
            Some(slot) => {
                *slot = record.clone();
                debug!(table = T::TABLE, %key, "record updated");
                Ok(())
            }
            None => Err(StateError::NotFound(format!("{} {key}", T::TABLE))),
        }
    }

    fn replace(&self, record: &T, expected_revision: u64) -> StateResult<T> {
        let mut entries = self.entries()?;
        let key = record.key();
        let slot = entries
            .get_mut(key)
            .ok_or_else(|| StateError::NotFound(format!("{} {key}", T::TABLE)))?;
        let found = slot.revision();
        if found != expected_revision {
            return Err(StateError::Conflict {
                key: key.to_string(),
                expected: expected_revision,
                found,
            });
        }
        let mut stored = record.clone();
        stored.set_revision(expected_revision + 1);
        *slot = stored.clone();
        debug!(table = T::TABLE, %key, revision = expected_revision + 1, "record replaced");
        Ok(stored)
    }

    fn remove(&self, key: &str) -> StateResult<()> {
        match self.entries()?.remove(key) {
            Some(_) => {
                debug!(table = T::TABLE, %key, "record removed");
                Ok(())
            }
            None => Err(StateError::NotFound(format!("{} {key}", T::TABLE))),
        }
    }

    fn exists(&self, key: &str) -> StateResult<bool> {
        Ok(self.entries()?.contains_key(key))
    }

    fn list(&self) -> StateResult<Vec<T>> {
        Ok(self.entries()?.values().cloned().collect())
    }
}

/// In-memory organization index.
///
/// Organization existence is read from the organization store the index was
/// built over.
#[derive(Clone)]
pub struct MemoryIndex {
    organizations: MemoryStore<Organization>,
    children: Arc<Mutex<BTreeSet<String>>>,
}

impl MemoryIndex {
    pub fn new(organizations: MemoryStore<Organization>) -> Self {
        Self {
            organizations,
            children: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    fn require_organization(&self, organization_id: &str) -> StateResult<()> {
        if self.organizations.exists(organization_id)? {
            Ok(())
        } else {
            Err(StateError::NotFound(format!("organization {organization_id}")))
        }
    }

    fn children(&self) -> StateResult<MutexGuard<'_, BTreeSet<String>>> {
        lock(&self.children, "organization_children")
    }
}

impl OrganizationIndex for MemoryIndex {
    fn add_child(&self, organization_id: &str, kind: ChildKind, child_id: &str) -> StateResult<()> {
        self.require_organization(organization_id)?;
        let inserted = self
            .children()?
            .insert(child_key(organization_id, kind, child_id));
        if !inserted {
            return Err(StateError::AlreadyExists(child_subject(
                organization_id,
                kind,
                child_id,
            )));
        }
        debug!(%organization_id, %kind, %child_id, "child indexed");
        Ok(())
    }

    fn child_exists(
        &self,
        organization_id: &str,
        kind: ChildKind,
        child_id: &str,
    ) -> StateResult<bool> {
        Ok(self
            .children()?
            .contains(&child_key(organization_id, kind, child_id)))
    }

    fn list_children(&self, organization_id: &str, kind: ChildKind) -> StateResult<Vec<String>> {
        self.require_organization(organization_id)?;
        let prefix = child_prefix(organization_id, kind);
        let children = self.children()?;
        Ok(children
            .range(prefix.clone()..)
            .take_while(|key| key.starts_with(&prefix))
            .map(|key| key[prefix.len()..].to_string())
            .collect())
    }

    fn delete_child(
        &self,
        organization_id: &str,
        kind: ChildKind,
        child_id: &str,
    ) -> StateResult<()> {
        let removed = self
            .children()?
            .remove(&child_key(organization_id, kind, child_id));
        if !removed {
            return Err(StateError::NotFound(child_subject(
                organization_id,
                kind,
                child_id,
            )));
        }
        debug!(%organization_id, %kind, %child_id, "child unindexed");
        Ok(())
    }
}
