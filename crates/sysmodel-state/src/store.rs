//! StateStore: redb-backed persistence for the registry.
//!
//! One redb database holds every entity table plus the organization index.
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! database can live on disk or in memory (the latter for testing).

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::index::{child_key, child_prefix, child_subject, ChildKind, OrganizationIndex};
use crate::record::{EntityStore, Record};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

fn encode<T: Serialize>(value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Serialize))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Shared handle to the registry database.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for name in ENTITY_TABLES {
            txn.open_table(entity_table(name)).map_err(map_err!(Table))?;
        }
        txn.open_table(ORGANIZATION_CHILDREN)
            .map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Entity store for one record type.
    pub fn entities<T: Record>(&self) -> RedbStore<T> {
        RedbStore {
            db: Arc::clone(&self.db),
            _record: PhantomData,
        }
    }

    /// The organization index over this database.
    pub fn index(&self) -> RedbIndex {
        RedbIndex {
            db: Arc::clone(&self.db),
        }
    }
}

/// Entity store over one redb table.
pub struct RedbStore<T: Record> {
    db: Arc<Database>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Clone for RedbStore<T> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            _record: PhantomData,
        }
    }
}

impl<T: Record> RedbStore<T> {
    fn table(&self) -> TableDefinition<'static, &'static str, &'static [u8]> {
        entity_table(T::TABLE)
    }

    fn not_found(key: &str) -> StateError {
        StateError::NotFound(format!("{} {key}", T::TABLE))
    }
}

impl<T: Record> EntityStore<T> for RedbStore<T> {
    fn add(&self, record: &T) -> StateResult<()> {
        let key = record.key();
        let value = encode(record)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(self.table()).map_err(map_err!(Table))?;
            existed = table.get(key).map_err(map_err!(Read))?.is_some();
            if !existed {
                table
                    .insert(key, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        if existed {
            txn.abort().map_err(map_err!(Transaction))?;
            return Err(StateError::AlreadyExists(format!("{} {key}", T::TABLE)));
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(table = T::TABLE, %key, "record added");
        Ok(())
    }

    fn get(&self, key: &str) -> StateResult<T> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(self.table()).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => decode(guard.value()),
            None => Err(Self::not_found(key)),
        }
    }

    fn update(&self, record: &T) -> StateResult<()> {
        let key = record.key();
        let value = encode(record)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(self.table()).map_err(map_err!(Table))?;
            existed = table.get(key).map_err(map_err!(Read))?.is_some();
            if existed {
                table
                    .insert(key, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        if !existed {
            txn.abort().map_err(map_err!(Transaction))?;
            return Err(Self::not_found(key));
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(table = T::TABLE, %key, "record updated");
        Ok(())
    }

    fn replace(&self, record: &T, expected_revision: u64) -> StateResult<T> {
        let key = record.key();
        let mut stored = record.clone();
        stored.set_revision(expected_revision + 1);
        let value = encode(&stored)?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome: StateResult<()> = {
            let mut table = txn.open_table(self.table()).map_err(map_err!(Table))?;
            let current: Option<T> = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            match current {
                None => Err(Self::not_found(key)),
                Some(current) if current.revision() != expected_revision => {
                    Err(StateError::Conflict {
                        key: key.to_string(),
                        expected: expected_revision,
                        found: current.revision(),
                    })
                }
                Some(_) => {
                    table
                        .insert(key, value.as_slice())
                        .map_err(map_err!(Write))?;
                    Ok(())
                }
            }
        };
        if let Err(e) = outcome {
            txn.abort().map_err(map_err!(Transaction))?;
            return Err(e);
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(table = T::TABLE, %key, revision = expected_revision + 1, "record replaced");
        Ok(stored)
    }

    fn remove(&self, key: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(self.table()).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        if !existed {
            txn.abort().map_err(map_err!(Transaction))?;
            return Err(Self::not_found(key));
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(table = T::TABLE, %key, "record removed");
        Ok(())
    }

    fn exists(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(self.table()).map_err(map_err!(Table))?;
        Ok(table.get(key).map_err(map_err!(Read))?.is_some())
    }

    fn list(&self) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(self.table()).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }
}

/// Organization index stored in the `organization_children` table.
///
/// Organization existence is checked against the organizations table in the
/// same transaction as the index write.
#[derive(Clone)]
pub struct RedbIndex {
    db: Arc<Database>,
}

impl OrganizationIndex for RedbIndex {
    fn add_child(&self, organization_id: &str, kind: ChildKind, child_id: &str) -> StateResult<()> {
        let key = child_key(organization_id, kind, child_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome: StateResult<()> = {
            let organizations = txn
                .open_table(entity_table(ORGANIZATIONS))
                .map_err(map_err!(Table))?;
            let mut children = txn
                .open_table(ORGANIZATION_CHILDREN)
                .map_err(map_err!(Table))?;
            if organizations
                .get(organization_id)
                .map_err(map_err!(Read))?
                .is_none()
            {
                Err(StateError::NotFound(format!("organization {organization_id}")))
            } else if children.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                Err(StateError::AlreadyExists(child_subject(
                    organization_id,
                    kind,
                    child_id,
                )))
            } else {
                children
                    .insert(key.as_str(), child_id.as_bytes())
                    .map_err(map_err!(Write))?;
                Ok(())
            }
        };
        if let Err(e) = outcome {
            txn.abort().map_err(map_err!(Transaction))?;
            return Err(e);
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%organization_id, %kind, %child_id, "child indexed");
        Ok(())
    }

    fn child_exists(
        &self,
        organization_id: &str,
        kind: ChildKind,
        child_id: &str,
    ) -> StateResult<bool> {
        let key = child_key(organization_id, kind, child_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn
            .open_table(ORGANIZATION_CHILDREN)
            .map_err(map_err!(Table))?;
        Ok(table.get(key.as_str()).map_err(map_err!(Read))?.is_some())
    }

    fn list_children(&self, organization_id: &str, kind: ChildKind) -> StateResult<Vec<String>> {
        let prefix = child_prefix(organization_id, kind);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let organizations = txn
            .open_table(entity_table(ORGANIZATIONS))
            .map_err(map_err!(Table))?;
        if organizations
            .get(organization_id)
            .map_err(map_err!(Read))?
            .is_none()
        {
            return Err(StateError::NotFound(format!("organization {organization_id}")));
        }
        let table = txn
            .open_table(ORGANIZATION_CHILDREN)
            .map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            if let Some(child_id) = key.value().strip_prefix(prefix.as_str()) {
                results.push(child_id.to_string());
            }
        }
        Ok(results)
    }

    fn delete_child(
        &self,
        organization_id: &str,
        kind: ChildKind,
        child_id: &str,
    ) -> StateResult<()> {
        let key = child_key(organization_id, kind, child_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn
                .open_table(ORGANIZATION_CHILDREN)
                .map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        if !existed {
            txn.abort().map_err(map_err!(Transaction))?;
            return Err(StateError::NotFound(child_subject(
                organization_id,
                kind,
                child_id,
            )));
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%organization_id, %kind, %child_id, "child unindexed");
        Ok(())
    }
}
