//! sysmodel-state: entity stores and the organization index.
//!
//! Every registry record implements [`Record`] and is persisted through the
//! [`EntityStore`] trait. The [`OrganizationIndex`] keeps, per organization,
//! the set of child identifiers of each [`ChildKind`].
//!
//! # Architecture
//!
//! Two interchangeable backends exist:
//!
//! - [`MemoryStore`] / [`MemoryIndex`]: mutex-guarded ordered maps.
//! - [`RedbStore`] / [`RedbIndex`]: tables inside one redb database opened
//!   through [`StateStore`]. Values are JSON-serialized into `&[u8]`
//!   columns; index keys follow `{organization_id}/{kind}/{child_id}`.
//!
//! Each store operation takes exactly one lock (or one redb transaction).
//! Nothing here spans two writes; that is left to the managers.

#[cfg(test)]
mod contract;
pub mod error;
pub mod index;
pub mod memory;
pub mod record;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use index::{ChildKind, OrganizationIndex};
pub use memory::{MemoryIndex, MemoryStore};
pub use record::{EntityStore, Record};
pub use store::{RedbIndex, RedbStore, StateStore};
pub use types::*;
