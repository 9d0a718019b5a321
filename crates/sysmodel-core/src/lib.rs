//! sysmodel-core: managers for the multi-tenant system model registry.
//!
//! Every manager works against a [`Registry`]: the entity stores, the
//! organization index, an id generator and a clock. Writes that touch both a
//! store and the index go through [`Compensation`], so a failed second write
//! undoes the first.

pub mod application;
pub mod cluster;
pub mod compensation;
pub mod config;
pub mod error;
pub mod ids;
pub mod members;
pub mod organization;
mod ownership;
pub mod registry;
pub mod requests;
pub mod validation;

pub use application::ApplicationManager;
pub use cluster::ClusterManager;
pub use compensation::{dual_write, Compensation};
pub use config::{LoggingConfig, RegistryConfig, StorageBackend, StorageConfig};
pub use error::{ErrorKind, RegistryError, RegistryResult};
pub use ids::{Clock, FixedClock, IdGenerator, SequentialIds, SystemClock, UuidGenerator};
pub use members::{NodeManager, RoleManager, UserManager};
pub use organization::OrganizationManager;
pub use registry::Registry;
pub use requests::*;
