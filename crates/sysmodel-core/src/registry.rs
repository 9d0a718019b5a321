//! Registry: the set of collaborators every manager works against.
//!
//! A `Registry` is built once (in memory, over a redb [`StateStore`], or
//! from configuration) and handed to the managers. Clones share the stores.

use std::sync::Arc;

use sysmodel_state::*;
use tracing::info;

use crate::application::ApplicationManager;
use crate::cluster::ClusterManager;
use crate::config::{RegistryConfig, StorageBackend};
use crate::error::{RegistryError, RegistryResult};
use crate::ids::{Clock, IdGenerator, SystemClock, UuidGenerator};
use crate::members::{NodeManager, RoleManager, UserManager};
use crate::organization::OrganizationManager;

/// Stores, index and generators shared by all managers.
#[derive(Clone)]
pub struct Registry {
    pub organizations: Arc<dyn EntityStore<Organization>>,
    pub clusters: Arc<dyn EntityStore<Cluster>>,
    pub nodes: Arc<dyn EntityStore<Node>>,
    pub users: Arc<dyn EntityStore<User>>,
    pub roles: Arc<dyn EntityStore<Role>>,
    pub descriptors: Arc<dyn EntityStore<AppDescriptor>>,
    pub instances: Arc<dyn EntityStore<AppInstance>>,
    pub parametrized_descriptors: Arc<dyn EntityStore<ParametrizedDescriptor>>,
    pub instance_parameters: Arc<dyn EntityStore<InstanceParameters>>,
    pub device_groups: Arc<dyn EntityStore<DeviceGroup>>,
    pub devices: Arc<dyn EntityStore<Device>>,
    pub assets: Arc<dyn EntityStore<Asset>>,
    pub accounts: Arc<dyn EntityStore<Account>>,
    pub projects: Arc<dyn EntityStore<Project>>,
    pub index: Arc<dyn OrganizationIndex>,
    pub ids: Arc<dyn IdGenerator>,
    pub clock: Arc<dyn Clock>,
}

impl Registry {
    /// Registry over fresh in-memory stores.
    pub fn in_memory() -> Self {
        let organizations = MemoryStore::<Organization>::new();
        let index = MemoryIndex::new(organizations.clone());
        Self {
            organizations: Arc::new(organizations),
            clusters: Arc::new(MemoryStore::<Cluster>::new()),
            nodes: Arc::new(MemoryStore::<Node>::new()),
            users: Arc::new(MemoryStore::<User>::new()),
            roles: Arc::new(MemoryStore::<Role>::new()),
            descriptors: Arc::new(MemoryStore::<AppDescriptor>::new()),
            instances: Arc::new(MemoryStore::<AppInstance>::new()),
            parametrized_descriptors: Arc::new(MemoryStore::<ParametrizedDescriptor>::new()),
            instance_parameters: Arc::new(MemoryStore::<InstanceParameters>::new()),
            device_groups: Arc::new(MemoryStore::<DeviceGroup>::new()),
            devices: Arc::new(MemoryStore::<Device>::new()),
            assets: Arc::new(MemoryStore::<Asset>::new()),
            accounts: Arc::new(MemoryStore::<Account>::new()),
            projects: Arc::new(MemoryStore::<Project>::new()),
            index: Arc::new(index),
            ids: Arc::new(UuidGenerator),
            clock: Arc::new(SystemClock),
        }
    }

    /// Registry over the tables of one redb database.
    pub fn durable(state: &StateStore) -> Self {
        Self {
            organizations: Arc::new(state.entities::<Organization>()),
            clusters: Arc::new(state.entities::<Cluster>()),
            nodes: Arc::new(state.entities::<Node>()),
            users: Arc::new(state.entities::<User>()),
            roles: Arc::new(state.entities::<Role>()),
            descriptors: Arc::new(state.entities::<AppDescriptor>()),
            instances: Arc::new(state.entities::<AppInstance>()),
            parametrized_descriptors: Arc::new(state.entities::<ParametrizedDescriptor>()),
            instance_parameters: Arc::new(state.entities::<InstanceParameters>()),
            device_groups: Arc::new(state.entities::<DeviceGroup>()),
            devices: Arc::new(state.entities::<Device>()),
            assets: Arc::new(state.entities::<Asset>()),
            accounts: Arc::new(state.entities::<Account>()),
            projects: Arc::new(state.entities::<Project>()),
            index: Arc::new(state.index()),
            ids: Arc::new(UuidGenerator),
            clock: Arc::new(SystemClock),
        }
    }

    /// Build the registry selected by `config.storage`.
    pub fn from_config(config: &RegistryConfig) -> RegistryResult<Self> {
        match config.storage.backend {
            StorageBackend::Memory => {
                info!("using in-memory registry");
                Ok(Self::in_memory())
            }
            StorageBackend::Redb => {
                let path = config.storage.path.as_deref().ok_or_else(|| {
                    RegistryError::invalid("storage.path is required for the redb backend")
                })?;
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| RegistryError::Storage(StateError::Open(e.to_string())))?;
                }
                let state = StateStore::open(path)?;
                info!(?path, "using redb registry");
                Ok(Self::durable(&state))
            }
        }
    }

    pub fn with_ids(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_index(mut self, index: Arc<dyn OrganizationIndex>) -> Self {
        self.index = index;
        self
    }

    pub fn organization_manager(&self) -> OrganizationManager {
        OrganizationManager::new(self.clone())
    }

    pub fn cluster_manager(&self) -> ClusterManager {
        ClusterManager::new(self.clone())
    }

    pub fn node_manager(&self) -> NodeManager {
        NodeManager::new(self.clone())
    }

    pub fn user_manager(&self) -> UserManager {
        UserManager::new(self.clone())
    }

    pub fn role_manager(&self) -> RoleManager {
        RoleManager::new(self.clone())
    }

    pub fn application_manager(&self) -> ApplicationManager {
        ApplicationManager::new(self.clone())
    }

    /// Fail with `NotFound` unless the organization exists.
    pub(crate) fn require_organization(&self, organization_id: &str) -> RegistryResult<()> {
        if self.organizations.exists(organization_id)? {
            Ok(())
        } else {
            Err(RegistryError::not_found(format!("organization {organization_id}")))
        }
    }

    /// Fail with `NotFound` unless the index lists `child_id` under the
    /// organization.
    pub(crate) fn require_child(
        &self,
        organization_id: &str,
        kind: ChildKind,
        child_id: &str,
    ) -> RegistryResult<()> {
        if self.index.child_exists(organization_id, kind, child_id)? {
            Ok(())
        } else {
            Err(RegistryError::not_found(format!(
                "{kind} {child_id} in organization {organization_id}"
            )))
        }
    }
}
