//! Nodes, users and roles of an organization.

use sysmodel_state::*;
use tracing::info;

use crate::error::RegistryResult;
use crate::ownership::Owned;
use crate::registry::Registry;
use crate::requests::{AddNodeRequest, AddRoleRequest, AddUserRequest};
use crate::validation;

/// Machines owned by an organization.
pub struct NodeManager {
    registry: Registry,
}

impl NodeManager {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    fn owned(&self) -> Owned<'_, Node> {
        Owned::new(&*self.registry.nodes, &*self.registry.index, ChildKind::Node)
    }

    pub fn add_node(&self, request: AddNodeRequest) -> RegistryResult<Node> {
        validation::validate_add_node(&request)?;
        self.registry.require_organization(&request.organization_id)?;

        let node = Node {
            organization_id: request.organization_id,
            node_id: self.registry.ids.next_id(),
            ip: request.ip,
            labels: request.labels,
            cluster_id: None,
            created: self.registry.clock.now(),
        };
        self.owned().add("add_node", &node.organization_id, &node)?;
        info!(organization_id = %node.organization_id, node_id = %node.node_id, ip = %node.ip, "node added");
        Ok(node)
    }

    pub fn get_node(&self, organization_id: &str, node_id: &str) -> RegistryResult<Node> {
        self.owned().get(organization_id, node_id)
    }

    pub fn list_nodes(&self, organization_id: &str) -> RegistryResult<Vec<Node>> {
        self.owned().list(organization_id)
    }

    /// Attach a node to one of the organization's clusters.
    pub fn assign_node(
        &self,
        organization_id: &str,
        node_id: &str,
        cluster_id: &str,
    ) -> RegistryResult<Node> {
        validation::validate_identifier("cluster_id", cluster_id)?;
        let mut node = self.get_node(organization_id, node_id)?;
        self.registry
            .require_child(organization_id, ChildKind::Cluster, cluster_id)?;

        node.cluster_id = Some(cluster_id.to_string());
        self.registry.nodes.update(&node)?;
        info!(%organization_id, %node_id, %cluster_id, "node assigned");
        Ok(node)
    }

    pub fn remove_node(&self, organization_id: &str, node_id: &str) -> RegistryResult<()> {
        self.owned().remove(organization_id, node_id)?;
        info!(%organization_id, %node_id, "node removed");
        Ok(())
    }
}

/// Members of an organization, keyed by email.
pub struct UserManager {
    registry: Registry,
}

impl UserManager {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    fn owned(&self) -> Owned<'_, User> {
        Owned::new(&*self.registry.users, &*self.registry.index, ChildKind::User)
    }

    pub fn add_user(&self, request: AddUserRequest) -> RegistryResult<User> {
        validation::validate_add_user(&request)?;
        self.registry.require_organization(&request.organization_id)?;

        let user = User {
            organization_id: request.organization_id,
            email: request.email,
            name: request.name,
            member_since: self.registry.clock.now(),
        };
        self.owned().add("add_user", &user.organization_id, &user)?;
        info!(organization_id = %user.organization_id, email = %user.email, "user added");
        Ok(user)
    }

    pub fn get_user(&self, organization_id: &str, email: &str) -> RegistryResult<User> {
        self.owned().get(organization_id, email)
    }

    pub fn list_users(&self, organization_id: &str) -> RegistryResult<Vec<User>> {
        self.owned().list(organization_id)
    }

    pub fn remove_user(&self, organization_id: &str, email: &str) -> RegistryResult<()> {
        self.owned().remove(organization_id, email)?;
        info!(%organization_id, %email, "user removed");
        Ok(())
    }
}

pub struct RoleManager {
    registry: Registry,
}

impl RoleManager {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    fn owned(&self) -> Owned<'_, Role> {
        Owned::new(&*self.registry.roles, &*self.registry.index, ChildKind::Role)
    }

    pub fn add_role(&self, request: AddRoleRequest) -> RegistryResult<Role> {
        validation::validate_add_role(&request)?;
        self.registry.require_organization(&request.organization_id)?;

        let role = Role {
            organization_id: request.organization_id,
            role_id: self.registry.ids.next_id(),
            name: request.name,
            description: request.description,
            internal: request.internal,
            created: self.registry.clock.now(),
        };
        self.owned().add("add_role", &role.organization_id, &role)?;
        info!(organization_id = %role.organization_id, role_id = %role.role_id, "role added");
        Ok(role)
    }

    pub fn get_role(&self, organization_id: &str, role_id: &str) -> RegistryResult<Role> {
        self.owned().get(organization_id, role_id)
    }

    pub fn list_roles(&self, organization_id: &str) -> RegistryResult<Vec<Role>> {
        self.owned().list(organization_id)
    }

    pub fn remove_role(&self, organization_id: &str, role_id: &str) -> RegistryResult<()> {
        self.owned().remove(organization_id, role_id)?;
        info!(%organization_id, %role_id, "role removed");
        Ok(())
    }
}
