//! Table names shared by every backend.
//!
//! The redb backend opens `TableDefinition<&str, &[u8]>` tables under these
//! names; the in-memory backend uses them only in error messages and logs.

use redb::TableDefinition;

/// Organizations keyed by `{organization_id}`.
pub const ORGANIZATIONS: &str = "organizations";

/// Clusters keyed by `{cluster_id}`.
pub const CLUSTERS: &str = "clusters";

/// Nodes keyed by `{node_id}`.
pub const NODES: &str = "nodes";

/// Users keyed by `{email}`.
pub const USERS: &str = "users";

/// Roles keyed by `{role_id}`.
pub const ROLES: &str = "roles";

/// Application descriptors keyed by `{app_descriptor_id}`.
pub const DESCRIPTORS: &str = "app_descriptors";

/// Application instances keyed by `{app_instance_id}`.
pub const INSTANCES: &str = "app_instances";

/// Parametrized descriptors keyed by `{app_instance_id}`.
pub const PARAMETRIZED_DESCRIPTORS: &str = "parametrized_descriptors";

/// Instance parameters keyed by `{app_instance_id}`.
pub const INSTANCE_PARAMETERS: &str = "instance_parameters";

/// Device groups keyed by `{device_group_id}`.
pub const DEVICE_GROUPS: &str = "device_groups";

/// Devices keyed by `{device_id}`.
pub const DEVICES: &str = "devices";

/// Assets keyed by `{asset_id}`.
pub const ASSETS: &str = "assets";

/// Accounts keyed by `{account_id}`.
pub const ACCOUNTS: &str = "accounts";

/// Projects keyed by `{project_id}`.
pub const PROJECTS: &str = "projects";

/// Organization index keyed by `{organization_id}/{kind}/{child_id}`.
pub const ORGANIZATION_CHILDREN: TableDefinition<&str, &[u8]> =
    TableDefinition::new("organization_children");

/// Every entity table, created up front when a database is opened.
pub const ENTITY_TABLES: [&str; 14] = [
    ORGANIZATIONS,
    CLUSTERS,
    NODES,
    USERS,
    ROLES,
    DESCRIPTORS,
    INSTANCES,
    PARAMETRIZED_DESCRIPTORS,
    INSTANCE_PARAMETERS,
    DEVICE_GROUPS,
    DEVICES,
    ASSETS,
    ACCOUNTS,
    PROJECTS,
];

/// Build the redb definition for an entity table.
pub fn entity_table(name: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(name)
}
