//! Request shapes accepted by the managers.
//!
//! Requests carry what a caller may choose; identifiers and timestamps are
//! assigned by the registry.

use serde::{Deserialize, Serialize};
use sysmodel_state::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddOrganizationRequest {
    pub name: String,
    #[serde(default)]
    pub full_address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub zip_code: String,
}

/// Fields left as `None` are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOrganizationRequest {
    pub organization_id: String,
    pub name: Option<String>,
    pub full_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub zip_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddClusterRequest {
    pub organization_id: String,
    pub name: String,
    pub hostname: String,
    #[serde(default)]
    pub control_plane_hostname: String,
    #[serde(default)]
    pub labels: Labels,
}

/// Fields left as `None` are kept. A `health` report changes only the power
/// half of the cluster status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateClusterRequest {
    pub organization_id: String,
    pub cluster_id: String,
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub control_plane_hostname: Option<String>,
    pub labels: Option<Labels>,
    pub health: Option<ClusterHealth>,
    pub last_alive_timestamp: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddNodeRequest {
    pub organization_id: String,
    pub ip: String,
    #[serde(default)]
    pub labels: Labels,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddUserRequest {
    pub organization_id: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddRoleRequest {
    pub organization_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub internal: bool,
}

/// Group, service and rule identifiers in the request are ignored and
/// replaced with fresh ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddDescriptorRequest {
    pub organization_id: String,
    pub name: String,
    #[serde(default)]
    pub configuration_options: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub environment_variables: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub rules: Vec<SecurityRule>,
    pub groups: Vec<ServiceGroup>,
}

/// Fields left as `None` are kept. Replacement groups get fresh identifiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDescriptorRequest {
    pub organization_id: String,
    pub app_descriptor_id: String,
    pub name: Option<String>,
    pub labels: Option<Labels>,
    pub groups: Option<Vec<ServiceGroup>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddInstanceRequest {
    pub organization_id: String,
    pub app_descriptor_id: String,
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
    /// Stored alongside the instance when present.
    #[serde(default)]
    pub parameters: Option<Vec<InstanceParameter>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddServiceGroupInstancesRequest {
    pub organization_id: String,
    pub app_descriptor_id: String,
    pub app_instance_id: String,
    pub service_group_id: String,
    pub replica_count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddServiceInstanceRequest {
    pub organization_id: String,
    pub app_descriptor_id: String,
    pub app_instance_id: String,
    pub service_group_id: String,
    pub service_group_instance_id: String,
    pub service_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateServiceStatusRequest {
    pub organization_id: String,
    pub app_instance_id: String,
    pub service_group_instance_id: String,
    pub service_instance_id: String,
    pub status: ServiceStatus,
    #[serde(default)]
    pub endpoints: Vec<EndpointInstance>,
    #[serde(default)]
    pub deployed_on_cluster_id: Option<String>,
}
