//! Domain types for the sysmodel registry.
//!
//! These types represent the persisted state of organizations and every
//! entity they own. All types are serializable to/from JSON for storage in
//! redb tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for an organization.
pub type OrganizationId = String;

/// Unique identifier for a cluster.
pub type ClusterId = String;

/// Unique identifier for an application descriptor.
pub type DescriptorId = String;

/// Unique identifier for an application instance.
pub type AppInstanceId = String;

/// Free-form labels attached to most records.
pub type Labels = BTreeMap<String, String>;

// ── Organization ──────────────────────────────────────────────────

/// Top-level tenant. Owns every other record by reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub organization_id: OrganizationId,
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
    /// Unix timestamp (seconds) when this organization was created.
    pub created: i64,
}

// ── Cluster ───────────────────────────────────────────────────────

/// A compute cluster registered by an organization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    pub organization_id: OrganizationId,
    pub cluster_id: ClusterId,
    pub name: String,
    pub hostname: String,
    #[serde(default)]
    pub control_plane_hostname: String,
    #[serde(default)]
    pub labels: Labels,
    pub status: ClusterStatus,
    /// Unix timestamp of the last health report, 0 if never seen.
    #[serde(default)]
    pub last_alive_timestamp: i64,
    pub created: i64,
    /// Bumped by the store on every revision-checked rewrite.
    #[serde(default)]
    pub revision: u64,
}

/// Combined health and cordon state of a cluster.
///
/// The cordoned variants carry the power state they were cordoned from, so
/// the enum is equivalent to a `(power, cordoned)` pair. See
/// [`ClusterStatus::from_parts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Unknown,
    Online,
    Offline,
    OnlineCordon,
    OfflineCordon,
}

/// Power half of a [`ClusterStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterPower {
    Unknown,
    Online,
    Offline,
}

/// Health report delivered by an external monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterHealth {
    Online,
    Offline,
}

// ── Node ──────────────────────────────────────────────────────────

/// A machine owned by an organization, optionally assigned to a cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub organization_id: OrganizationId,
    pub node_id: String,
    pub ip: String,
    #[serde(default)]
    pub labels: Labels,
    /// Cluster this node has been assigned to, if any.
    #[serde(default)]
    pub cluster_id: Option<ClusterId>,
    pub created: i64,
}

// ── Users and roles ───────────────────────────────────────────────

/// A member of an organization, identified by email.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub organization_id: OrganizationId,
    pub email: String,
    pub name: String,
    pub member_since: i64,
}

/// A named role inside an organization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Role {
    pub organization_id: OrganizationId,
    pub role_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Internal roles are created by the platform, not by tenants.
    #[serde(default)]
    pub internal: bool,
    pub created: i64,
}

// ── Application descriptor ────────────────────────────────────────

/// Reusable application template made of service groups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppDescriptor {
    pub organization_id: OrganizationId,
    pub app_descriptor_id: DescriptorId,
    pub name: String,
    #[serde(default)]
    pub configuration_options: BTreeMap<String, String>,
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub rules: Vec<SecurityRule>,
    pub groups: Vec<ServiceGroup>,
    #[serde(default)]
    pub created: i64,
}

/// A deployable unit: services that are scheduled together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceGroup {
    /// Assigned by the registry when the descriptor is added.
    #[serde(default)]
    pub service_group_id: String,
    pub name: String,
    #[serde(default)]
    pub policy: CollocationPolicy,
    #[serde(default)]
    pub specs: ServiceGroupSpecs,
    pub services: Vec<Service>,
    #[serde(default)]
    pub labels: Labels,
}

/// Where the services of a group may be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollocationPolicy {
    #[default]
    SameCluster,
    SeparateClusters,
}

/// Replication parameters of a service group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceGroupSpecs {
    pub replicas: u32,
    /// Replicate the group on every cluster of the organization.
    #[serde(default)]
    pub multi_cluster_replica: bool,
}

impl Default for ServiceGroupSpecs {
    fn default() -> Self {
        Self {
            replicas: 1,
            multi_cluster_replica: false,
        }
    }
}

/// A single workload inside a service group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    /// Assigned by the registry when the descriptor is added.
    #[serde(default)]
    pub service_id: String,
    pub name: String,
    /// Container image reference.
    pub image: String,
    #[serde(default)]
    pub resources: ResourceSpec,
    #[serde(default)]
    pub exposed_ports: Vec<Port>,
    #[serde(default)]
    pub storage: Vec<Storage>,
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub run_arguments: Vec<String>,
    /// Names of services in the same group that must be running first.
    #[serde(default)]
    pub deploy_after: Vec<String>,
}

/// Resources requested by a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResourceSpec {
    /// CPU in millicores.
    pub cpu_millis: u64,
    /// Memory in bytes.
    pub memory_bytes: u64,
}

/// A port exposed by a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Port {
    pub name: String,
    pub internal_port: u32,
    pub exposed_port: u32,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// An HTTP/REST endpoint published on a port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Endpoint {
    pub kind: EndpointKind,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Rest,
    Web,
    Prometheus,
    Ingestion,
}

/// A storage mount requested by a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Storage {
    pub size_bytes: u64,
    pub mount_path: String,
    #[serde(default)]
    pub kind: StorageKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    #[default]
    Ephemeral,
    ClusterLocal,
    ClusterReplica,
    CloudPersistent,
}

/// Network access rule between services, the public, or device groups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityRule {
    /// Assigned by the registry when the descriptor is added.
    #[serde(default)]
    pub rule_id: String,
    pub name: String,
    pub target_service_group_name: String,
    pub target_service_name: String,
    pub target_port: u32,
    pub access: PortAccess,
    #[serde(default)]
    pub auth_service_group_name: String,
    #[serde(default)]
    pub auth_services: Vec<String>,
    #[serde(default)]
    pub device_group_names: Vec<String>,
    /// Filled in only on a parametrized descriptor.
    #[serde(default)]
    pub device_group_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortAccess {
    AllAppServices,
    AppServices,
    Public,
    DeviceGroup,
}

// ── Parametrized descriptor and parameters ────────────────────────

/// Per-instance frozen copy of a descriptor, with device group names
/// resolved to identifiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParametrizedDescriptor {
    pub organization_id: OrganizationId,
    pub app_descriptor_id: DescriptorId,
    pub app_instance_id: AppInstanceId,
    pub name: String,
    #[serde(default)]
    pub configuration_options: BTreeMap<String, String>,
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub rules: Vec<SecurityRule>,
    pub groups: Vec<ServiceGroup>,
}

/// Parameters supplied when an instance was created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceParameters {
    pub organization_id: OrganizationId,
    pub app_instance_id: AppInstanceId,
    pub parameters: Vec<InstanceParameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceParameter {
    pub name: String,
    pub value: String,
}

// ── Application instance ──────────────────────────────────────────

/// A live deployment of a descriptor. Persisted as one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppInstance {
    pub organization_id: OrganizationId,
    pub app_instance_id: AppInstanceId,
    pub app_descriptor_id: DescriptorId,
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub groups: Vec<ServiceGroupInstance>,
    pub created: i64,
    /// Bumped by the store on every revision-checked rewrite.
    #[serde(default)]
    pub revision: u64,
}

/// Deployment status of an application instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Queued,
    Planning,
    Scheduled,
    Deploying,
    Running,
    Incomplete,
    PlanningError,
    DeploymentError,
    Error,
    Terminating,
}

/// Runtime instantiation of a service group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceGroupInstance {
    pub service_group_instance_id: String,
    pub service_group_id: String,
    pub name: String,
    pub status: ServiceStatus,
    pub metadata: InstanceMetadata,
    #[serde(default)]
    pub service_instances: Vec<ServiceInstance>,
}

/// Replica counters of a service group instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceMetadata {
    pub desired_replicas: u32,
    pub available_replicas: u32,
    pub unavailable_replicas: u32,
}

/// Runtime instantiation of a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceInstance {
    pub service_instance_id: String,
    pub service_id: String,
    pub name: String,
    pub image: String,
    pub status: ServiceStatus,
    #[serde(default)]
    pub endpoints: Vec<EndpointInstance>,
    #[serde(default)]
    pub deployed_on_cluster_id: Option<ClusterId>,
}

/// Deployment status of a service or service group instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Scheduled,
    Waiting,
    Deploying,
    Running,
    Error,
    Terminating,
}

/// A reachable address of a deployed service instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointInstance {
    pub fqdn: String,
    pub kind: EndpointKind,
    pub port: u32,
}

// ── Devices and assets ────────────────────────────────────────────

/// Named group of devices; referenced by name from security rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceGroup {
    pub organization_id: OrganizationId,
    pub device_group_id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    pub created: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub organization_id: OrganizationId,
    pub device_group_id: String,
    pub device_id: String,
    #[serde(default)]
    pub labels: Labels,
    pub register_since: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub organization_id: OrganizationId,
    pub asset_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub labels: Labels,
    pub created: i64,
}

// ── Accounts and projects ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub account_id: String,
    pub name: String,
    pub created: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub owner_account_id: String,
    pub project_id: String,
    pub name: String,
    pub created: i64,
}

impl ClusterStatus {
    /// Power half of the status.
    pub fn power(self) -> ClusterPower {
        match self {
            ClusterStatus::Unknown => ClusterPower::Unknown,
            ClusterStatus::Online | ClusterStatus::OnlineCordon => ClusterPower::Online,
            ClusterStatus::Offline | ClusterStatus::OfflineCordon => ClusterPower::Offline,
        }
    }

    /// Whether new workloads are barred from this cluster.
    pub fn is_cordoned(self) -> bool {
        matches!(self, ClusterStatus::OnlineCordon | ClusterStatus::OfflineCordon)
    }

    /// Rebuild a status from its two halves.
    ///
    /// An unknown cluster cannot be cordoned, so `(Unknown, true)` collapses
    /// to `Unknown`.
    pub fn from_parts(power: ClusterPower, cordoned: bool) -> Self {
        match (power, cordoned) {
            (ClusterPower::Unknown, _) => ClusterStatus::Unknown,
            (ClusterPower::Online, false) => ClusterStatus::Online,
            (ClusterPower::Online, true) => ClusterStatus::OnlineCordon,
            (ClusterPower::Offline, false) => ClusterStatus::Offline,
            (ClusterPower::Offline, true) => ClusterStatus::OfflineCordon,
        }
    }

    /// Apply a health report, keeping the cordon flag untouched.
    pub fn with_health(self, health: ClusterHealth) -> Self {
        let power = match health {
            ClusterHealth::Online => ClusterPower::Online,
            ClusterHealth::Offline => ClusterPower::Offline,
        };
        Self::from_parts(power, self.is_cordoned())
    }
}

impl ServiceStatus {
    /// Status of a group derived from the statuses of its members.
    ///
    /// Any error wins, then any member still in flight; a group is running
    /// only when every member runs. An empty group stays scheduled.
    pub fn aggregate<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = ServiceStatus>,
    {
        let mut seen_any = false;
        let mut all_running = true;
        let mut terminating = false;
        let mut in_flight = false;
        for status in statuses {
            seen_any = true;
            match status {
                ServiceStatus::Error => return ServiceStatus::Error,
                ServiceStatus::Running => {}
                ServiceStatus::Terminating => {
                    all_running = false;
                    terminating = true;
                }
                ServiceStatus::Scheduled | ServiceStatus::Waiting | ServiceStatus::Deploying => {
                    all_running = false;
                    in_flight = true;
                }
            }
        }
        match (seen_any, all_running, terminating, in_flight) {
            (false, _, _, _) => ServiceStatus::Scheduled,
            (true, true, _, _) => ServiceStatus::Running,
            (true, false, true, false) => ServiceStatus::Terminating,
            _ => ServiceStatus::Deploying,
        }
    }
}

impl ServiceGroupInstance {
    /// Find a service instance by id.
    pub fn service_instance_mut(&mut self, service_instance_id: &str) -> Option<&mut ServiceInstance> {
        self.service_instances
            .iter_mut()
            .find(|s| s.service_instance_id == service_instance_id)
    }
}

impl AppDescriptor {
    /// Find a service group by id.
    pub fn group(&self, service_group_id: &str) -> Option<&ServiceGroup> {
        self.groups
            .iter()
            .find(|g| g.service_group_id == service_group_id)
    }
}

impl ParametrizedDescriptor {
    /// Find a service group by id.
    pub fn group(&self, service_group_id: &str) -> Option<&ServiceGroup> {
        self.groups
            .iter()
            .find(|g| g.service_group_id == service_group_id)
    }
}

impl ServiceGroup {
    /// Find a service by id.
    pub fn service(&self, service_id: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.service_id == service_id)
    }
}

impl AppInstance {
    /// Find a service group instance by the pair that identifies it.
    ///
    /// Both ids must match, so an id taken from another group is rejected.
    pub fn group_instance_mut(
        &mut self,
        service_group_id: &str,
        service_group_instance_id: &str,
    ) -> Option<&mut ServiceGroupInstance> {
        self.groups.iter_mut().find(|g| {
            g.service_group_id == service_group_id
                && g.service_group_instance_id == service_group_instance_id
        })
    }
}
