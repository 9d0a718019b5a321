//! Cluster manager and the cluster health/cordon state machine.
//!
//! A cluster status is a `(power, cordoned)` pair. Health reports move the
//! power half; operators move the cordon half. A cluster that has never
//! reported health cannot be cordoned or uncordoned.

use sysmodel_state::*;
use tracing::info;

use crate::compensation::dual_write;
use crate::error::{RegistryError, RegistryResult};
use crate::ownership::Owned;
use crate::registry::Registry;
use crate::requests::{AddClusterRequest, UpdateClusterRequest};
use crate::validation;

/// Status after an operator cordons the cluster.
pub fn cordon(status: ClusterStatus) -> RegistryResult<ClusterStatus> {
    match status {
        ClusterStatus::Unknown => Err(RegistryError::FailedPrecondition(
            "cannot cordon a cluster whose health is unknown".into(),
        )),
        ClusterStatus::Online => Ok(ClusterStatus::OnlineCordon),
        ClusterStatus::Offline => Ok(ClusterStatus::OfflineCordon),
        ClusterStatus::OnlineCordon => Ok(ClusterStatus::OnlineCordon),
        ClusterStatus::OfflineCordon => Ok(ClusterStatus::OfflineCordon),
    }
}

/// Status after an operator uncordons the cluster.
pub fn uncordon(status: ClusterStatus) -> RegistryResult<ClusterStatus> {
    match status {
        ClusterStatus::Unknown => Err(RegistryError::FailedPrecondition(
            "cannot uncordon a cluster whose health is unknown".into(),
        )),
        ClusterStatus::Online => Ok(ClusterStatus::Online),
        ClusterStatus::Offline => Ok(ClusterStatus::Offline),
        ClusterStatus::OnlineCordon => Ok(ClusterStatus::Online),
        ClusterStatus::OfflineCordon => Ok(ClusterStatus::Offline),
    }
}

/// Status after a health report. The cordon half is kept.
pub fn apply_health(status: ClusterStatus, health: ClusterHealth) -> ClusterStatus {
    status.with_health(health)
}

/// Manages clusters owned by organizations.
pub struct ClusterManager {
    registry: Registry,
}

impl ClusterManager {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    fn owned(&self) -> Owned<'_, Cluster> {
        Owned::new(&*self.registry.clusters, &*self.registry.index, ChildKind::Cluster)
    }

    /// Register a cluster. It starts with unknown health.
    pub fn add_cluster(&self, request: AddClusterRequest) -> RegistryResult<Cluster> {
        validation::validate_add_cluster(&request)?;
        self.registry.require_organization(&request.organization_id)?;

        let cluster = Cluster {
            organization_id: request.organization_id,
            cluster_id: self.registry.ids.next_id(),
            name: request.name,
            hostname: request.hostname,
            control_plane_hostname: request.control_plane_hostname,
            labels: request.labels,
            status: ClusterStatus::Unknown,
            last_alive_timestamp: 0,
            created: self.registry.clock.now(),
            revision: 0,
        };
        self.owned()
            .add("add_cluster", &cluster.organization_id, &cluster)?;
        info!(
            organization_id = %cluster.organization_id,
            cluster_id = %cluster.cluster_id,
            hostname = %cluster.hostname,
            "cluster added"
        );
        Ok(cluster)
    }

    pub fn get_cluster(&self, organization_id: &str, cluster_id: &str) -> RegistryResult<Cluster> {
        self.owned().get(organization_id, cluster_id)
    }

    pub fn list_clusters(&self, organization_id: &str) -> RegistryResult<Vec<Cluster>> {
        self.owned().list(organization_id)
    }

    pub fn update_cluster(&self, request: UpdateClusterRequest) -> RegistryResult<Cluster> {
        validation::validate_update_cluster(&request)?;
        let mut cluster = self.get_cluster(&request.organization_id, &request.cluster_id)?;

        if let Some(name) = request.name {
            cluster.name = name;
        }
        if let Some(hostname) = request.hostname {
            cluster.hostname = hostname;
        }
        if let Some(control_plane_hostname) = request.control_plane_hostname {
            cluster.control_plane_hostname = control_plane_hostname;
        }
        if let Some(labels) = request.labels {
            cluster.labels = labels;
        }
        if let Some(health) = request.health {
            let next = apply_health(cluster.status, health);
            if next != cluster.status {
                info!(
                    cluster_id = %cluster.cluster_id,
                    from = ?cluster.status,
                    to = ?next,
                    "cluster health changed"
                );
            }
            cluster.status = next;
        }
        if let Some(timestamp) = request.last_alive_timestamp {
            cluster.last_alive_timestamp = timestamp;
        }

        self.store_cluster(&cluster)
    }

    pub fn cordon_cluster(&self, organization_id: &str, cluster_id: &str) -> RegistryResult<Cluster> {
        self.transition(organization_id, cluster_id, "cordon", cordon)
    }

    pub fn uncordon_cluster(
        &self,
        organization_id: &str,
        cluster_id: &str,
    ) -> RegistryResult<Cluster> {
        self.transition(organization_id, cluster_id, "uncordon", uncordon)
    }

    fn transition(
        &self,
        organization_id: &str,
        cluster_id: &str,
        action: &str,
        next: fn(ClusterStatus) -> RegistryResult<ClusterStatus>,
    ) -> RegistryResult<Cluster> {
        let mut cluster = self.get_cluster(organization_id, cluster_id)?;
        let status = next(cluster.status)?;
        if status == cluster.status {
            return Ok(cluster);
        }
        cluster.status = status;
        let stored = self.store_cluster(&cluster)?;
        info!(%organization_id, %cluster_id, %action, status = ?status, "cluster status changed");
        Ok(stored)
    }

    /// Write back a cluster read earlier. A concurrent status change since
    /// that read fails with `Conflict` instead of being overwritten.
    fn store_cluster(&self, cluster: &Cluster) -> RegistryResult<Cluster> {
        Ok(self.registry.clusters.replace(cluster, cluster.revision)?)
    }

    /// Remove a cluster with no nodes assigned.
    ///
    /// The index entry goes first so the cluster stops being listed before
    /// its record disappears; a failed record delete restores the entry.
    pub fn remove_cluster(&self, organization_id: &str, cluster_id: &str) -> RegistryResult<()> {
        validation::validate_identifier("organization_id", organization_id)?;
        validation::validate_identifier("cluster_id", cluster_id)?;
        self.owned().require(organization_id, cluster_id)?;

        let assigned = self
            .registry
            .nodes
            .list_by_owner(organization_id)?
            .into_iter()
            .filter(|n| n.cluster_id.as_deref() == Some(cluster_id))
            .count();
        if assigned > 0 {
            return Err(RegistryError::FailedPrecondition(format!(
                "cluster {cluster_id} still has {assigned} node(s) assigned"
            )));
        }

        let index = &self.registry.index;
        dual_write(
            "remove_cluster",
            cluster_id,
            || Ok(index.delete_child(organization_id, ChildKind::Cluster, cluster_id)?),
            || Ok(index.add_child(organization_id, ChildKind::Cluster, cluster_id)?),
            || Ok(self.registry.clusters.remove(cluster_id)?),
        )?;
        info!(%organization_id, %cluster_id, "cluster removed");
        Ok(())
    }
}
