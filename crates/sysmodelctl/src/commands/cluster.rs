use sysmodel_core::{AddClusterRequest, Registry, UpdateClusterRequest};
use sysmodel_state::ClusterHealth;

use super::print_json;

pub fn add(registry: &Registry, org: String, name: String, hostname: String) -> anyhow::Result<()> {
    let cluster = registry.cluster_manager().add_cluster(AddClusterRequest {
        organization_id: org,
        name,
        hostname,
        ..Default::default()
    })?;
    print_json(&cluster)
}

pub fn list(registry: &Registry, org: &str) -> anyhow::Result<()> {
    print_json(&registry.cluster_manager().list_clusters(org)?)
}

pub fn cordon(registry: &Registry, org: &str, cluster: &str) -> anyhow::Result<()> {
    print_json(&registry.cluster_manager().cordon_cluster(org, cluster)?)
}

pub fn uncordon(registry: &Registry, org: &str, cluster: &str) -> anyhow::Result<()> {
    print_json(&registry.cluster_manager().uncordon_cluster(org, cluster)?)
}

pub fn health(
    registry: &Registry,
    org: String,
    cluster: String,
    health: ClusterHealth,
) -> anyhow::Result<()> {
    let now = registry.clock.now();
    let updated = registry.cluster_manager().update_cluster(UpdateClusterRequest {
        organization_id: org,
        cluster_id: cluster,
        health: Some(health),
        last_alive_timestamp: Some(now),
        ..Default::default()
    })?;
    print_json(&updated)
}

pub fn remove(registry: &Registry, org: &str, cluster: &str) -> anyhow::Result<()> {
    registry.cluster_manager().remove_cluster(org, cluster)?;
    println!("✓ Removed cluster {cluster}");
    Ok(())
}
