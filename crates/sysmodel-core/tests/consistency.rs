//! Index/store consistency under failures and races.
//!
//! Storage collaborators are wrapped to fail or interleave on demand, the
//! same way a flaky disk or a concurrent writer would.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sysmodel_core::*;
use sysmodel_state::*;

/// Index whose `add_child` fails for one kind of child.
struct FailingIndex {
    inner: Arc<dyn OrganizationIndex>,
    fail_kind: ChildKind,
}

impl OrganizationIndex for FailingIndex {
    fn add_child(&self, organization_id: &str, kind: ChildKind, child_id: &str) -> StateResult<()> {
        if kind == self.fail_kind {
            return Err(StateError::Write(format!("injected failure indexing {kind}")));
        }
        self.inner.add_child(organization_id, kind, child_id)
    }

    fn child_exists(&self, organization_id: &str, kind: ChildKind, child_id: &str) -> StateResult<bool> {
        self.inner.child_exists(organization_id, kind, child_id)
    }

    fn list_children(&self, organization_id: &str, kind: ChildKind) -> StateResult<Vec<String>> {
        self.inner.list_children(organization_id, kind)
    }

    fn delete_child(&self, organization_id: &str, kind: ChildKind, child_id: &str) -> StateResult<()> {
        self.inner.delete_child(organization_id, kind, child_id)
    }
}

/// Store whose `add` always fails.
struct FailingAdds<T: Record> {
    inner: Arc<dyn EntityStore<T>>,
}

impl<T: Record> EntityStore<T> for FailingAdds<T> {
    fn add(&self, record: &T) -> StateResult<()> {
        Err(StateError::Write(format!("injected failure adding {}", record.key())))
    }

    fn get(&self, key: &str) -> StateResult<T> {
        self.inner.get(key)
    }

    fn update(&self, record: &T) -> StateResult<()> {
        self.inner.update(record)
    }

    fn replace(&self, record: &T, expected_revision: u64) -> StateResult<T> {
        self.inner.replace(record, expected_revision)
    }

    fn remove(&self, key: &str) -> StateResult<()> {
        self.inner.remove(key)
    }

    fn exists(&self, key: &str) -> StateResult<bool> {
        self.inner.exists(key)
    }

    fn list(&self) -> StateResult<Vec<T>> {
        self.inner.list()
    }
}

/// Store whose `remove` always fails.
struct FailingRemoves<T: Record> {
    inner: Arc<dyn EntityStore<T>>,
}

impl<T: Record> EntityStore<T> for FailingRemoves<T> {
    fn add(&self, record: &T) -> StateResult<()> {
        self.inner.add(record)
    }

    fn get(&self, key: &str) -> StateResult<T> {
        self.inner.get(key)
    }

    fn update(&self, record: &T) -> StateResult<()> {
        self.inner.update(record)
    }

    fn replace(&self, record: &T, expected_revision: u64) -> StateResult<T> {
        self.inner.replace(record, expected_revision)
    }

    fn remove(&self, key: &str) -> StateResult<()> {
        Err(StateError::Write(format!("injected failure removing {key}")))
    }

    fn exists(&self, key: &str) -> StateResult<bool> {
        self.inner.exists(key)
    }

    fn list(&self) -> StateResult<Vec<T>> {
        self.inner.list()
    }
}

/// Cluster store where an operator cordon lands right before the next
/// revision-checked rewrite.
struct RacingClusters {
    inner: Arc<dyn EntityStore<Cluster>>,
    armed: AtomicBool,
}

impl EntityStore<Cluster> for RacingClusters {
    fn add(&self, record: &Cluster) -> StateResult<()> {
        self.inner.add(record)
    }

    fn get(&self, key: &str) -> StateResult<Cluster> {
        self.inner.get(key)
    }

    fn update(&self, record: &Cluster) -> StateResult<()> {
        self.inner.update(record)
    }

    fn replace(&self, record: &Cluster, expected_revision: u64) -> StateResult<Cluster> {
        if self.armed.swap(false, Ordering::SeqCst) {
            let mut theirs = self.inner.get(record.key())?;
            theirs.status = ClusterStatus::OnlineCordon;
            self.inner.replace(&theirs, theirs.revision)?;
        }
        self.inner.replace(record, expected_revision)
    }

    fn remove(&self, key: &str) -> StateResult<()> {
        self.inner.remove(key)
    }

    fn exists(&self, key: &str) -> StateResult<bool> {
        self.inner.exists(key)
    }

    fn list(&self) -> StateResult<Vec<Cluster>> {
        self.inner.list()
    }
}

/// Instance store that lets a competing writer land right before the next
/// revision-checked rewrite.
struct RacingInstances {
    inner: Arc<dyn EntityStore<AppInstance>>,
    armed: AtomicBool,
}

impl EntityStore<AppInstance> for RacingInstances {
    fn add(&self, record: &AppInstance) -> StateResult<()> {
        self.inner.add(record)
    }

    fn get(&self, key: &str) -> StateResult<AppInstance> {
        self.inner.get(key)
    }

    fn update(&self, record: &AppInstance) -> StateResult<()> {
        self.inner.update(record)
    }

    fn replace(&self, record: &AppInstance, expected_revision: u64) -> StateResult<AppInstance> {
        if self.armed.swap(false, Ordering::SeqCst) {
            let mut theirs = self.inner.get(record.key())?;
            theirs.status = ApplicationStatus::Error;
            self.inner.replace(&theirs, theirs.revision)?;
        }
        self.inner.replace(record, expected_revision)
    }

    fn remove(&self, key: &str) -> StateResult<()> {
        self.inner.remove(key)
    }

    fn exists(&self, key: &str) -> StateResult<bool> {
        self.inner.exists(key)
    }

    fn list(&self) -> StateResult<Vec<AppInstance>> {
        self.inner.list()
    }
}

fn add_org(registry: &Registry) -> String {
    registry
        .organization_manager()
        .add_organization(AddOrganizationRequest {
            name: "acme".into(),
            ..Default::default()
        })
        .unwrap()
        .organization_id
}

fn add_edge_cluster(registry: &Registry, org: &str) -> Cluster {
    registry
        .cluster_manager()
        .add_cluster(AddClusterRequest {
            organization_id: org.to_string(),
            name: "edge".into(),
            hostname: "edge.acme.test".into(),
            ..Default::default()
        })
        .unwrap()
}

fn report_health(registry: &Registry, org: &str, cluster_id: &str, health: ClusterHealth) -> RegistryResult<Cluster> {
    registry.cluster_manager().update_cluster(UpdateClusterRequest {
        organization_id: org.to_string(),
        cluster_id: cluster_id.to_string(),
        health: Some(health),
        ..Default::default()
    })
}

fn descriptor_request(org: &str) -> AddDescriptorRequest {
    AddDescriptorRequest {
        organization_id: org.to_string(),
        name: "shop".into(),
        groups: vec![ServiceGroup {
            service_group_id: String::new(),
            name: "web".into(),
            policy: CollocationPolicy::SameCluster,
            specs: ServiceGroupSpecs::default(),
            services: vec![Service {
                service_id: String::new(),
                name: "frontend".into(),
                image: "registry.acme.test/frontend:2".into(),
                resources: ResourceSpec::default(),
                exposed_ports: Vec::new(),
                storage: Vec::new(),
                environment_variables: Default::default(),
                labels: Labels::new(),
                run_arguments: Vec::new(),
                deploy_after: Vec::new(),
            }],
            labels: Labels::new(),
        }],
        ..Default::default()
    }
}

fn instance_request(org: &str, descriptor: &AppDescriptor) -> AddInstanceRequest {
    AddInstanceRequest {
        organization_id: org.to_string(),
        app_descriptor_id: descriptor.app_descriptor_id.clone(),
        name: "shop-prod".into(),
        labels: Labels::new(),
        parameters: Some(vec![InstanceParameter {
            name: "tier".into(),
            value: "gold".into(),
        }]),
    }
}

fn keys<T: Record>(records: Vec<T>) -> BTreeSet<String> {
    records.iter().map(|r| r.key().to_string()).collect()
}

/// Every indexed id resolves to a store record owned by `org`, and every
/// store record owned by `org` is indexed.
fn assert_agreement(registry: &Registry, org: &str) {
    let index = |kind: ChildKind| -> BTreeSet<String> {
        registry
            .index
            .list_children(org, kind)
            .unwrap()
            .into_iter()
            .collect()
    };
    assert_eq!(index(ChildKind::Cluster), keys(registry.clusters.list_by_owner(org).unwrap()));
    assert_eq!(index(ChildKind::Node), keys(registry.nodes.list_by_owner(org).unwrap()));
    assert_eq!(
        index(ChildKind::Descriptor),
        keys(registry.descriptors.list_by_owner(org).unwrap())
    );
    assert_eq!(
        index(ChildKind::Instance),
        keys(registry.instances.list_by_owner(org).unwrap())
    );
    assert_eq!(index(ChildKind::User), keys(registry.users.list_by_owner(org).unwrap()));
    assert_eq!(index(ChildKind::Role), keys(registry.roles.list_by_owner(org).unwrap()));
}

/// Adds and removes one of everything, checking agreement after each step.
fn exercise_every_kind(registry: &Registry) {
    let org = add_org(registry);
    assert_agreement(registry, &org);

    let cluster = registry
        .cluster_manager()
        .add_cluster(AddClusterRequest {
            organization_id: org.clone(),
            name: "edge".into(),
            hostname: "edge.acme.test".into(),
            ..Default::default()
        })
        .unwrap();
    let node = registry
        .node_manager()
        .add_node(AddNodeRequest {
            organization_id: org.clone(),
            ip: "10.1.0.4".into(),
            labels: Labels::new(),
        })
        .unwrap();
    let user = registry
        .user_manager()
        .add_user(AddUserRequest {
            organization_id: org.clone(),
            email: "ops@acme.test".into(),
            name: "Ops".into(),
        })
        .unwrap();
    let role = registry
        .role_manager()
        .add_role(AddRoleRequest {
            organization_id: org.clone(),
            name: "admin".into(),
            ..Default::default()
        })
        .unwrap();
    let apps = registry.application_manager();
    let descriptor = apps.add_descriptor(descriptor_request(&org)).unwrap();
    let instance = apps.add_instance(instance_request(&org, &descriptor)).unwrap();
    assert_agreement(registry, &org);

    apps.remove_instance(&org, &instance.app_instance_id).unwrap();
    assert_agreement(registry, &org);
    apps.remove_descriptor(&org, &descriptor.app_descriptor_id).unwrap();
    registry.role_manager().remove_role(&org, &role.role_id).unwrap();
    registry.user_manager().remove_user(&org, &user.email).unwrap();
    assert_agreement(registry, &org);
    registry.node_manager().remove_node(&org, &node.node_id).unwrap();
    registry.cluster_manager().remove_cluster(&org, &cluster.cluster_id).unwrap();
    assert_agreement(registry, &org);

    for kind in ChildKind::ALL {
        assert!(registry.index.list_children(&org, kind).unwrap().is_empty());
    }
}

#[test]
fn index_and_stores_agree_in_memory() {
    exercise_every_kind(&Registry::in_memory());
}

#[test]
fn index_and_stores_agree_on_redb() {
    let state = StateStore::open_in_memory().unwrap();
    exercise_every_kind(&Registry::durable(&state));
}

#[test]
fn failed_indexing_rolls_back_the_entity() {
    let base = Registry::in_memory();
    let org = add_org(&base);
    let registry = base.clone().with_index(Arc::new(FailingIndex {
        inner: Arc::clone(&base.index),
        fail_kind: ChildKind::Cluster,
    }));

    let err = registry
        .cluster_manager()
        .add_cluster(AddClusterRequest {
            organization_id: org.clone(),
            name: "edge".into(),
            hostname: "edge.acme.test".into(),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(registry.clusters.list().unwrap().is_empty());
    assert!(registry.cluster_manager().list_clusters(&org).unwrap().is_empty());
    assert_agreement(&registry, &org);
}

#[test]
fn failed_instance_indexing_leaves_nothing_behind() {
    let base = Registry::in_memory();
    let org = add_org(&base);
    let descriptor = base.application_manager().add_descriptor(descriptor_request(&org)).unwrap();
    let registry = base.clone().with_index(Arc::new(FailingIndex {
        inner: Arc::clone(&base.index),
        fail_kind: ChildKind::Instance,
    }));

    let err = registry
        .application_manager()
        .add_instance(instance_request(&org, &descriptor))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(registry.instances.list().unwrap().is_empty());
    assert!(registry.parametrized_descriptors.list().unwrap().is_empty());
    assert!(registry.instance_parameters.list().unwrap().is_empty());
}

#[test]
fn late_failure_rolls_back_every_instance_write() {
    let mut registry = Registry::in_memory();
    let org = add_org(&registry);
    let descriptor = registry
        .application_manager()
        .add_descriptor(descriptor_request(&org))
        .unwrap();
    registry.instance_parameters = Arc::new(FailingAdds {
        inner: Arc::clone(&registry.instance_parameters),
    });

    let err = registry
        .application_manager()
        .add_instance(instance_request(&org, &descriptor))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(registry.instances.list().unwrap().is_empty());
    assert!(registry.parametrized_descriptors.list().unwrap().is_empty());
    assert!(registry
        .index
        .list_children(&org, ChildKind::Instance)
        .unwrap()
        .is_empty());
}

#[test]
fn failed_descriptor_indexing_keeps_the_descriptor() {
    let base = Registry::in_memory();
    let org = add_org(&base);
    let registry = base.clone().with_index(Arc::new(FailingIndex {
        inner: Arc::clone(&base.index),
        fail_kind: ChildKind::Descriptor,
    }));

    let err = registry
        .application_manager()
        .add_descriptor(descriptor_request(&org))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(registry.descriptors.list().unwrap().len(), 1);
    assert!(registry.application_manager().list_descriptors(&org).unwrap().is_empty());

    // Adding again stores a second record; the unindexed one stays behind.
    let again = base.application_manager().add_descriptor(descriptor_request(&org)).unwrap();
    let listed = base.application_manager().list_descriptors(&org).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].app_descriptor_id, again.app_descriptor_id);
    assert_eq!(base.descriptors.list().unwrap().len(), 2);
}

#[test]
fn racing_aggregate_rewrite_conflicts() {
    let mut registry = Registry::in_memory();
    let org = add_org(&registry);
    let apps = registry.application_manager();
    let descriptor = apps.add_descriptor(descriptor_request(&org)).unwrap();
    let instance = apps.add_instance(instance_request(&org, &descriptor)).unwrap();

    let racing = Arc::new(RacingInstances {
        inner: Arc::clone(&registry.instances),
        armed: AtomicBool::new(true),
    });
    registry.instances = racing.clone();
    let apps = registry.application_manager();

    let err = apps
        .update_instance_status(&org, &instance.app_instance_id, ApplicationStatus::Running)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // The competing write is kept and a retry on fresh state succeeds.
    let current = apps.get_instance(&org, &instance.app_instance_id).unwrap();
    assert_eq!(current.status, ApplicationStatus::Error);
    assert_eq!(current.revision, 1);
    let retried = apps
        .update_instance_status(&org, &instance.app_instance_id, ApplicationStatus::Running)
        .unwrap();
    assert_eq!(retried.status, ApplicationStatus::Running);
    assert_eq!(retried.revision, 2);
    assert!(!racing.armed.load(Ordering::SeqCst));
}

#[test]
fn racing_cordon_is_not_lost_to_a_health_report() {
    let mut registry = Registry::in_memory();
    let org = add_org(&registry);
    let cluster = add_edge_cluster(&registry, &org);
    report_health(&registry, &org, &cluster.cluster_id, ClusterHealth::Online).unwrap();

    let racing = Arc::new(RacingClusters {
        inner: Arc::clone(&registry.clusters),
        armed: AtomicBool::new(true),
    });
    registry.clusters = racing.clone();

    let err = report_health(&registry, &org, &cluster.cluster_id, ClusterHealth::Offline).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let current = registry.cluster_manager().get_cluster(&org, &cluster.cluster_id).unwrap();
    assert_eq!(current.status, ClusterStatus::OnlineCordon);

    let retried = report_health(&registry, &org, &cluster.cluster_id, ClusterHealth::Offline).unwrap();
    assert_eq!(retried.status, ClusterStatus::OfflineCordon);
    assert_eq!(retried.revision, 3);
    assert!(!racing.armed.load(Ordering::SeqCst));
}

#[test]
fn racing_cordon_requests_conflict() {
    let mut registry = Registry::in_memory();
    let org = add_org(&registry);
    let cluster = add_edge_cluster(&registry, &org);
    report_health(&registry, &org, &cluster.cluster_id, ClusterHealth::Online).unwrap();

    registry.clusters = Arc::new(RacingClusters {
        inner: Arc::clone(&registry.clusters),
        armed: AtomicBool::new(true),
    });

    let err = registry
        .cluster_manager()
        .cordon_cluster(&org, &cluster.cluster_id)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Once the fresh state is read the cordon is already in place.
    let again = registry.cluster_manager().cordon_cluster(&org, &cluster.cluster_id).unwrap();
    assert_eq!(again.status, ClusterStatus::OnlineCordon);
    assert_eq!(again.revision, 2);
}

#[test]
fn failed_cluster_removal_restores_the_index_entry() {
    let mut registry = Registry::in_memory();
    let org = add_org(&registry);
    let cluster = add_edge_cluster(&registry, &org);
    registry.clusters = Arc::new(FailingRemoves {
        inner: Arc::clone(&registry.clusters),
    });

    let err = registry
        .cluster_manager()
        .remove_cluster(&org, &cluster.cluster_id)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    let listed = registry.cluster_manager().list_clusters(&org).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].cluster_id, cluster.cluster_id);
    assert_agreement(&registry, &org);
}

#[test]
fn failed_instance_removal_keeps_the_index_entry() {
    let mut registry = Registry::in_memory();
    let org = add_org(&registry);
    let apps = registry.application_manager();
    let descriptor = apps.add_descriptor(descriptor_request(&org)).unwrap();
    let instance = apps.add_instance(instance_request(&org, &descriptor)).unwrap();
    registry.instances = Arc::new(FailingRemoves {
        inner: Arc::clone(&registry.instances),
    });

    let apps = registry.application_manager();
    let err = apps.remove_instance(&org, &instance.app_instance_id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    assert!(registry
        .index
        .child_exists(&org, ChildKind::Instance, &instance.app_instance_id)
        .unwrap());
    assert!(registry.parametrized_descriptors.exists(&instance.app_instance_id).unwrap());
    assert!(registry.instance_parameters.exists(&instance.app_instance_id).unwrap());
    assert_eq!(apps.get_instance(&org, &instance.app_instance_id).unwrap(), instance);
    assert_agreement(&registry, &org);
}

#[test]
fn redb_registry_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.redb");

    let (org, cluster_id) = {
        let state = StateStore::open(&path).unwrap();
        let registry = Registry::durable(&state);
        let org = add_org(&registry);
        let cluster = registry
            .cluster_manager()
            .add_cluster(AddClusterRequest {
                organization_id: org.clone(),
                name: "edge".into(),
                hostname: "edge.acme.test".into(),
                ..Default::default()
            })
            .unwrap();
        (org, cluster.cluster_id)
    };

    let state = StateStore::open(&path).unwrap();
    let registry = Registry::durable(&state);
    let clusters = registry.cluster_manager().list_clusters(&org).unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].cluster_id, cluster_id);
    assert_agreement(&registry, &org);
}
