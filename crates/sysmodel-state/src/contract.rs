//! Behaviour every backend must share, exercised from each backend's tests.

use crate::error::StateError;
use crate::index::{ChildKind, OrganizationIndex};
use crate::record::EntityStore;
use crate::types::*;

pub(crate) fn organization(id: &str) -> Organization {
    Organization {
        organization_id: id.to_string(),
        name: id.to_string(),
        full_address: String::new(),
        city: String::new(),
        state: String::new(),
        country: String::new(),
        zip_code: String::new(),
        created: 1000,
    }
}

pub(crate) fn cluster(organization_id: &str, id: &str) -> Cluster {
    Cluster {
        organization_id: organization_id.to_string(),
        cluster_id: id.to_string(),
        name: format!("cluster-{id}"),
        hostname: format!("{id}.acme.test"),
        control_plane_hostname: String::new(),
        labels: Labels::new(),
        status: ClusterStatus::Unknown,
        last_alive_timestamp: 0,
        created: 1000,
        revision: 0,
    }
}

fn instance(id: &str) -> AppInstance {
    AppInstance {
        organization_id: "acme".to_string(),
        app_instance_id: id.to_string(),
        app_descriptor_id: "d1".to_string(),
        name: "app".to_string(),
        labels: Labels::new(),
        status: ApplicationStatus::Deploying,
        groups: Vec::new(),
        created: 1000,
        revision: 0,
    }
}

pub(crate) fn store_contract(store: &dyn EntityStore<Cluster>) {
    let c1 = cluster("acme", "c1");

    assert!(!store.exists("c1").unwrap());
    store.add(&c1).unwrap();
    assert!(store.exists("c1").unwrap());
    assert_eq!(store.get("c1").unwrap(), c1);

    let err = store.add(&c1).unwrap_err();
    assert!(matches!(err, StateError::AlreadyExists(_)));

    let mut renamed = c1.clone();
    renamed.name = "renamed".to_string();
    store.update(&renamed).unwrap();
    assert_eq!(store.get("c1").unwrap().name, "renamed");

    let err = store.update(&cluster("acme", "missing")).unwrap_err();
    assert!(matches!(err, StateError::NotFound(_)));

    store.remove("c1").unwrap();
    assert!(matches!(store.get("c1").unwrap_err(), StateError::NotFound(_)));
    assert!(matches!(store.remove("c1").unwrap_err(), StateError::NotFound(_)));
    assert!(store.list().unwrap().is_empty());
}

pub(crate) fn replace_contract(store: &dyn EntityStore<AppInstance>) {
    let inst = instance("i1");
    store.add(&inst).unwrap();

    let stored = store.replace(&inst, 0).unwrap();
    assert_eq!(stored.revision, 1);
    assert_eq!(store.get("i1").unwrap().revision, 1);

    // A writer still holding revision 0 has lost the race.
    let err = store.replace(&inst, 0).unwrap_err();
    match err {
        StateError::Conflict {
            expected, found, ..
        } => {
            assert_eq!(expected, 0);
            assert_eq!(found, 1);
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    let err = store.replace(&instance("missing"), 0).unwrap_err();
    assert!(matches!(err, StateError::NotFound(_)));
}

pub(crate) fn index_contract(
    organizations: &dyn EntityStore<Organization>,
    index: &dyn OrganizationIndex,
) {
    // Unknown organization.
    let err = index.add_child("acme", ChildKind::Cluster, "c1").unwrap_err();
    assert!(matches!(err, StateError::NotFound(_)));
    let err = index.list_children("acme", ChildKind::Cluster).unwrap_err();
    assert!(matches!(err, StateError::NotFound(_)));

    organizations.add(&organization("acme")).unwrap();
    organizations.add(&organization("globex")).unwrap();

    for kind in ChildKind::ALL {
        assert!(index.list_children("acme", kind).unwrap().is_empty());

        index.add_child("acme", kind, "b").unwrap();
        index.add_child("acme", kind, "a").unwrap();
        index.add_child("globex", kind, "z").unwrap();

        let err = index.add_child("acme", kind, "a").unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists(_)));

        assert!(index.child_exists("acme", kind, "a").unwrap());
        assert!(!index.child_exists("acme", kind, "z").unwrap());
        assert_eq!(
            index.list_children("acme", kind).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );

        index.delete_child("acme", kind, "a").unwrap();
        let err = index.delete_child("acme", kind, "a").unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
        assert_eq!(index.list_children("acme", kind).unwrap(), vec!["b".to_string()]);
    }

    // Kinds never leak into each other.
    index.add_child("acme", ChildKind::User, "ops@acme.io").unwrap();
    assert!(!index
        .child_exists("acme", ChildKind::Role, "ops@acme.io")
        .unwrap());
}

pub(crate) fn owner_listing_contract(
    clusters: &dyn EntityStore<Cluster>,
    projects: &dyn EntityStore<Project>,
) {
    clusters.add(&cluster("acme", "c1")).unwrap();
    clusters.add(&cluster("acme", "c2")).unwrap();
    clusters.add(&cluster("globex", "c3")).unwrap();

    let acme: Vec<String> = clusters
        .list_by_owner("acme")
        .unwrap()
        .into_iter()
        .map(|c| c.cluster_id)
        .collect();
    assert_eq!(acme, vec!["c1".to_string(), "c2".to_string()]);
    assert!(clusters.list_by_owner("initech").unwrap().is_empty());

    projects
        .add(&Project {
            owner_account_id: "acct-1".to_string(),
            project_id: "p1".to_string(),
            name: "edge".to_string(),
            created: 1000,
        })
        .unwrap();
    assert_eq!(projects.list_by_owner("acct-1").unwrap().len(), 1);
}
