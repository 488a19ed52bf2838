mod common;

use switchyard::prelude::*;
use switchyard::types::channel::ChannelAttrs;

use common::{create_topology, setup_datastore};

#[test]
fn test_current_namespace_scopes_names() {
    let (ds, _mocks) = setup_datastore();
    ds.add_namespace("ns1").unwrap();
    ds.add_namespace("ns2").unwrap();

    ds.set_current_namespace("ns1").unwrap();
    assert_eq!(
        ds.create(ds.channels(), "ch1", ChannelAttrs::default()).unwrap(),
        "ns1:ch1"
    );
    assert_eq!(
        ds.create(ds.channels(), "ns2:ch1", ChannelAttrs::default())
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidNamespace
    );
    ds.unset_current_namespace();

    assert_eq!(
        ds.create(ds.channels(), "nsx:ch1", ChannelAttrs::default())
            .unwrap_err(),
        DatastoreError::NotFound("namespace = nsx".to_string())
    );
    assert_eq!(
        ds.add_namespace("ns1").unwrap_err(),
        DatastoreError::AlreadyExists("namespace = ns1".to_string())
    );
    assert_eq!(
        ds.set_current_namespace("nsx").unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn test_list_by_namespace() {
    let (ds, _mocks) = setup_datastore();
    ds.add_namespace("ns1").unwrap();
    ds.create(ds.channels(), "ch1", ChannelAttrs::default()).unwrap();
    ds.create(ds.channels(), "ns1:ch1", ChannelAttrs::default()).unwrap();
    ds.create(ds.channels(), "ns1:ch2", ChannelAttrs::default()).unwrap();

    let names = |list: Vec<EntityState<ChannelAttrs>>| {
        let mut names: Vec<String> = list.iter().map(|st| st.name().to_string()).collect();
        names.sort();
        names
    };
    assert_eq!(names(ds.list(ds.channels(), None).unwrap()).len(), 3);
    assert_eq!(
        names(ds.list(ds.channels(), Some("ns1:")).unwrap()),
        vec!["ns1:ch1", "ns1:ch2"]
    );
    assert_eq!(names(ds.list(ds.channels(), Some(":")).unwrap()), vec![":ch1"]);
    assert_eq!(
        names(ds.list(ds.channels(), Some("ns1:ch2")).unwrap()),
        vec!["ns1:ch2"]
    );
    assert_eq!(
        ds.list(ds.channels(), Some("ns1:ch9")).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn test_duplicate_and_delete_namespace() {
    let (ds, mocks) = setup_datastore();
    ds.add_namespace("ns1").unwrap();
    ds.add_namespace("ns2").unwrap();
    ds.set_current_namespace("ns1").unwrap();
    create_topology(&ds, "1").unwrap();
    ds.unset_current_namespace();
    mocks.log.clear();

    let created = ds.duplicate_namespace("ns1", "ns2").unwrap();
    assert_eq!(
        created,
        vec!["ns2:if1", "ns2:p1", "ns2:ch1", "ns2:c1", "ns2:br1"]
    );
    let bridge = ds.current(ds.bridges(), "ns2:br1").unwrap();
    assert!(bridge.controllers.contains("ns2:c1"));
    assert_eq!(bridge.ports[0].name, "ns2:p1");
    assert_eq!(ds.current(ds.ports(), "ns2:p1").unwrap().interface, "ns2:if1");
    assert!(ds.controllers().is_used("ns2:c1").unwrap());
    assert!(mocks.log.calls().is_empty());

    ds.delete_namespace("ns2").unwrap();

    assert_eq!(
        mocks.log.lines(),
        vec![
            "destroy bridge ns2:br1",
            "destroy controller ns2:c1",
            "destroy channel ns2:ch1",
            "destroy port ns2:p1",
            "destroy interface ns2:if1",
        ]
    );
    assert_eq!(ds.namespaces(), vec!["ns1"]);
    assert_eq!(ds.list(ds.bridges(), Some("ns1:")).unwrap().len(), 1);
    assert!(ds.list(ds.bridges(), Some("ns2:")).unwrap().is_empty());
}

#[test]
fn test_duplicate_into_missing_namespace() {
    let (ds, _mocks) = setup_datastore();
    ds.create(ds.channels(), "ch1", ChannelAttrs::default()).unwrap();

    assert_eq!(
        ds.duplicate("channel", "ch1", Some("nsx")).unwrap_err(),
        DatastoreError::NotFound("namespace = nsx".to_string())
    );
    ds.add_namespace("nsx").unwrap();
    assert_eq!(ds.duplicate("channel", "ch1", Some("nsx")).unwrap(), "nsx:ch1");
    assert_eq!(
        ds.duplicate("channel", "ch1", Some("nsx")).unwrap_err().kind(),
        ErrorKind::AlreadyExists
    );
}

#[test]
fn test_namespace_delete_is_refused_inside_a_transaction() {
    let (ds, _mocks) = setup_datastore();
    ds.add_namespace("ns1").unwrap();
    ds.atomic_begin().unwrap();

    assert_eq!(
        ds.delete_namespace("ns1").unwrap_err().kind(),
        ErrorKind::NotOperational
    );
    ds.atomic_abort().unwrap();
    ds.delete_namespace("ns1").unwrap();
    assert!(ds.namespaces().is_empty());
}
