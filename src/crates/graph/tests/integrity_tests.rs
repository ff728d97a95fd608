//! Structural invariants checked after realistic mutation sequences

use std::collections::BTreeMap;
use willow_graph::{Graph, GraphStore, NodeId, NodeType, Relation, Temporal};

fn root() -> NodeId {
    NodeId::from(Graph::ROOT_ID)
}

#[test]
fn invariants_hold_after_mixed_mutations() {
    let dir = tempfile::tempdir().unwrap();
    let store = GraphStore::open(&dir.path().join("graph.json")).unwrap();

    let people = store
        .create_node(&root(), NodeType::Category, "People", None, None)
        .unwrap();
    let places = store
        .create_node(&root(), NodeType::Category, "Places", None, None)
        .unwrap();
    let alice = store
        .create_node(&people.id, NodeType::Entity, "Alice", None, None)
        .unwrap();
    let london = store
        .create_node(&places.id, NodeType::Entity, "London", None, None)
        .unwrap();
    store
        .add_link(&alice.id, &london.id, Relation::RelatedTo, true, Some(0.9))
        .unwrap();

    let job = store
        .create_node(
            &people.id,
            NodeType::Event,
            "Started new job",
            Some(BTreeMap::from([(
                "source_type".to_string(),
                "conversation".to_string(),
            )])),
            Some(Temporal {
                valid_from: Some("2024-03-01".to_string()),
                valid_until: None,
                label: Some("since March".to_string()),
            }),
        )
        .unwrap();
    store
        .update_node(&job.id, Some("Started job at Acme"), None, None, Some("clarified"))
        .unwrap();
    store.delete_node(&job.id).unwrap();

    let graph = store.graph();
    assert!(graph.verify_invariants().is_empty());
    assert_eq!(graph.node_count(), 5);
    assert_eq!(graph.link_count(), 1);
}

#[test]
fn invariants_hold_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.json");

    let alice_id;
    {
        let store = GraphStore::open(&path).unwrap();
        let people = store
            .create_node(&root(), NodeType::Category, "People", None, None)
            .unwrap();
        alice_id = store
            .create_node(&people.id, NodeType::Entity, "Alice", None, None)
            .unwrap()
            .id;
    }

    let store = GraphStore::open(&path).unwrap();
    let graph = store.graph();
    assert!(graph.verify_invariants().is_empty());
    assert!(graph.nodes.contains_key(&alice_id));

    let hits = store.search_nodes("alice", 10);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, alice_id);
}

#[test]
fn cascade_delete_leaves_no_dangling_references() {
    let dir = tempfile::tempdir().unwrap();
    let store = GraphStore::open(&dir.path().join("graph.json")).unwrap();

    let a = store
        .create_node(&root(), NodeType::Category, "A", None, None)
        .unwrap();
    let b = store
        .create_node(&a.id, NodeType::Collection, "B", None, None)
        .unwrap();
    let c = store
        .create_node(&b.id, NodeType::Detail, "C", None, None)
        .unwrap();
    let d = store
        .create_node(&root(), NodeType::Entity, "D", None, None)
        .unwrap();
    store
        .add_link(&c.id, &d.id, Relation::LeadsTo, false, None)
        .unwrap();

    let report = store.delete_node(&b.id).unwrap();
    assert_eq!(report.total(), 3);

    let graph = store.graph();
    assert!(graph.verify_invariants().is_empty());
    for link in graph.links.values() {
        assert!(graph.nodes.contains_key(&link.from_node));
        assert!(graph.nodes.contains_key(&link.to_node));
    }
}
