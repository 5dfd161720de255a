//! End-to-end scenarios against both storage backends (§8), proving the
//! in-memory and durable implementations are interchangeable (§6.4).

use colgraph::model::property_map;
use colgraph::storage::InMemoryBackend;
use colgraph::{Graph, PropertyMap, StorageBackend};

async fn spiderpig_and_cow<B: StorageBackend>(graph: &Graph<B>) {
    let spiderpig = graph
        .create_node("test_type", "spiderpig", property_map([("sound", "oink")]))
        .await
        .unwrap();
    let cow = graph.create_node("test_type", "cow", property_map([("sound", "moo")])).await.unwrap();

    spiderpig
        .edges("friend")
        .create(cow.identity(), Some("spiderpig_cow_alliance".to_string()), property_map([("best", false)]))
        .await
        .unwrap();

    // scenario 1
    let outgoing = spiderpig.edges("friend").outgoing().await.unwrap();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].target().key, "cow");
    assert_eq!(outgoing[0].identity().rel_key, "spiderpig_cow_alliance");

    let incoming = cow.edges("friend").incoming().await.unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].source().key, "spiderpig");

    assert!(spiderpig.edges("friend").contains("cow").await.unwrap());
    let via_has_relationship = graph.has_relationship(spiderpig.identity(), "cow", "friend").await.unwrap();
    assert_eq!(via_has_relationship.len(), 1);

    // scenario 2
    let homer = graph.create_node("simpson", "homer", property_map([("sound", "Doh")])).await.unwrap();
    spiderpig
        .edges("friend")
        .create(homer.identity(), Some("loves".to_string()), property_map([("AKA", "Harry Plopper")]))
        .await
        .unwrap();

    let all_friends = spiderpig.edges("friend").all().await.unwrap();
    assert_eq!(all_friends.len(), 2);
    let mut keys: Vec<&str> = all_friends.iter().map(|e| e.target().key.as_str()).collect();
    keys.sort();
    assert_eq!(keys, vec!["cow", "homer"]);

    // scenario 3: deleting spiderpig must clear both sides everywhere
    spiderpig.delete().await.unwrap();

    let cow = graph.get_node("test_type", "cow").await.unwrap();
    assert!(cow.edges("friend").incoming().await.unwrap().is_empty());
    let homer = graph.get_node("simpson", "homer").await.unwrap();
    assert!(homer.edges("friend").incoming().await.unwrap().is_empty());

    assert!(graph.get_node("test_type", "spiderpig").await.is_err());

    let reference = graph.get_reference_node("test_type").await.unwrap();
    let instances = reference.edges("instance").outgoing().await.unwrap();
    assert!(instances.iter().all(|e| e.target().key != "spiderpig"));
}

async fn reference_node_idempotence<B: StorageBackend>(graph: &Graph<B>) {
    graph.create_node("simpson", "marge", PropertyMap::new()).await.unwrap();
    let first = graph.get_reference_node("simpson").await.unwrap();
    let second = graph.get_reference_node("simpson").await.unwrap();
    assert_eq!(first.identity(), second.identity());
}

async fn codec_round_trip<B: StorageBackend>(graph: &Graph<B>) {
    let attrs = property_map([
        ("a", colgraph::Value::Bool(true)),
        ("b", colgraph::Value::Int(7)),
        ("c", colgraph::Value::Float(3.5)),
        ("d", colgraph::Value::String("hi".to_string())),
    ]);
    let node = graph.create_node("widget", "w1", attrs.clone()).await.unwrap();
    let reloaded = graph.get_node("widget", "w1").await.unwrap();
    for (k, v) in &attrs {
        assert_eq!(reloaded.get(k), Some(v));
    }
    assert_eq!(node.attributes(), reloaded.attributes());
}

#[tokio::test]
async fn scenarios_against_memory_backend() {
    let graph = Graph::open_memory("scn_memory");
    spiderpig_and_cow(&graph).await;
    reference_node_idempotence(&graph).await;
    codec_round_trip(&graph).await;
}

#[tokio::test]
async fn scenarios_against_durable_backend() {
    let dir = tempfile::tempdir().unwrap();
    let graph = Graph::open_durable("scn_durable", dir.path()).unwrap();
    spiderpig_and_cow(&graph).await;
    reference_node_idempotence(&graph).await;
    codec_round_trip(&graph).await;
}

#[tokio::test]
async fn save_node_refreshes_adjacency_denormalization() {
    let graph = Graph::open_memory("save_refresh");
    let mut alice = graph.create_node("person", "alice", property_map([("mood", "ok")])).await.unwrap();
    let bob = graph.create_node("person", "bob", property_map([("mood", "ok")])).await.unwrap();
    alice.edges("friend").create(bob.identity(), None, PropertyMap::new()).await.unwrap();

    alice.set("mood", "ecstatic");
    alice.commit().await.unwrap();

    let bob = graph.get_node("person", "bob").await.unwrap();
    let incoming = bob.edges("friend").incoming().await.unwrap();
    assert_eq!(incoming[0].record().source_attributes.get("mood").unwrap().as_str(), Some("ecstatic"));
}

#[tokio::test]
async fn deleting_relationship_clears_both_adjacency_rows_and_pair_markers() {
    let graph = Graph::open_memory("del_rel");
    let alice = graph.create_node("person", "alice", PropertyMap::new()).await.unwrap();
    let bob = graph.create_node("person", "bob", PropertyMap::new()).await.unwrap();
    let rel = alice
        .edges("knows")
        .create(bob.identity(), Some("k1".to_string()), PropertyMap::new())
        .await
        .unwrap();
    rel.delete().await.unwrap();

    assert!(alice.edges("knows").outgoing().await.unwrap().is_empty());
    assert!(bob.edges("knows").incoming().await.unwrap().is_empty());
    assert!(!alice.edges("knows").contains("bob").await.unwrap());
    assert!(graph.has_relationship(alice.identity(), "bob", "knows").await.unwrap().is_empty());
}

#[tokio::test]
async fn batch_rollback_on_in_memory_backend() {
    let backend = InMemoryBackend::new();
    backend.begin_batch().await.unwrap();
    backend
        .insert("t", "r1", [("c".to_string(), "v".to_string())].into_iter().collect())
        .await
        .unwrap();
    backend
        .insert("t", "r2", [("c".to_string(), "v".to_string())].into_iter().collect())
        .await
        .unwrap();
    assert!(backend.get("t", "r1").await.unwrap().is_none());
    assert!(backend.get("t", "r2").await.unwrap().is_none());
    backend.commit_batch().await.unwrap();
    assert!(backend.get("t", "r1").await.unwrap().is_some());
    assert!(backend.get("t", "r2").await.unwrap().is_some());
}

#[tokio::test]
async fn depth_first_traversal_visits_each_key_once() {
    let graph = Graph::open_memory("dfs");
    let a = graph.create_node("person", "a", PropertyMap::new()).await.unwrap();
    let b = graph.create_node("person", "b", PropertyMap::new()).await.unwrap();
    let c = graph.create_node("person", "c", PropertyMap::new()).await.unwrap();
    a.edges("knows").create(b.identity(), None, PropertyMap::new()).await.unwrap();
    a.edges("knows").create(c.identity(), None, PropertyMap::new()).await.unwrap();
    b.edges("knows").create(c.identity(), None, PropertyMap::new()).await.unwrap();

    let reached = colgraph::depth_first(&graph, a.identity().clone(), "knows", |_| true).await.unwrap();
    let mut keys: Vec<&str> = reached.iter().map(|n| n.key.as_str()).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys, vec!["b", "c"]);
    assert_eq!(reached.len(), 2, "c is reachable via two paths but must be visited once");
}
