//! Full pipeline: import, translate, execute, inspect rows.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use quiver::store::Value;
use quiver::{GraphQuery, QuiverError, SqlStore};

const EDGES: &str = "node1\tlabel\tnode2\n\
                     john\tloves\tmary\n\
                     john\tknows\tjoe\n\
                     mary\tknows\tjoe\n\
                     joe\tknows\tbob\n";

fn write_file(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

fn loaded_store(dir: &tempfile::TempDir) -> Arc<Mutex<SqlStore>> {
    let edges = write_file(dir.path(), "edges.tsv", EDGES);
    let mut store = SqlStore::open(dir.path().join("cache.db")).unwrap();
    store.add_graph(&edges, None, &[], false).unwrap();
    Arc::new(Mutex::new(store))
}

fn run(store: &Arc<Mutex<SqlStore>>, text: &str) -> Vec<Vec<Value>> {
    let mut query = GraphQuery::new(Arc::clone(store), text, false);
    query.execute(&FxHashMap::default()).unwrap().to_vec()
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

#[test]
fn label_restriction_selects_matching_edges() {
    let dir = tempfile::tempdir().unwrap();
    let store = loaded_store(&dir);
    let rows = run(&store, "MATCH (a)-[r:loves]->(b) RETURN a, b");
    assert_eq!(rows, vec![vec![text("john"), text("mary")]]);
}

#[test]
fn two_hop_join_follows_connectors() {
    let dir = tempfile::tempdir().unwrap();
    let store = loaded_store(&dir);
    let rows = run(
        &store,
        "MATCH (a)-[r:knows]->(b)-[s:knows]->(c) RETURN a, b, c ORDER BY a",
    );
    assert_eq!(
        rows,
        vec![
            vec![text("john"), text("joe"), text("bob")],
            vec![text("mary"), text("joe"), text("bob")],
        ]
    );
}

#[test]
fn backward_arrow_matches_like_forward() {
    let dir = tempfile::tempdir().unwrap();
    let store = loaded_store(&dir);
    let forward = run(&store, "MATCH (a)-[r:loves]->(b) RETURN a, b");
    let backward = run(&store, "MATCH (b)<-[r:loves]-(a) RETURN a, b");
    assert_eq!(forward, backward);
}

#[test]
fn optional_match_yields_null_for_missing_extension() {
    let dir = tempfile::tempdir().unwrap();
    let store = loaded_store(&dir);
    let rows = run(
        &store,
        "MATCH (a)-[r:loves]->(b) OPTIONAL MATCH (b)-[s:loves]->(c) RETURN a, b, c",
    );
    assert_eq!(rows, vec![vec![text("john"), text("mary"), Value::Null]]);
}

#[test]
fn where_clause_and_operators_filter_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = loaded_store(&dir);
    let rows = run(
        &store,
        "MATCH (a)-[r]->(b) WHERE a =~ '^jo.*' AND b <> 'mary' \
         RETURN DISTINCT a ORDER BY a",
    );
    assert_eq!(rows, vec![vec![text("joe")], vec![text("john")]]);

    let rows = run(
        &store,
        "MATCH (a)-[r]->(b) WHERE a STARTS WITH 'jo' AND r.label IN ['knows'] \
         RETURN DISTINCT a ORDER BY a",
    );
    assert_eq!(rows, vec![vec![text("joe")], vec![text("john")]]);
}

#[test]
fn aggregation_groups_by_plain_items() {
    let dir = tempfile::tempdir().unwrap();
    let store = loaded_store(&dir);
    let rows = run(
        &store,
        "MATCH (a)-[r:knows]->(b) RETURN b, count(a) ORDER BY b",
    );
    assert_eq!(
        rows,
        vec![
            vec![text("bob"), Value::Int(1)],
            vec![text("joe"), Value::Int(2)],
        ]
    );
}

#[test]
fn skip_and_limit_page_through_results() {
    let dir = tempfile::tempdir().unwrap();
    let store = loaded_store(&dir);
    let all = run(&store, "MATCH (a)-[r]->(b) RETURN a ORDER BY a, b");
    let page = run(&store, "MATCH (a)-[r]->(b) RETURN a ORDER BY a, b SKIP 1 LIMIT 2");
    assert_eq!(page, all[1..3].to_vec());
    let tail = run(&store, "MATCH (a)-[r]->(b) RETURN a ORDER BY a, b SKIP 3");
    assert_eq!(tail, all[3..].to_vec());
}

#[test]
fn parameters_bind_per_execution() {
    let dir = tempfile::tempdir().unwrap();
    let store = loaded_store(&dir);
    let mut query = GraphQuery::new(
        Arc::clone(&store),
        "MATCH (a)-[r]->(b) WHERE a = $WHO RETURN b ORDER BY b",
        false,
    );
    let mut params = FxHashMap::default();
    params.insert("WHO".to_string(), "john".to_string());
    assert_eq!(
        query.execute(&params).unwrap().to_vec(),
        vec![vec![text("joe")], vec![text("mary")]]
    );
    params.insert("WHO".to_string(), "joe".to_string());
    assert_eq!(
        query.execute(&params).unwrap().to_vec(),
        vec![vec![text("bob")]]
    );
    match query.execute(&FxHashMap::default()) {
        Err(QuiverError::Configuration(msg)) => assert!(msg.contains("WHO")),
        other => panic!("expected missing-parameter error, got {other:?}"),
    }
}

#[test]
fn cross_graph_join_uses_handles() {
    let dir = tempfile::tempdir().unwrap();
    let people = write_file(dir.path(), "people.tsv", EDGES);
    let places = write_file(
        dir.path(),
        "places.tsv",
        "node1\tlabel\tnode2\n\
         joe\tlives_in\tberlin\n\
         bob\tlives_in\tparis\n",
    );
    let mut store = SqlStore::open(dir.path().join("cache.db")).unwrap();
    store.add_graph(&people, Some("p"), &[], false).unwrap();
    store.add_graph(&places, Some("w"), &[], false).unwrap();
    let store = Arc::new(Mutex::new(store));
    let rows = run(
        &store,
        "MATCH p: (a)-[r:knows]->(b), w: (b)-[s:lives_in]->(city) \
         RETURN DISTINCT a, city ORDER BY a",
    );
    assert_eq!(
        rows,
        vec![
            vec![text("joe"), text("paris")],
            vec![text("john"), text("berlin")],
            vec![text("mary"), text("berlin")],
        ]
    );

    // Without a handle the reference is ambiguous.
    let mut query = GraphQuery::new(Arc::clone(&store), "MATCH (a)-[r]->(b) RETURN a", false);
    match query.execute(&FxHashMap::default()) {
        Err(QuiverError::UnsupportedPattern(msg)) => assert!(msg.contains("ambiguous")),
        other => panic!("expected ambiguity error, got {other:?}"),
    }
}

#[test]
fn pattern_predicate_in_where_filters_by_existence() {
    let dir = tempfile::tempdir().unwrap();
    let store = loaded_store(&dir);
    // Only people who know someone who knows someone else.
    let rows = run(
        &store,
        "MATCH (a)-[r:knows]->(b) WHERE (b)-[]->(c) RETURN DISTINCT a ORDER BY a",
    );
    assert_eq!(rows, vec![vec![text("john")], vec![text("mary")]]);
}

#[test]
fn property_map_restricts_and_case_projects() {
    let dir = tempfile::tempdir().unwrap();
    let store = loaded_store(&dir);
    let rows = run(
        &store,
        "MATCH (a)-[r {label: 'loves'}]->(b) \
         RETURN a, CASE b WHEN 'mary' THEN 'yes' ELSE 'no' END AS hit",
    );
    assert_eq!(rows, vec![vec![text("john"), text("yes")]]);
}

#[test]
fn result_cache_survives_until_the_store_changes() {
    let dir = tempfile::tempdir().unwrap();
    let edges = write_file(dir.path(), "edges.tsv", EDGES);
    let mut store = SqlStore::open(dir.path().join("cache.db")).unwrap();
    store.add_graph(&edges, None, &[], false).unwrap();
    let store = Arc::new(Mutex::new(store));
    let mut query =
        GraphQuery::new(Arc::clone(&store), "MATCH (a)-[r]->(b) RETURN a", false);
    let first = query.execute(&FxHashMap::default()).unwrap();
    let cached = query.execute(&FxHashMap::default()).unwrap();
    assert!(Arc::ptr_eq(&first, &cached));

    write_file(dir.path(), "edges.tsv", "node1\tlabel\tnode2\nx\ty\tz\n");
    store.lock().add_graph(&edges, None, &[], false).unwrap();
    let fresh = query.execute(&FxHashMap::default()).unwrap();
    assert_eq!(fresh.len(), 1);
}
