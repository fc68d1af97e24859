//! Graph cache import behavior: change detection, handles, indexes.

use std::fs;
use std::path::{Path, PathBuf};

use quiver::store::Value;
use quiver::{SqlStore, TableIndex};

fn write_file(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

const EDGES: &str = "node1\tlabel\tnode2\n\
                     john\tloves\tjoe\n\
                     joe\tknows\tmary\n";

#[test]
fn import_then_query_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let edges = write_file(dir.path(), "edges.tsv", EDGES);
    let mut store = SqlStore::open(dir.path().join("cache.db")).unwrap();
    let table = store.add_graph(&edges, None, &[], false).unwrap();
    assert_eq!(table, "graph_1");
    assert_eq!(
        store.table_header(&table).unwrap(),
        vec!["node1", "label", "node2"]
    );
    let rows = store
        .execute(
            &format!("SELECT node1, node2 FROM {table} WHERE label = ?1"),
            &[Value::Text("loves".to_string())],
        )
        .unwrap();
    assert_eq!(
        rows,
        vec![vec![
            Value::Text("john".to_string()),
            Value::Text("joe".to_string())
        ]]
    );
}

#[test]
fn unchanged_reimport_is_skipped_and_changed_is_not() {
    let dir = tempfile::tempdir().unwrap();
    let edges = write_file(dir.path(), "edges.tsv", EDGES);
    let mut store = SqlStore::open(dir.path().join("cache.db")).unwrap();
    store.add_graph(&edges, None, &[], false).unwrap();
    assert!(store.has_graph(&edges).unwrap());
    let generation = store.generation();

    store.add_graph(&edges, None, &[], false).unwrap();
    assert_eq!(store.generation(), generation);

    let edges = write_file(
        dir.path(),
        "edges.tsv",
        "node1\tlabel\tnode2\njohn\tloves\tjoe\n",
    );
    let table = store.add_graph(&edges, None, &[], false).unwrap();
    assert!(store.generation() > generation);
    assert_eq!(store.table_row_count(&table).unwrap(), 1);
}

#[test]
fn force_reimports_an_unchanged_file() {
    let dir = tempfile::tempdir().unwrap();
    let edges = write_file(dir.path(), "edges.tsv", EDGES);
    let mut store = SqlStore::open(dir.path().join("cache.db")).unwrap();
    store.add_graph(&edges, None, &[], false).unwrap();
    let generation = store.generation();
    store.add_graph(&edges, None, &[], true).unwrap();
    assert!(store.generation() > generation);
}

#[test]
fn second_file_gets_the_next_table_number() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_file(dir.path(), "a.tsv", EDGES);
    let second = write_file(dir.path(), "b.tsv", EDGES);
    let mut store = SqlStore::open(dir.path().join("cache.db")).unwrap();
    assert_eq!(store.add_graph(&first, None, &[], false).unwrap(), "graph_1");
    assert_eq!(store.add_graph(&second, None, &[], false).unwrap(), "graph_2");
    assert!(store.default_table().unwrap().is_none());
}

#[test]
fn handles_resolve_aliases_and_file_names() {
    let dir = tempfile::tempdir().unwrap();
    let edges = write_file(dir.path(), "friends.tsv", EDGES);
    let mut store = SqlStore::open(dir.path().join("cache.db")).unwrap();
    let table = store.add_graph(&edges, Some("f"), &[], false).unwrap();
    for handle in ["f", "friends", "friends.tsv", "graph_1"] {
        assert_eq!(store.table_for_handle(handle).unwrap(), table, "{handle}");
    }
}

#[test]
fn index_specs_at_import_are_recorded_and_subsumed() {
    let dir = tempfile::tempdir().unwrap();
    let edges = write_file(dir.path(), "edges.tsv", EDGES);
    let mut store = SqlStore::open(dir.path().join("cache.db")).unwrap();
    let table = store
        .add_graph(&edges, None, &["mode:graph".to_string()], false)
        .unwrap();
    let recorded = store.indexes_on(&table).unwrap();
    assert_eq!(recorded.len(), 3);
    // The narrow request is already covered; the record is unchanged.
    store
        .ensure_graph_index(&TableIndex::decode("index:node1@graph_1").unwrap())
        .unwrap();
    assert_eq!(store.indexes_on(&table).unwrap(), recorded);
}

#[test]
fn clear_indexes_drops_everything_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let edges = write_file(dir.path(), "edges.tsv", EDGES);
    let mut store = SqlStore::open(dir.path().join("cache.db")).unwrap();
    let table = store
        .add_graph(&edges, None, &["mode:triple".to_string()], false)
        .unwrap();
    assert_eq!(store.indexes_on(&table).unwrap().len(), 3);
    store.clear_indexes(&table, false).unwrap();
    assert!(store.indexes_on(&table).unwrap().is_empty());
}

#[test]
fn dropping_a_graph_removes_its_bookkeeping() {
    let dir = tempfile::tempdir().unwrap();
    let edges = write_file(dir.path(), "edges.tsv", EDGES);
    let mut store = SqlStore::open(dir.path().join("cache.db")).unwrap();
    let table = store.add_graph(&edges, None, &[], false).unwrap();
    assert!(store.has_table(&table).unwrap());
    store.drop_graph(&table).unwrap();
    assert!(!store.has_table(&table).unwrap());
    assert!(store.table_header(&table).is_err());
    assert!(!store.has_graph(&edges).unwrap());
}

#[test]
fn reopened_cache_still_knows_its_graphs() {
    let dir = tempfile::tempdir().unwrap();
    let edges = write_file(dir.path(), "edges.tsv", EDGES);
    let cache = dir.path().join("cache.db");
    {
        let mut store = SqlStore::open(&cache).unwrap();
        store.add_graph(&edges, None, &[], false).unwrap();
    }
    let store = SqlStore::open(&cache).unwrap();
    assert!(store.has_graph(&edges).unwrap());
    assert_eq!(store.graph_tables().unwrap(), vec!["graph_1"]);
}
