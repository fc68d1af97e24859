//! High-level query API: translate once, execute many.
//!
//! A [`GraphQuery`] owns the query text and lazily translates it
//! against the shared store. The translation is stamped with the
//! store's generation counter; any import or index change bumps the
//! counter and forces retranslation on the next use, so a cached plan
//! never runs against tables it was not planned for. Result sets are
//! memoized per distinct parameter binding in a small LRU cache.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::Result;
use crate::query::prepare;
use crate::store::{SqlStore, Value};
use crate::translate::{translate_query, TranslatedQuery};

const RESULT_CACHE_SIZE: usize = 100;

/// A reusable query bound to a shared store.
pub struct GraphQuery {
    store: Arc<Mutex<SqlStore>>,
    text: String,
    auto_index: bool,
    translated: Option<(u64, TranslatedQuery)>,
    results: LruCache<Vec<String>, Arc<Vec<Vec<Value>>>>,
}

impl GraphQuery {
    /// Creates a query over a shared store. With `auto_index` set,
    /// translation ensures indexes on the columns the query joins on.
    pub fn new(store: Arc<Mutex<SqlStore>>, text: impl Into<String>, auto_index: bool) -> GraphQuery {
        GraphQuery {
            store,
            text: text.into(),
            auto_index,
            translated: None,
            results: LruCache::new(NonZeroUsize::new(RESULT_CACHE_SIZE).unwrap()),
        }
    }

    /// The query text as given.
    pub fn text(&self) -> &str {
        &self.text
    }

    fn ensure_translated(&mut self) -> Result<&TranslatedQuery> {
        let mut store = self.store.lock();
        let current = store.generation();
        let stale = match &self.translated {
            Some((generation, _)) => *generation != current,
            None => true,
        };
        if stale {
            debug!(query = %self.text, "translating");
            let query = prepare(&self.text)?;
            let translated = translate_query(query, &mut store, self.auto_index)?;
            // Auto-indexing may have bumped the generation itself.
            let generation = store.generation();
            self.translated = Some((generation, translated));
            self.results.clear();
        }
        Ok(&self.translated.as_ref().unwrap().1)
    }

    /// The generated SQL for the current store state.
    pub fn sql(&mut self) -> Result<String> {
        Ok(self.ensure_translated()?.sql.clone())
    }

    /// Output column names in projection order.
    pub fn header(&mut self) -> Result<Vec<String>> {
        Ok(self.ensure_translated()?.header.clone())
    }

    /// Executes with the given parameter bindings. Repeated executions
    /// with equal bindings are served from the result cache until the
    /// store changes.
    pub fn execute(
        &mut self,
        params: &FxHashMap<String, String>,
    ) -> Result<Arc<Vec<Vec<Value>>>> {
        self.ensure_translated()?;
        let (_, translated) = self.translated.as_ref().unwrap();
        let bound = translated.bind(params)?;
        let key: Vec<String> = bound.iter().map(|value| value.render()).collect();
        if let Some(cached) = self.results.get(&key) {
            debug!(query = %self.text, "result cache hit");
            return Ok(Arc::clone(cached));
        }
        let rows = {
            let store = self.store.lock();
            store.execute(&translated.sql, &bound)?
        };
        let rows = Arc::new(rows);
        self.results.put(key, Arc::clone(&rows));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn shared_store(dir: &tempfile::TempDir) -> (Arc<Mutex<SqlStore>>, std::path::PathBuf) {
        let path = dir.path().join("edges.tsv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(
            b"node1\tlabel\tnode2\n\
              john\tloves\tjoe\n\
              joe\tknows\tmary\n",
        )
        .unwrap();
        let store = SqlStore::open(dir.path().join("cache.db")).unwrap();
        (Arc::new(Mutex::new(store)), path)
    }

    #[test]
    fn execute_returns_rows() {
        let dir = tempfile::tempdir().unwrap();
        let (store, edges) = shared_store(&dir);
        store.lock().add_graph(&edges, None, &[], false).unwrap();
        let mut query = GraphQuery::new(
            Arc::clone(&store),
            "MATCH (a)-[r:loves]->(b) RETURN a, b",
            false,
        );
        let rows = query.execute(&FxHashMap::default()).unwrap();
        assert_eq!(
            *rows,
            vec![vec![
                Value::Text("john".to_string()),
                Value::Text("joe".to_string())
            ]]
        );
        assert_eq!(query.header().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn repeat_execution_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (store, edges) = shared_store(&dir);
        store.lock().add_graph(&edges, None, &[], false).unwrap();
        let mut query =
            GraphQuery::new(Arc::clone(&store), "MATCH (a)-[r]->(b) RETURN a", false);
        let first = query.execute(&FxHashMap::default()).unwrap();
        let second = query.execute(&FxHashMap::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn store_change_invalidates_cached_plan() {
        let dir = tempfile::tempdir().unwrap();
        let (store, edges) = shared_store(&dir);
        store.lock().add_graph(&edges, None, &[], false).unwrap();
        let mut query =
            GraphQuery::new(Arc::clone(&store), "MATCH (a)-[r]->(b) RETURN a", false);
        let first = query.execute(&FxHashMap::default()).unwrap();
        assert_eq!(first.len(), 2);

        let mut file = std::fs::File::create(&edges).unwrap();
        file.write_all(
            b"node1\tlabel\tnode2\n\
              john\tloves\tjoe\n\
              joe\tknows\tmary\n\
              mary\tknows\tjohn\n",
        )
        .unwrap();
        store.lock().add_graph(&edges, None, &[], false).unwrap();
        let second = query.execute(&FxHashMap::default()).unwrap();
        assert_eq!(second.len(), 3);
    }

    #[test]
    fn distinct_bindings_get_distinct_results() {
        let dir = tempfile::tempdir().unwrap();
        let (store, edges) = shared_store(&dir);
        store.lock().add_graph(&edges, None, &[], false).unwrap();
        let mut query = GraphQuery::new(
            Arc::clone(&store),
            "MATCH (a)-[r]->(b) WHERE a = $WHO RETURN b",
            false,
        );
        let mut params = FxHashMap::default();
        params.insert("WHO".to_string(), "john".to_string());
        let johns = query.execute(&params).unwrap();
        params.insert("WHO".to_string(), "joe".to_string());
        let joes = query.execute(&params).unwrap();
        assert_eq!(*johns, vec![vec![Value::Text("joe".to_string())]]);
        assert_eq!(*joes, vec![vec![Value::Text("mary".to_string())]]);
    }
}
