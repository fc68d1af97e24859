//! SQL-backed graph store.
//!
//! Tab-separated edge files import into per-file `graph_<n>` tables,
//! tracked by two bookkeeping tables: `fileinfo` (source path, size,
//! modification time, owning graph) and `graphinfo` (table name, header,
//! row count, last access, encoded index descriptions). Re-importing a
//! file whose size and modification time are unchanged is a no-op, so
//! repeated invocations against the same cache are cheap.
//!
//! All data columns are TEXT; typed interpretation happens in queries.
//! Vector columns declared by index specs are the one exception: their
//! cells are re-encoded at import through the [`vector::VectorStore`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, OpenFlags, ToSql};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

use crate::error::{QuiverError, Result};
use crate::function::{load_vector_function, vector_function_name, VectorOp};
use crate::index::{indexes_for_table, TableIndex};

/// Vector column storage.
pub mod vector;

use vector::{VectorDtype, VectorStore};

/// One typed cell of a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary value (vector blobs).
    Blob(Vec<u8>),
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Int(v) => ToSqlOutput::from(*v),
            Value::Float(v) => ToSqlOutput::from(*v),
            Value::Text(v) => ToSqlOutput::from(v.as_str()),
            Value::Blob(v) => ToSqlOutput::from(v.as_slice()),
        })
    }
}

impl Value {
    fn from_sql_ref(value: ValueRef<'_>) -> Result<Value> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Int(v),
            ValueRef::Real(v) => Value::Float(v),
            ValueRef::Text(bytes) => Value::Text(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| QuiverError::Internal(format!("non-UTF-8 cell: {e}")))?,
            ),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        })
    }

    /// Renders the value the way result rows are printed.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Text(v) => v.clone(),
            Value::Blob(v) => format!("<{} bytes>", v.len()),
        }
    }
}

/// The SQL-backed store holding imported graphs and their indexes.
pub struct SqlStore {
    path: PathBuf,
    conn: Connection,
    vector: VectorStore,
    aliases: FxHashMap<String, String>,
    vector_fns: FxHashSet<String>,
    generation: u64,
}

fn sql_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl SqlStore {
    /// Opens (or creates) a graph cache at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<SqlStore> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| QuiverError::store_io(path.display().to_string(), e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS fileinfo (
                 file TEXT PRIMARY KEY,
                 size INTEGER,
                 modtime INTEGER,
                 graph TEXT
             );
             CREATE TABLE IF NOT EXISTS graphinfo (
                 name TEXT PRIMARY KEY,
                 header TEXT,
                 size INTEGER,
                 acctime INTEGER,
                 indexes TEXT
             );",
        )?;
        crate::function::load_into(&conn)?;
        debug!(path = %path.display(), "opened graph cache");
        let mut store = SqlStore {
            path,
            conn,
            vector: VectorStore::new(),
            aliases: FxHashMap::default(),
            vector_fns: FxHashSet::default(),
            generation: 0,
        };
        store.redeclare_vector_columns()?;
        Ok(store)
    }

    /// Database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Monotonic counter bumped by every import or index change;
    /// used to invalidate prepared-query caches.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // Vector declarations live in graphinfo via their encoded index
    // descriptions; reopening the cache restores them.
    fn redeclare_vector_columns(&mut self) -> Result<()> {
        let mut restored = Vec::new();
        {
            let mut stmt = self.conn.prepare("SELECT name, indexes FROM graphinfo")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let name: String = row.get(0)?;
                let encoded: Option<String> = row.get(1)?;
                for text in encoded.unwrap_or_default().split('\t') {
                    if text.is_empty() {
                        continue;
                    }
                    if let TableIndex::Vector(idx) = TableIndex::decode(text)? {
                        restored.push((name.clone(), idx));
                    }
                }
            }
        }
        for (table, idx) in restored {
            for column in &idx.columns {
                self.vector.declare(&table, column, &self.path)?;
            }
        }
        Ok(())
    }

    /// Registers an explicit handle for a graph table.
    pub fn register_alias(&mut self, alias: &str, table: &str) {
        self.aliases.insert(alias.to_string(), table.to_string());
    }

    /// Resolves a graph handle: an explicit alias, a source file name or
    /// stem, or a graph table name.
    pub fn table_for_handle(&self, handle: &str) -> Result<String> {
        if let Some(table) = self.aliases.get(handle) {
            return Ok(table.clone());
        }
        let mut stmt = self
            .conn
            .prepare("SELECT file, graph FROM fileinfo")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let file: String = row.get(0)?;
            let graph: String = row.get(1)?;
            if graph == handle {
                return Ok(graph);
            }
            let path = Path::new(&file);
            let matches_name = path
                .file_name()
                .map(|n| n.to_string_lossy() == handle)
                .unwrap_or(false)
                || path
                    .file_stem()
                    .map(|n| n.to_string_lossy() == handle)
                    .unwrap_or(false);
            if matches_name {
                return Ok(graph);
            }
        }
        Err(QuiverError::UnsupportedPattern(format!(
            "unknown graph handle '{handle}'"
        )))
    }

    /// All graph tables, oldest first.
    pub fn graph_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM graphinfo ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut tables = Vec::new();
        for table in rows {
            tables.push(table?);
        }
        Ok(tables)
    }

    /// The default table when the store holds exactly one graph.
    pub fn default_table(&self) -> Result<Option<String>> {
        let mut tables = self.graph_tables()?;
        if tables.len() == 1 {
            Ok(Some(tables.remove(0)))
        } else {
            Ok(None)
        }
    }

    /// Whether the given source file is already imported and current.
    pub fn has_graph(&self, file: impl AsRef<Path>) -> Result<bool> {
        let file = canonical(file.as_ref())?;
        let (size, modtime) = file_signature(&file)?;
        let found: Option<(i64, i64)> = self
            .conn
            .query_row(
                "SELECT size, modtime FROM fileinfo WHERE file = ?1",
                [file.display().to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(ignore_no_rows)?;
        Ok(matches!(found, Some((s, m)) if s == size && m == modtime))
    }

    /// Imports a tab-separated edge file, reusing the existing table if
    /// the file is unchanged. Index specs are applied after import;
    /// vector specs among them steer the import itself. Returns the
    /// graph table name.
    pub fn add_graph(
        &mut self,
        file: impl AsRef<Path>,
        alias: Option<&str>,
        index_specs: &[String],
        force: bool,
    ) -> Result<String> {
        let file = canonical(file.as_ref())?;
        let key = file.display().to_string();
        let (size, modtime) = file_signature(&file)?;

        let existing: Option<(i64, i64, String)> = self
            .conn
            .query_row(
                "SELECT size, modtime, graph FROM fileinfo WHERE file = ?1",
                [&key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map(Some)
            .or_else(ignore_no_rows)?;

        let table = match existing {
            Some((old_size, old_modtime, table))
                if !force && old_size == size && old_modtime == modtime =>
            {
                debug!(file = %key, table, "graph is up to date");
                self.touch(&table)?;
                table
            }
            Some((_, _, table)) => {
                info!(file = %key, table, "source file changed, re-importing");
                self.drop_graph(&table)?;
                self.import(&file, &key, size, modtime, index_specs)?
            }
            None => self.import(&file, &key, size, modtime, index_specs)?,
        };

        if let Some(alias) = alias {
            self.register_alias(alias, &table);
        }
        for spec in index_specs {
            for index in indexes_for_table(spec, &table)? {
                self.ensure_graph_index(&index)?;
            }
        }
        Ok(table)
    }

    fn next_table_name(&self) -> Result<String> {
        let max: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(CAST(SUBSTR(name, 7) AS INTEGER)), 0)
             FROM graphinfo WHERE name LIKE 'graph_%'",
            [],
            |row| row.get(0),
        )?;
        Ok(format!("graph_{}", max + 1))
    }

    fn import(
        &mut self,
        file: &Path,
        key: &str,
        size: i64,
        modtime: i64,
        index_specs: &[String],
    ) -> Result<String> {
        let table = self.next_table_name()?;
        let started = Instant::now();

        // Vector specs have to be known before rows stream in.
        for spec in index_specs {
            for index in indexes_for_table(spec, &table)? {
                if let TableIndex::Vector(idx) = index {
                    for column in &idx.columns {
                        self.vector.declare(&table, column, &self.path)?;
                    }
                }
            }
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .flexible(false)
            .from_path(file)?;
        let header: Vec<String> = reader
            .headers()?
            .iter()
            .map(|column| column.to_string())
            .collect();
        if header.is_empty() {
            return Err(QuiverError::store_io(key, "empty header line"));
        }

        let columns_ddl = header
            .iter()
            .map(|column| format!("{} TEXT", sql_ident(column)))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=header.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");

        let conn = &mut self.conn;
        let vstore = &mut self.vector;
        let tx = conn.transaction()?;
        tx.execute_batch(&format!(
            "CREATE TABLE {} ({columns_ddl})",
            sql_ident(&table)
        ))?;
        let mut rows: i64 = 0;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} VALUES ({placeholders})",
                sql_ident(&table)
            ))?;
            for record in reader.records() {
                let record = record?;
                if record.len() != header.len() {
                    return Err(QuiverError::store_io(
                        key,
                        format!(
                            "row {} has {} columns, header has {}",
                            rows + 2,
                            record.len(),
                            header.len()
                        ),
                    ));
                }
                let mut values: Vec<Value> = Vec::with_capacity(header.len());
                for (column, cell) in header.iter().zip(record.iter()) {
                    if vstore.is_declared(&table, column) {
                        match vstore.import_value(&table, column, cell)? {
                            Some(bytes) => values.push(Value::Blob(bytes)),
                            None => values.push(Value::Null),
                        }
                    } else {
                        values.push(Value::Text(cell.to_string()));
                    }
                }
                insert.execute(rusqlite::params_from_iter(values.iter()))?;
                rows += 1;
            }
        }
        let now = unix_seconds();
        tx.execute(
            "INSERT OR REPLACE INTO fileinfo (file, size, modtime, graph)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![key, size, modtime, table],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO graphinfo (name, header, size, acctime, indexes)
             VALUES (?1, ?2, ?3, ?4, '')",
            rusqlite::params![table, header.join("\t"), rows, now],
        )?;
        tx.commit()?;
        vstore.finish_import(&table)?;

        self.generation += 1;
        info!(
            file = %key,
            table,
            rows,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "imported graph"
        );
        Ok(table)
    }

    fn touch(&self, table: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE graphinfo SET acctime = ?1 WHERE name = ?2",
            rusqlite::params![unix_seconds(), table],
        )?;
        Ok(())
    }

    /// Drops a graph table together with its indexes and bookkeeping.
    pub fn drop_graph(&mut self, table: &str) -> Result<()> {
        for index in self.indexes_on(table)? {
            for statement in index.drop_statements() {
                self.conn.execute_batch(&statement)?;
            }
        }
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", sql_ident(table)))?;
        self.conn
            .execute("DELETE FROM graphinfo WHERE name = ?1", [table])?;
        self.conn
            .execute("DELETE FROM fileinfo WHERE graph = ?1", [table])?;
        self.generation += 1;
        Ok(())
    }

    /// Whether a graph table of this name exists.
    pub fn has_table(&self, table: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM graphinfo WHERE name = ?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Column names of a graph table, in source order.
    pub fn table_header(&self, table: &str) -> Result<Vec<String>> {
        let header: String = self
            .conn
            .query_row(
                "SELECT header FROM graphinfo WHERE name = ?1",
                [table],
                |row| row.get(0),
            )
            .map_err(|_| {
                QuiverError::Internal(format!("unknown graph table '{table}'"))
            })?;
        Ok(header.split('\t').map(|c| c.to_string()).collect())
    }

    /// Row count recorded at import time.
    pub fn table_row_count(&self, table: &str) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT size FROM graphinfo WHERE name = ?1",
            [table],
            |row| row.get(0),
        )?)
    }

    /// Index descriptions currently recorded for a table.
    pub fn indexes_on(&self, table: &str) -> Result<Vec<TableIndex>> {
        let encoded: Option<String> = self
            .conn
            .query_row(
                "SELECT indexes FROM graphinfo WHERE name = ?1",
                [table],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(ignore_no_rows)?
            .flatten();
        encoded
            .unwrap_or_default()
            .split('\t')
            .filter(|text| !text.is_empty())
            .map(TableIndex::decode)
            .collect()
    }

    fn save_indexes(&self, table: &str, indexes: &[TableIndex]) -> Result<()> {
        let encoded = indexes
            .iter()
            .map(|index| index.encode())
            .collect::<Vec<_>>()
            .join("\t");
        self.conn.execute(
            "UPDATE graphinfo SET indexes = ?1 WHERE name = ?2",
            rusqlite::params![encoded, table],
        )?;
        Ok(())
    }

    /// Ensures an index exists, honoring subsumption (an existing index
    /// covering the request is kept as-is) and redefinition (conflicting
    /// same-target indexes are dropped first).
    pub fn ensure_graph_index(&mut self, index: &TableIndex) -> Result<()> {
        let table = index.table().to_string();
        let mut existing = self.indexes_on(&table)?;
        if existing.iter().any(|old| old.subsumes(index)) {
            debug!(table, name = %index.get_name(), "index already covered");
            return Ok(());
        }
        let mut kept = Vec::with_capacity(existing.len());
        for old in existing.drain(..) {
            if index.redefines(&old) {
                info!(table, dropped = %old.get_name(), "dropping redefined index");
                for statement in old.drop_statements() {
                    self.conn.execute_batch(&statement)?;
                }
            } else {
                kept.push(old);
            }
        }

        if let TableIndex::Vector(idx) = index {
            for column in &idx.columns {
                if !self.vector.is_declared(&table, &column.name) {
                    self.vector.declare(&table, column, &self.path)?;
                }
            }
        }
        let started = Instant::now();
        for statement in index.create_statements() {
            debug!(sql = %statement, "creating index");
            self.conn.execute_batch(&statement)?;
        }
        info!(
            table,
            name = %index.get_name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index ensured"
        );

        kept.push(index.clone());
        self.save_indexes(&table, &kept)?;
        self.generation += 1;
        Ok(())
    }

    /// Drops indexes recorded on a table: all of them, or only the
    /// text indexes.
    pub fn clear_indexes(&mut self, table: &str, text_only: bool) -> Result<()> {
        let mut kept = Vec::new();
        for index in self.indexes_on(table)? {
            let drop = !text_only || matches!(index, TableIndex::Text(_));
            if drop {
                info!(table, name = %index.get_name(), "dropping index");
                for statement in index.drop_statements() {
                    self.conn.execute_batch(&statement)?;
                }
            } else {
                kept.push(index);
            }
        }
        self.save_indexes(table, &kept)?;
        self.generation += 1;
        Ok(())
    }

    /// Ensures standard indexes on the given columns of a table, used
    /// by auto-indexing to cover the joins of the current query.
    pub fn ensure_column_indexes(&mut self, table: &str, columns: &[String]) -> Result<()> {
        for column in columns {
            let index = TableIndex::Standard(crate::index::StandardIndex {
                table: table.to_string(),
                columns: vec![column.clone()],
                unique: false,
            });
            self.ensure_graph_index(&index)?;
        }
        Ok(())
    }

    /// Whether a vector column stores L2-normalized vectors.
    pub fn is_normalized_vector_column(&self, table: &str, column: &str) -> bool {
        self.vector.is_normalized(table, column)
    }

    /// Storage dtype of a declared vector column.
    pub fn vector_column_dtype(&self, table: &str, column: &str) -> Option<VectorDtype> {
        self.vector.dataset(table, column).map(|d| d.config.dtype)
    }

    /// Whether a declared vector column lives in an external flat file
    /// rather than inline blobs.
    pub fn vector_column_is_external(&self, table: &str, column: &str) -> bool {
        self.vector
            .dataset(table, column)
            .map(|d| d.config.storage == vector::VectorStorage::External)
            .unwrap_or(false)
    }

    /// Materializes the dtype-specialized vector function on this
    /// connection if needed and returns its name.
    pub fn ensure_vector_function(
        &mut self,
        op: VectorOp,
        dtypes: &[VectorDtype],
    ) -> Result<String> {
        let name = vector_function_name(op, dtypes);
        if !self.vector_fns.contains(&name) {
            load_vector_function(&self.conn, op, dtypes)?;
            self.vector_fns.insert(name.clone());
        }
        Ok(name)
    }

    /// Runs a translated query with positionally bound parameters.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        debug!(sql, params = params.len(), "executing query");
        let mut stmt = self.conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(Value::from_sql_ref(row.get_ref(i)?)?);
            }
            result.push(values);
        }
        Ok(result)
    }

    /// Column names a prepared statement will produce.
    pub fn result_header(&self, sql: &str) -> Result<Vec<String>> {
        let stmt = self.conn.prepare(sql)?;
        Ok(stmt
            .column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect())
    }
}

fn canonical(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path)
        .map_err(|e| QuiverError::store_io(path.display().to_string(), e.to_string()))
}

fn file_signature(path: &Path) -> Result<(i64, i64)> {
    let meta = fs::metadata(path)
        .map_err(|e| QuiverError::store_io(path.display().to_string(), e.to_string()))?;
    let modtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    Ok((meta.len() as i64, modtime))
}

fn unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn ignore_no_rows<T>(err: rusqlite::Error) -> std::result::Result<Option<T>, rusqlite::Error> {
    match err {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
    }
}
