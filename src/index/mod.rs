//! Graph table index descriptions.
//!
//! A [`TableIndex`] is a declarative description of one index on one
//! graph table. Descriptions encode to the short-form spec syntax (with
//! the owning table appended) so the store can persist them in its
//! bookkeeping tables and decode them back on the next run; the
//! `encode`/`decode` pair round-trips every variant exactly.
//!
//! Subsumption decides whether an existing index already covers a
//! requested one, so auto-indexing never stacks redundant indexes on a
//! table. Redefinition decides when a conflicting same-target index has
//! to be dropped before the new description is applied.

use crate::error::{QuiverError, Result};

/// Short-form spec parsing, macro modes, and the destructive-mode guard.
pub mod spec;

pub use spec::{
    expand_index_mode, parse_index_mode, parse_index_spec, IndexMode, IndexSpec, SpecFamily,
};

/// A standard B-tree column index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardIndex {
    /// Owning graph table.
    pub table: String,
    /// Indexed columns in order.
    pub columns: Vec<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

/// A full-text index backed by an external-content fts5 virtual table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextIndex {
    /// Owning graph table.
    pub table: String,
    /// Explicit index name, if one was given.
    pub name: Option<String>,
    /// Columns with their unindexed flag.
    pub columns: Vec<(String, bool)>,
    /// fts5 tokenizer setting.
    pub tokenize: Option<String>,
    /// fts5 prefix setting.
    pub prefix: Option<String>,
    /// Content table; defaults to the owning table.
    pub content: String,
    /// fts5 columnsize setting.
    pub columnsize: Option<String>,
    /// fts5 detail setting.
    pub detail: Option<String>,
}

/// A raw user-supplied index definition, applied verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlIndex {
    /// Owning graph table.
    pub table: String,
    /// Complete `CREATE INDEX ...` statement text.
    pub definition: String,
}

/// One vector column with its storage and search options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorColumn {
    /// Column holding the embeddings.
    pub name: String,
    /// Ordered `option -> value` pairs (fmt, dtype, norm, store, ...).
    pub options: Vec<(String, String)>,
}

impl VectorColumn {
    /// Looks up one option value.
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// An embedding-column vector index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorIndex {
    /// Owning graph table.
    pub table: String,
    /// Vector columns in declaration order.
    pub columns: Vec<VectorColumn>,
}

/// One index description on one graph table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableIndex {
    /// Standard column index.
    Standard(StandardIndex),
    /// Full-text index.
    Text(TextIndex),
    /// Verbatim SQL definition.
    Sql(SqlIndex),
    /// Vector index.
    Vector(VectorIndex),
}

impl TableIndex {
    /// Builds an index description from a parsed spec for a table.
    pub fn from_spec(spec: &IndexSpec, table: &str) -> Result<TableIndex> {
        match spec.family {
            SpecFamily::Standard => {
                let mut unique = false;
                for (key, _) in &spec.options {
                    match key.as_str() {
                        "unique" => unique = true,
                        other => {
                            return Err(QuiverError::Configuration(format!(
                                "unknown index option '{other}'"
                            )))
                        }
                    }
                }
                for column in &spec.columns {
                    if !column.options.is_empty() {
                        return Err(QuiverError::Configuration(format!(
                            "column '{}' of a standard index takes no options",
                            column.name
                        )));
                    }
                }
                Ok(TableIndex::Standard(StandardIndex {
                    table: table.to_string(),
                    columns: spec.columns.iter().map(|c| c.name.clone()).collect(),
                    unique,
                }))
            }
            SpecFamily::Text => {
                let mut index = TextIndex {
                    table: table.to_string(),
                    name: None,
                    columns: Vec::new(),
                    tokenize: None,
                    prefix: None,
                    content: table.to_string(),
                    columnsize: None,
                    detail: None,
                };
                for column in &spec.columns {
                    let mut unindexed = false;
                    for (key, _) in &column.options {
                        match key.as_str() {
                            "unindexed" => unindexed = true,
                            other => {
                                return Err(QuiverError::Configuration(format!(
                                    "unknown text index column option '{other}'"
                                )))
                            }
                        }
                    }
                    index.columns.push((column.name.clone(), unindexed));
                }
                for (key, value) in &spec.options {
                    match key.as_str() {
                        "name" => index.name = Some(value.clone()),
                        "tokenize" => index.tokenize = Some(value.clone()),
                        "prefix" => index.prefix = Some(value.clone()),
                        "content" => index.content = value.clone(),
                        "columnsize" => index.columnsize = Some(value.clone()),
                        "detail" => index.detail = Some(value.clone()),
                        other => {
                            return Err(QuiverError::Configuration(format!(
                                "unknown text index option '{other}'"
                            )))
                        }
                    }
                }
                Ok(TableIndex::Text(index))
            }
            SpecFamily::Sql => {
                let definition = spec.definition.clone().ok_or_else(|| {
                    QuiverError::Configuration("sql index spec without a definition".into())
                })?;
                Ok(TableIndex::Sql(SqlIndex {
                    table: table.to_string(),
                    definition,
                }))
            }
            SpecFamily::Vector => {
                let mut columns = Vec::new();
                for column in &spec.columns {
                    // Global options fold into each column unless it
                    // sets the same option itself.
                    let mut options = column.options.clone();
                    for (key, value) in &spec.options {
                        if !options.iter().any(|(k, _)| k == key) {
                            options.push((key.clone(), value.clone()));
                        }
                    }
                    columns.push(VectorColumn {
                        name: column.name.clone(),
                        options,
                    });
                }
                Ok(TableIndex::Vector(VectorIndex {
                    table: table.to_string(),
                    columns,
                }))
            }
        }
    }

    /// The graph table this index belongs to.
    pub fn table(&self) -> &str {
        match self {
            TableIndex::Standard(idx) => &idx.table,
            TableIndex::Text(idx) => &idx.table,
            TableIndex::Sql(idx) => &idx.table,
            TableIndex::Vector(idx) => &idx.table,
        }
    }

    /// The SQL-level object name this index creates.
    pub fn get_name(&self) -> String {
        match self {
            TableIndex::Standard(idx) => {
                format!("{}_{}_idx", idx.table, idx.columns.join("_"))
            }
            TableIndex::Text(idx) => idx
                .name
                .clone()
                .unwrap_or_else(|| format!("{}_txtidx", idx.table)),
            TableIndex::Sql(idx) => {
                extract_index_name(&idx.definition)
                    .unwrap_or_else(|| format!("{}_sqlidx", idx.table))
            }
            TableIndex::Vector(idx) => {
                let columns: Vec<&str> =
                    idx.columns.iter().map(|c| c.name.as_str()).collect();
                format!("{}_{}_vecidx", idx.table, columns.join("_"))
            }
        }
    }

    /// Serializes the description to `spec@table` form.
    pub fn encode(&self) -> String {
        let spec = match self {
            TableIndex::Standard(idx) => {
                let mut text = format!(
                    "index:{}",
                    idx.columns
                        .iter()
                        .map(|c| quote_name(c))
                        .collect::<Vec<_>>()
                        .join(",")
                );
                if idx.unique {
                    text.push_str("//unique");
                }
                text
            }
            TableIndex::Text(idx) => {
                let mut text = format!(
                    "text:{}",
                    idx.columns
                        .iter()
                        .map(|(name, unindexed)| {
                            if *unindexed {
                                format!("{}/unindexed", quote_name(name))
                            } else {
                                quote_name(name)
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(",")
                );
                if let Some(name) = &idx.name {
                    text.push_str(&format!("//name={}", quote_name(name)));
                }
                if let Some(tokenize) = &idx.tokenize {
                    text.push_str(&format!("//tokenize={}", quote_name(tokenize)));
                }
                if let Some(prefix) = &idx.prefix {
                    text.push_str(&format!("//prefix={}", quote_name(prefix)));
                }
                text.push_str(&format!("//content={}", quote_name(&idx.content)));
                if let Some(columnsize) = &idx.columnsize {
                    text.push_str(&format!("//columnsize={}", quote_name(columnsize)));
                }
                if let Some(detail) = &idx.detail {
                    text.push_str(&format!("//detail={}", quote_name(detail)));
                }
                text
            }
            TableIndex::Sql(idx) => format!("sql:{}", idx.definition),
            TableIndex::Vector(idx) => {
                let columns = idx
                    .columns
                    .iter()
                    .map(|column| {
                        let mut text = quote_name(&column.name);
                        for (key, value) in &column.options {
                            if value == "true" {
                                text.push_str(&format!("/{key}"));
                            } else {
                                text.push_str(&format!("/{key}={}", quote_name(value)));
                            }
                        }
                        text
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                format!("vector:{columns}")
            }
        };
        format!("{spec}@{}", self.table())
    }

    /// Reconstructs a description serialized by [`TableIndex::encode`].
    pub fn decode(text: &str) -> Result<TableIndex> {
        let (spec_text, table) = text.rsplit_once('@').ok_or_else(|| {
            QuiverError::Configuration(format!("malformed encoded index '{text}'"))
        })?;
        // `sql:` definitions pass through unparsed, like at entry.
        let spec = parse_index_spec(spec_text)?;
        TableIndex::from_spec(&spec, table)
    }

    /// Whether this existing index already covers `other`.
    ///
    /// Requires the same family and table; column lists are compared by
    /// the prefix rule, so an index on `(node1, label)` covers a request
    /// for `(node1)` alone.
    pub fn subsumes(&self, other: &TableIndex) -> bool {
        if self.table() != other.table() {
            return false;
        }
        match (self, other) {
            (TableIndex::Standard(a), TableIndex::Standard(b)) => {
                if b.unique && !(a.unique && a.columns == b.columns) {
                    return false;
                }
                is_prefix(&b.columns, &a.columns)
            }
            (TableIndex::Text(a), TableIndex::Text(b)) => {
                let a_cols: Vec<&String> =
                    a.columns.iter().filter(|(_, u)| !u).map(|(n, _)| n).collect();
                let b_cols: Vec<&String> =
                    b.columns.iter().filter(|(_, u)| !u).map(|(n, _)| n).collect();
                a.tokenize == b.tokenize
                    && b_cols.len() <= a_cols.len()
                    && a_cols[..b_cols.len()] == b_cols[..]
            }
            (TableIndex::Sql(a), TableIndex::Sql(b)) => a.definition == b.definition,
            (TableIndex::Vector(a), TableIndex::Vector(b)) => {
                b.columns.len() <= a.columns.len()
                    && a.columns[..b.columns.len()] == b.columns[..]
            }
            _ => false,
        }
    }

    /// Whether applying this description requires dropping `other`
    /// first: same-named text indexes and vector indexes sharing a
    /// column target the same object and cannot coexist.
    pub fn redefines(&self, other: &TableIndex) -> bool {
        if self.table() != other.table() || self.subsumes(other) {
            return false;
        }
        match (self, other) {
            (TableIndex::Text(_), TableIndex::Text(_)) => {
                self.get_name() == other.get_name()
            }
            (TableIndex::Vector(a), TableIndex::Vector(b)) => a
                .columns
                .iter()
                .any(|ca| b.columns.iter().any(|cb| ca.name == cb.name)),
            _ => false,
        }
    }

    /// SQL statements that create this index. Vector indexes produce no
    /// SQL; their storage is managed by the vector store.
    pub fn create_statements(&self) -> Vec<String> {
        match self {
            TableIndex::Standard(idx) => {
                let unique = if idx.unique { "UNIQUE " } else { "" };
                let columns = idx
                    .columns
                    .iter()
                    .map(|c| sql_ident(c))
                    .collect::<Vec<_>>()
                    .join(", ");
                vec![format!(
                    "CREATE {unique}INDEX IF NOT EXISTS {} ON {} ({columns})",
                    sql_ident(&self.get_name()),
                    sql_ident(&idx.table)
                )]
            }
            TableIndex::Text(idx) => {
                let name = self.get_name();
                let mut args: Vec<String> = idx
                    .columns
                    .iter()
                    .map(|(column, unindexed)| {
                        if *unindexed {
                            format!("{} UNINDEXED", sql_ident(column))
                        } else {
                            sql_ident(column)
                        }
                    })
                    .collect();
                args.push(format!("content={}", sql_ident(&idx.content)));
                if let Some(tokenize) = &idx.tokenize {
                    args.push(format!("tokenize=\"{tokenize}\""));
                }
                if let Some(prefix) = &idx.prefix {
                    args.push(format!("prefix=\"{prefix}\""));
                }
                if let Some(columnsize) = &idx.columnsize {
                    args.push(format!("columnsize={columnsize}"));
                }
                if let Some(detail) = &idx.detail {
                    args.push(format!("detail={detail}"));
                }
                vec![
                    format!(
                        "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5({})",
                        sql_ident(&name),
                        args.join(", ")
                    ),
                    // External-content tables index nothing until told to.
                    format!(
                        "INSERT INTO {}({}) VALUES ('rebuild')",
                        sql_ident(&name),
                        sql_ident(&name)
                    ),
                ]
            }
            TableIndex::Sql(idx) => vec![idx.definition.clone()],
            TableIndex::Vector(_) => Vec::new(),
        }
    }

    /// SQL statements that drop this index.
    pub fn drop_statements(&self) -> Vec<String> {
        match self {
            TableIndex::Standard(_) | TableIndex::Sql(_) => vec![format!(
                "DROP INDEX IF EXISTS {}",
                sql_ident(&self.get_name())
            )],
            TableIndex::Text(_) => vec![format!(
                "DROP TABLE IF EXISTS {}",
                sql_ident(&self.get_name())
            )],
            TableIndex::Vector(_) => Vec::new(),
        }
    }
}

/// Builds the index descriptions one spec contributes to a table,
/// resolving macro-mode names to their concrete spec lists.
pub fn indexes_for_table(spec_text: &str, table: &str) -> Result<Vec<TableIndex>> {
    match parse_index_mode(spec_text)? {
        IndexMode::Specs(specs) => specs
            .iter()
            .map(|spec| TableIndex::from_spec(spec, table))
            .collect(),
        other => Err(QuiverError::Configuration(format!(
            "expected index specs for table '{table}', got mode {other:?}"
        ))),
    }
}

fn is_prefix(shorter: &[String], longer: &[String]) -> bool {
    shorter.len() <= longer.len() && longer[..shorter.len()] == shorter[..]
}

fn quote_name(name: &str) -> String {
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

fn sql_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Pulls the index name out of a `CREATE [UNIQUE] INDEX [IF NOT EXISTS]
/// name ON ...` definition.
fn extract_index_name(definition: &str) -> Option<String> {
    let mut words = definition.split_whitespace().peekable();
    while let Some(word) = words.next() {
        if word.eq_ignore_ascii_case("index") {
            let mut name = words.next()?;
            if name.eq_ignore_ascii_case("if") {
                // Skip NOT EXISTS.
                words.next()?;
                words.next()?;
                name = words.next()?;
            }
            return Some(name.trim_matches('"').trim_matches('`').to_string());
        }
    }
    None
}
