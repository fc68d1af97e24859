//! Binary entry point for the quiver query CLI.
#![forbid(unsafe_code)]

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing_subscriber::EnvFilter;

use quiver::error::{QuiverError, Result};
use quiver::index::{parse_index_mode, IndexMode};
use quiver::{GraphQuery, SqlStore};

#[derive(Parser, Debug)]
#[command(
    name = "quiver",
    version,
    about = "Graph-pattern queries over tabular edge files",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        short = 'i',
        long = "input",
        value_name = "FILE[:ALIAS]",
        required = true,
        help = "Edge file to import (repeatable); an optional alias names it in queries"
    )]
    inputs: Vec<String>,

    #[arg(long, value_name = "QUERY", help = "Complete query text")]
    query: Option<String>,

    #[arg(
        long = "match",
        value_name = "PATTERN",
        help = "MATCH clause body (alternative to --query)"
    )]
    match_clause: Option<String>,

    #[arg(long = "where", value_name = "EXPR", help = "WHERE clause body")]
    where_clause: Option<String>,

    #[arg(
        long = "return",
        value_name = "ITEMS",
        default_value = "*",
        help = "RETURN clause body"
    )]
    return_clause: String,

    #[arg(long = "order-by", value_name = "KEYS", help = "ORDER BY keys")]
    order_by: Option<String>,

    #[arg(long, value_name = "N", help = "Rows to skip")]
    skip: Option<u64>,

    #[arg(long, value_name = "N", help = "Maximum rows to return")]
    limit: Option<u64>,

    #[arg(
        long,
        value_name = "SPEC",
        help = "Index spec or mode applied to the inputs (repeatable)"
    )]
    index: Vec<String>,

    #[arg(
        long,
        value_name = "NAME=VALUE",
        help = "Query parameter binding (repeatable)"
    )]
    parameter: Vec<String>,

    #[arg(
        long,
        value_name = "FILE",
        default_value = "graph-cache.sqlite3.db",
        help = "Graph cache database file"
    )]
    graph_cache: PathBuf,

    #[arg(long, help = "Re-import inputs even if they look unchanged")]
    force: bool,

    #[arg(long, help = "Print the translated SQL before executing")]
    show_sql: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("quiver: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut store = SqlStore::open(&cli.graph_cache)?;

    // Operational modes steer auto-indexing; spec modes travel with the
    // imports; destructive modes execute after imports resolve handles.
    let mut auto_index = true;
    let mut specs = Vec::new();
    let mut clears = Vec::new();
    for text in &cli.index {
        match parse_index_mode(text)? {
            IndexMode::None | IndexMode::Expert => auto_index = false,
            IndexMode::Auto | IndexMode::AutoText => auto_index = true,
            IndexMode::Clear { graph } => clears.push((graph, false)),
            IndexMode::ClearText { graph } => clears.push((graph, true)),
            IndexMode::Specs(_) => specs.push(text.clone()),
        }
    }

    for input in &cli.inputs {
        let (file, alias) = split_input(input);
        store.add_graph(file, alias, &specs, cli.force)?;
    }
    for (graph, text_only) in clears {
        let table = store.table_for_handle(&graph)?;
        store.clear_indexes(&table, text_only)?;
    }

    let text = match (&cli.query, &cli.match_clause) {
        (Some(query), None) => query.clone(),
        (None, Some(pattern)) => {
            let mut text = format!("MATCH {pattern}");
            if let Some(filter) = &cli.where_clause {
                text.push_str(&format!(" WHERE {filter}"));
            }
            text.push_str(&format!(" RETURN {}", cli.return_clause));
            if let Some(keys) = &cli.order_by {
                text.push_str(&format!(" ORDER BY {keys}"));
            }
            if let Some(skip) = cli.skip {
                text.push_str(&format!(" SKIP {skip}"));
            }
            if let Some(limit) = cli.limit {
                text.push_str(&format!(" LIMIT {limit}"));
            }
            text
        }
        (Some(_), Some(_)) => {
            return Err(QuiverError::Configuration(
                "--query and --match are mutually exclusive".into(),
            ))
        }
        (None, None) => {
            return Err(QuiverError::Configuration(
                "one of --query or --match is required".into(),
            ))
        }
    };

    let mut params = FxHashMap::default();
    for binding in &cli.parameter {
        let (name, value) = binding.split_once('=').ok_or_else(|| {
            QuiverError::Configuration(format!(
                "parameter binding '{binding}' is not NAME=VALUE"
            ))
        })?;
        params.insert(name.to_string(), value.to_string());
    }

    let store = Arc::new(Mutex::new(store));
    let mut query = GraphQuery::new(store, text, auto_index);
    if cli.show_sql {
        eprintln!("{}", query.sql()?);
    }
    let header = query.header()?;
    let rows = query.execute(&params)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = write_tsv(&mut out, &header, &rows);
    match result {
        // A closed pipe (e.g. piping into head) is not an error.
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other.map_err(QuiverError::from),
    }
}

fn split_input(input: &str) -> (&str, Option<&str>) {
    match input.rsplit_once(':') {
        // Keep Windows-style drive prefixes and bare paths intact.
        Some((file, alias)) if !alias.is_empty() && !alias.contains('/') && file.len() > 1 => {
            (file, Some(alias))
        }
        _ => (input, None),
    }
}

fn write_tsv(
    out: &mut impl Write,
    header: &[String],
    rows: &[Vec<quiver::Value>],
) -> io::Result<()> {
    writeln!(out, "{}", header.join("\t"))?;
    for row in rows {
        let rendered: Vec<String> = row.iter().map(|value| value.render()).collect();
        writeln!(out, "{}", rendered.join("\t"))?;
    }
    out.flush()
}
