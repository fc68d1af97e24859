//! Query function registry.
//!
//! One process-wide registry maps case-insensitive function names to
//! their definitions: kind, arity bounds, determinism, and the rewrite
//! the translator applies at call sites. Most functions pass through to
//! the SQL engine untouched; a few need special argument handling
//! (`cast`, `likelihood`) and the vector similarity functions dispatch
//! to dtype-specialized implementations (see [`vector`]).
//!
//! Callers can [`register`] additional functions before running
//! queries; redefining an existing name replaces it.

use std::sync::OnceLock;

use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use rustc_hash::FxHashMap;

use crate::error::{QuiverError, Result};

/// Dtype-specialized vector similarity functions.
pub mod vector;

pub use vector::{function_name as vector_function_name, load_vector_function, VectorOp};

/// What a registered function is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Scalar function the SQL engine provides.
    Builtin,
    /// Aggregate function; legal with `DISTINCT` and (for count) `*`.
    Aggregate,
    /// Scalar function this crate implements and loads.
    Scalar,
    /// Table-valued function; declarable but not callable in a
    /// translated query.
    TableValued,
}

/// How the translator renders a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRewrite {
    /// `name(arg, ...)` with every argument translated normally.
    Passthrough,
    /// `CAST(arg AS type)`; the type operand is spliced in verbatim,
    /// never parameterized.
    Cast,
    /// `LIKELIHOOD(arg, prob)`; the probability operand is spliced in
    /// verbatim, never parameterized.
    Likelihood,
    /// Dispatch to a dtype-specialized vector function.
    VectorSimilarity(VectorOp),
}

/// One registered function.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    /// Canonical lower-case name.
    pub name: String,
    /// Function kind.
    pub kind: FunctionKind,
    /// Minimum argument count.
    pub min_args: usize,
    /// Maximum argument count; `None` means unbounded.
    pub max_args: Option<usize>,
    /// Whether equal inputs always produce equal outputs.
    pub deterministic: bool,
    /// Call-site rewrite.
    pub rewrite: CallRewrite,
}

impl FunctionDef {
    fn new(
        name: &str,
        kind: FunctionKind,
        min_args: usize,
        max_args: Option<usize>,
    ) -> FunctionDef {
        FunctionDef {
            name: name.to_string(),
            kind,
            min_args,
            max_args,
            deterministic: true,
            rewrite: CallRewrite::Passthrough,
        }
    }

    fn rewrite(mut self, rewrite: CallRewrite) -> FunctionDef {
        self.rewrite = rewrite;
        self
    }

    fn nondeterministic(mut self) -> FunctionDef {
        self.deterministic = false;
        self
    }

    /// Validates an argument count against the declared bounds.
    pub fn check_arity(&self, count: usize) -> Result<()> {
        let ok = count >= self.min_args
            && self.max_args.map(|max| count <= max).unwrap_or(true);
        if ok {
            Ok(())
        } else {
            Err(QuiverError::UnsupportedPattern(format!(
                "function '{}' called with {count} arguments, expects {}{}",
                self.name,
                self.min_args,
                match self.max_args {
                    Some(max) if max == self.min_args => String::new(),
                    Some(max) => format!(" to {max}"),
                    None => " or more".to_string(),
                }
            )))
        }
    }
}

fn registry() -> &'static Mutex<FxHashMap<String, FunctionDef>> {
    static REGISTRY: OnceLock<Mutex<FxHashMap<String, FunctionDef>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(default_functions()))
}

fn default_functions() -> FxHashMap<String, FunctionDef> {
    use FunctionKind::*;
    let defs = vec![
        // SQL aggregates.
        FunctionDef::new("count", Aggregate, 0, Some(1)),
        FunctionDef::new("sum", Aggregate, 1, Some(1)),
        FunctionDef::new("avg", Aggregate, 1, Some(1)),
        FunctionDef::new("min", Aggregate, 1, Some(1)),
        FunctionDef::new("max", Aggregate, 1, Some(1)),
        FunctionDef::new("group_concat", Aggregate, 1, Some(2)),
        // SQL scalar builtins.
        FunctionDef::new("upper", Builtin, 1, Some(1)),
        FunctionDef::new("lower", Builtin, 1, Some(1)),
        FunctionDef::new("length", Builtin, 1, Some(1)),
        FunctionDef::new("substr", Builtin, 2, Some(3)),
        FunctionDef::new("replace", Builtin, 3, Some(3)),
        FunctionDef::new("instr", Builtin, 2, Some(2)),
        FunctionDef::new("printf", Builtin, 1, None),
        FunctionDef::new("abs", Builtin, 1, Some(1)),
        FunctionDef::new("round", Builtin, 1, Some(2)),
        FunctionDef::new("coalesce", Builtin, 2, None),
        FunctionDef::new("ifnull", Builtin, 2, Some(2)),
        FunctionDef::new("nullif", Builtin, 2, Some(2)),
        FunctionDef::new("typeof", Builtin, 1, Some(1)),
        FunctionDef::new("random", Builtin, 0, Some(0)).nondeterministic(),
        // Special argument handling.
        FunctionDef::new("cast", Builtin, 2, Some(2)).rewrite(CallRewrite::Cast),
        FunctionDef::new("likelihood", Builtin, 2, Some(2))
            .rewrite(CallRewrite::Likelihood),
        // Crate-provided scalars.
        FunctionDef::new("power", Scalar, 2, Some(2)),
        FunctionDef::new("regexp", Scalar, 2, Some(2)),
        // Literal-format predicates and accessors over edge-file cells.
        FunctionDef::new("kgtk_string", Scalar, 1, Some(1)),
        FunctionDef::new("kgtk_lqstring", Scalar, 1, Some(1)),
        FunctionDef::new("kgtk_number", Scalar, 1, Some(1)),
        FunctionDef::new("kgtk_text", Scalar, 1, Some(1)),
        // Vector similarity.
        FunctionDef::new("kvec_dot", Scalar, 2, Some(2))
            .rewrite(CallRewrite::VectorSimilarity(VectorOp::Dot)),
        FunctionDef::new("kvec_cos_sim", Scalar, 2, Some(2))
            .rewrite(CallRewrite::VectorSimilarity(VectorOp::CosSim)),
        FunctionDef::new("kvec_l2_norm", Scalar, 1, Some(1))
            .rewrite(CallRewrite::VectorSimilarity(VectorOp::L2Norm)),
        FunctionDef::new("kvec_euclidean", Scalar, 2, Some(2))
            .rewrite(CallRewrite::VectorSimilarity(VectorOp::Euclidean)),
    ];
    defs.into_iter().map(|def| (def.name.clone(), def)).collect()
}

/// Looks up a function by name, case-insensitively.
pub fn get_function(name: &str) -> Result<FunctionDef> {
    registry()
        .lock()
        .get(&name.to_ascii_lowercase())
        .cloned()
        .ok_or_else(|| QuiverError::UnknownFunction(name.to_string()))
}

/// Registers (or replaces) a function definition.
pub fn register(def: FunctionDef) {
    let mut def = def;
    def.name = def.name.to_ascii_lowercase();
    registry().lock().insert(def.name.clone(), def);
}

/// Loads the crate-implemented scalar functions into a connection.
/// Vector similarity functions are not loaded here; they materialize
/// per dtype combination on first use.
pub fn load_into(conn: &Connection) -> Result<()> {
    let deterministic = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
    conn.create_scalar_function("power", 2, deterministic, |ctx| {
        let base: f64 = ctx.get(0)?;
        let exponent: f64 = ctx.get(1)?;
        Ok(base.powf(exponent))
    })?;
    // Backs both regexp(pattern, value) calls and the =~ operator.
    conn.create_scalar_function("regexp", 2, deterministic, |ctx| {
        let pattern: String = ctx.get(0)?;
        let value: String = ctx.get(1)?;
        let re = regex::Regex::new(&pattern).map_err(|e| {
            rusqlite::Error::UserFunctionError(format!("bad regex: {e}").into())
        })?;
        Ok(re.is_match(&value))
    })?;
    // Literal-format predicates: edge-file cells encode typed literals
    // syntactically. Double-quoted cells are plain strings, single-quoted
    // cells with an @lang suffix are language-qualified strings, and
    // anything numeric parses as a number.
    conn.create_scalar_function("kgtk_string", 1, deterministic, |ctx| {
        let value: String = ctx.get(0)?;
        Ok(value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
    })?;
    conn.create_scalar_function("kgtk_lqstring", 1, deterministic, |ctx| {
        let value: String = ctx.get(0)?;
        Ok(is_lq_string(&value))
    })?;
    conn.create_scalar_function("kgtk_number", 1, deterministic, |ctx| {
        let value: String = ctx.get(0)?;
        Ok(value.parse::<f64>().is_ok())
    })?;
    // Accessor: the text content of a string literal, quotes stripped
    // and the language tag dropped; non-literals pass through as-is.
    conn.create_scalar_function("kgtk_text", 1, deterministic, |ctx| {
        let value: String = ctx.get(0)?;
        if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
            return Ok(value[1..value.len() - 1].to_string());
        }
        if is_lq_string(&value) {
            let body = &value[..value.rfind('@').unwrap_or(value.len())];
            return Ok(body[1..body.len() - 1].to_string());
        }
        Ok(value)
    })?;
    Ok(())
}

fn is_lq_string(value: &str) -> bool {
    match value.strip_prefix('\'').and_then(|rest| rest.rfind('\'')) {
        // The closing quote must be followed by @lang.
        Some(close) => value[close + 2..].starts_with('@') && value.len() > close + 3,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(get_function("COUNT").unwrap().name, "count");
        assert_eq!(get_function("Kvec_Cos_Sim").unwrap().name, "kvec_cos_sim");
    }

    #[test]
    fn unknown_function_is_an_error() {
        assert!(matches!(
            get_function("no_such_function"),
            Err(QuiverError::UnknownFunction(_))
        ));
    }

    #[test]
    fn arity_bounds_are_enforced() {
        let substr = get_function("substr").unwrap();
        assert!(substr.check_arity(2).is_ok());
        assert!(substr.check_arity(3).is_ok());
        assert!(substr.check_arity(4).is_err());
        let coalesce = get_function("coalesce").unwrap();
        assert!(coalesce.check_arity(7).is_ok());
        assert!(coalesce.check_arity(1).is_err());
    }

    #[test]
    fn registration_replaces_and_lowercases() {
        register(FunctionDef::new("MyFunc", FunctionKind::Scalar, 1, Some(1)));
        assert_eq!(get_function("myfunc").unwrap().name, "myfunc");
        register(FunctionDef::new("myfunc", FunctionKind::Scalar, 2, Some(2)));
        assert_eq!(get_function("MYFUNC").unwrap().min_args, 2);
    }

    #[test]
    fn regexp_matches_through_sql() {
        let conn = Connection::open_in_memory().unwrap();
        load_into(&conn).unwrap();
        let hit: bool = conn
            .query_row("SELECT regexp('^jo.n$', 'john')", [], |row| row.get(0))
            .unwrap();
        assert!(hit);
        let miss: bool = conn
            .query_row("SELECT regexp('^jo.n$', 'johnny')", [], |row| row.get(0))
            .unwrap();
        assert!(!miss);
    }

    #[test]
    fn literal_predicates_classify_cell_formats() {
        let conn = Connection::open_in_memory().unwrap();
        load_into(&conn).unwrap();
        let check = |sql: &str| -> bool {
            conn.query_row(sql, [], |row| row.get(0)).unwrap()
        };
        assert!(check("SELECT kgtk_string('\"hello\"')"));
        assert!(!check("SELECT kgtk_string('hello')"));
        assert!(check("SELECT kgtk_lqstring('''bonjour''@fr')"));
        assert!(!check("SELECT kgtk_lqstring('\"hello\"')"));
        assert!(check("SELECT kgtk_number('3.25')"));
        assert!(!check("SELECT kgtk_number('three')"));
    }

    #[test]
    fn text_accessor_strips_quotes_and_language_tags() {
        let conn = Connection::open_in_memory().unwrap();
        load_into(&conn).unwrap();
        let text = |sql: &str| -> String {
            conn.query_row(sql, [], |row| row.get(0)).unwrap()
        };
        assert_eq!(text("SELECT kgtk_text('\"hello\"')"), "hello");
        assert_eq!(text("SELECT kgtk_text('''bonjour''@fr')"), "bonjour");
        assert_eq!(text("SELECT kgtk_text('plain')"), "plain");
    }

    #[test]
    fn power_computes_through_sql() {
        let conn = Connection::open_in_memory().unwrap();
        load_into(&conn).unwrap();
        let result: f64 = conn
            .query_row("SELECT power(2, 10)", [], |row| row.get(0))
            .unwrap();
        assert!((result - 1024.0).abs() < 1e-9);
    }
}
