//! Query-to-SQL translation.
//!
//! A prepared query's match clauses normalize into triples; each triple
//! becomes one aliased scan of its graph table. Variables shared
//! between triples turn into column equality restrictions, strict
//! matches join through the FROM/WHERE form, and OPTIONAL MATCH
//! clauses become LEFT JOINs carrying their restrictions in ON.
//!
//! Translation is deferred-parameter: `$NAME` parameters and string
//! literals both become positional placeholders, with a parameter slot
//! list recording what to bind at execution time. Two queries that
//! differ only in their string literals therefore translate to the
//! same SQL text and share one prepared statement.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{QuiverError, Result};
use crate::function::{get_function, CallRewrite, FunctionKind, VectorOp};
use crate::query::ast::{
    BinaryOp, Expr, Literal, MatchClause, Pattern, QueryContext, ReturnItem, SingleQuery,
    UnaryOp, VarId,
};
use crate::query::normalize::{normalize_match, normalize_path, Triple};
use crate::store::vector::VectorDtype;
use crate::store::SqlStore;
use crate::store::Value;

/// One deferred parameter position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamSlot {
    /// `$NAME` parameter; bound from the user's parameter map.
    Named(String),
    /// String literal lifted out of the SQL text; bound to itself.
    Fixed(String),
}

/// A translated query ready for repeated execution.
#[derive(Debug, Clone)]
pub struct TranslatedQuery {
    /// Generated SQL text.
    pub sql: String,
    /// Parameter slots in positional order.
    pub params: Vec<ParamSlot>,
    /// Output column names in projection order.
    pub header: Vec<String>,
}

impl TranslatedQuery {
    /// Resolves the parameter slots against a user parameter map.
    pub fn bind(&self, params: &FxHashMap<String, String>) -> Result<Vec<Value>> {
        self.params
            .iter()
            .map(|slot| match slot {
                ParamSlot::Fixed(text) => Ok(Value::Text(text.clone())),
                ParamSlot::Named(name) => params
                    .get(name)
                    .map(|value| Value::Text(value.clone()))
                    .ok_or_else(|| {
                        QuiverError::Configuration(format!(
                            "parameter '${name}' is not bound"
                        ))
                    }),
            })
            .collect()
    }
}

/// Translates a prepared query against the store's current graphs.
/// With `auto_index` set, standard indexes are ensured on every column
/// the generated SQL joins or restricts on.
pub fn translate_query(
    query: SingleQuery,
    store: &mut SqlStore,
    auto_index: bool,
) -> Result<TranslatedQuery> {
    let SingleQuery {
        mut context,
        matches,
        with,
        ret,
    } = query;
    if !context.simplified {
        return Err(QuiverError::Internal(
            "translate called on an unsimplified query".into(),
        ));
    }

    let mut state = Translator {
        store,
        ctx: &mut context,
        columns: FxHashMap::default(),
        from: Vec::new(),
        left_joins: Vec::new(),
        conditions: Vec::new(),
        params: Vec::new(),
        alias_tables: FxHashMap::default(),
        restricted: FxHashMap::default(),
        alias_count: 0,
    };

    for clause in &matches {
        state.add_match(clause)?;
    }
    if state.from.is_empty() {
        return Err(QuiverError::UnsupportedPattern(
            "OPTIONAL MATCH requires a preceding strict MATCH".into(),
        ));
    }

    for clause in &with {
        // Only the pass-through form survives translation; anything
        // projecting new names would need nested SELECT scoping.
        let pass_through = clause.items.iter().all(|item| *item == ReturnItem::All);
        if !pass_through || clause.distinct {
            return Err(QuiverError::UnsupportedPattern(
                "only WITH * [WHERE ...] is supported".into(),
            ));
        }
        if let Some(filter) = &clause.where_clause {
            let condition = state.expr(filter)?;
            state.conditions.push(condition);
        }
    }

    // Projection. Aggregate calls anywhere in the item list switch the
    // query into grouped form, grouping on the non-aggregated items.
    let mut projection = Vec::new();
    let mut header = Vec::new();
    let mut group_by = Vec::new();
    let mut has_aggregate = false;
    for item in &ret.items {
        match item {
            ReturnItem::All => {
                for (fragment, name) in state.all_columns() {
                    header.push(name.clone());
                    projection.push(format!("{fragment} AS {}", sql_ident(&name)));
                    group_by.push(fragment);
                }
            }
            ReturnItem::Expr { expr, alias } => {
                let fragment = state.expr(expr)?;
                let name = alias
                    .clone()
                    .unwrap_or_else(|| state.default_name(expr, header.len()));
                header.push(name.clone());
                projection.push(format!("{fragment} AS {}", sql_ident(&name)));
                if state.contains_aggregate(expr)? {
                    has_aggregate = true;
                } else {
                    group_by.push(fragment);
                }
            }
        }
    }

    let mut sql = String::from("SELECT ");
    if ret.distinct {
        sql.push_str("DISTINCT ");
    }
    sql.push_str(&projection.join(", "));
    sql.push_str(" FROM ");
    sql.push_str(&state.from.join(", "));
    for (entry, on) in &state.left_joins {
        sql.push_str(" LEFT JOIN ");
        sql.push_str(entry);
        sql.push_str(" ON ");
        if on.is_empty() {
            sql.push_str("TRUE");
        } else {
            sql.push_str(&on.join(" AND "));
        }
    }
    if !state.conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&state.conditions.join(" AND "));
    }
    if has_aggregate && !group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&group_by.join(", "));
    }
    if !ret.order_by.is_empty() {
        let mut keys = Vec::new();
        for item in &ret.order_by {
            let fragment = state.expr(&item.expr)?;
            keys.push(if item.ascending {
                fragment
            } else {
                format!("{fragment} DESC")
            });
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }
    match (&ret.limit, &ret.skip) {
        (Some(limit), skip) => {
            let limit = state.expr(limit)?;
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(skip) = skip {
                let skip = state.expr(skip)?;
                sql.push_str(&format!(" OFFSET {skip}"));
            }
        }
        (None, Some(skip)) => {
            // SQLite refuses OFFSET without LIMIT; -1 means unlimited.
            let skip = state.expr(skip)?;
            sql.push_str(&format!(" LIMIT -1 OFFSET {skip}"));
        }
        (None, None) => {}
    }

    let Translator {
        store,
        params,
        restricted,
        ..
    } = state;
    if auto_index {
        for (table, columns) in restricted {
            store.ensure_column_indexes(&table, &columns)?;
        }
    }
    debug!(sql, "translated query");
    Ok(TranslatedQuery {
        sql,
        params,
        header,
    })
}

struct Translator<'a> {
    store: &'a mut SqlStore,
    ctx: &'a mut QueryContext,
    /// Canonical `(alias, column)` per bound variable.
    columns: FxHashMap<VarId, (String, String)>,
    from: Vec<String>,
    left_joins: Vec<(String, Vec<String>)>,
    conditions: Vec<String>,
    params: Vec<ParamSlot>,
    alias_tables: FxHashMap<String, String>,
    restricted: FxHashMap<String, Vec<String>>,
    alias_count: usize,
}

fn sql_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl<'a> Translator<'a> {
    fn add_match(&mut self, clause: &MatchClause) -> Result<()> {
        let triples = normalize_match(self.ctx, clause)?;
        if clause.optional {
            let mut clause_joins = Vec::new();
            for triple in &triples {
                let (entry, conds) = self.add_triple(triple)?;
                clause_joins.push((entry, conds));
            }
            if let Some(filter) = &clause.where_clause {
                let condition = self.expr(filter)?;
                match clause_joins.last_mut() {
                    Some((_, on)) => on.push(condition),
                    None => self.conditions.push(condition),
                }
            }
            self.left_joins.extend(clause_joins);
        } else {
            for triple in &triples {
                let (entry, conds) = self.add_triple(triple)?;
                self.from.push(entry);
                self.conditions.extend(conds);
            }
            if let Some(filter) = &clause.where_clause {
                let condition = self.expr(filter)?;
                self.conditions.push(condition);
            }
        }
        Ok(())
    }

    fn resolve_table(&mut self, triple: &Triple) -> Result<String> {
        match &triple.node1.graph {
            Some(handle) => self.store.table_for_handle(handle),
            None => match self.store.default_table()? {
                Some(table) => Ok(table),
                None => Err(QuiverError::UnsupportedPattern(
                    "ambiguous graph reference: a pattern without a graph \
                     handle needs exactly one imported graph"
                        .into(),
                )),
            },
        }
    }

    /// Registers one triple: allocates a table alias and produces its
    /// join and restriction conditions.
    fn add_triple(&mut self, triple: &Triple) -> Result<(String, Vec<String>)> {
        let table = self.resolve_table(triple)?;
        let header = self.store.table_header(&table)?;
        if header.len() < 3 {
            return Err(QuiverError::UnsupportedPattern(format!(
                "graph table '{table}' has fewer than three columns"
            )));
        }
        self.alias_count += 1;
        let alias = format!("{table}_c{}", self.alias_count);
        self.alias_tables.insert(alias.clone(), table.clone());
        let entry = format!("{} AS {alias}", sql_ident(&table));

        let node1_col = core_column(&header, "node1", 0);
        let label_col = core_column(&header, "label", 1);
        let node2_col = core_column(&header, "node2", 2);
        let id_col = if header.iter().any(|c| c == "id") {
            "id".to_string()
        } else {
            "rowid".to_string()
        };

        let mut conds = Vec::new();
        self.bind(triple.node1.var, &alias, &node1_col, &mut conds);
        self.bind(triple.relation.var, &alias, &id_col, &mut conds);
        self.bind(triple.node2.var, &alias, &node2_col, &mut conds);

        if !triple.node1.labels.is_empty() || !triple.node2.labels.is_empty() {
            return Err(QuiverError::UnsupportedPattern(
                "node labels are not supported".into(),
            ));
        }
        if let Some(label) = triple.relation.labels.first() {
            let slot = self.push_param(ParamSlot::Fixed(label.clone()));
            conds.push(format!("{alias}.{} = {slot}", sql_ident(&label_col)));
            self.restrict(&alias, &label_col);
        }

        for (key, value) in triple
            .node1
            .properties
            .iter()
            .chain(triple.relation.properties.iter())
            .chain(triple.node2.properties.iter())
        {
            if !header.iter().any(|c| c == key) {
                return Err(QuiverError::UnsupportedPattern(format!(
                    "graph table '{table}' has no column '{key}'"
                )));
            }
            let value = self.expr(value)?;
            conds.push(format!("{alias}.{} = {value}", sql_ident(key)));
            self.restrict(&alias, key);
        }
        Ok((entry, conds))
    }

    /// Binds a variable to a column; repeat bindings become equality
    /// restrictions against the canonical occurrence.
    fn bind(&mut self, var: Option<VarId>, alias: &str, column: &str, conds: &mut Vec<String>) {
        let var = match var {
            Some(var) => var,
            None => return,
        };
        match self.columns.get(&var) {
            Some((prev_alias, prev_column)) => {
                conds.push(format!(
                    "{prev_alias}.{} = {alias}.{}",
                    sql_ident(prev_column),
                    sql_ident(column)
                ));
                let prev_alias = prev_alias.clone();
                let prev_column = prev_column.clone();
                self.restrict(&prev_alias, &prev_column);
                self.restrict(alias, column);
            }
            None => {
                self.columns
                    .insert(var, (alias.to_string(), column.to_string()));
            }
        }
    }

    fn restrict(&mut self, alias: &str, column: &str) {
        if column == "rowid" {
            return;
        }
        if let Some(table) = self.alias_tables.get(alias) {
            let columns = self.restricted.entry(table.clone()).or_default();
            if !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        }
    }

    fn push_param(&mut self, slot: ParamSlot) -> String {
        self.params.push(slot);
        format!("?{}", self.params.len())
    }

    fn column_ref(&self, var: VarId) -> Result<String> {
        self.columns
            .get(&var)
            .map(|(alias, column)| format!("{alias}.{}", sql_ident(column)))
            .ok_or_else(|| {
                QuiverError::UnsupportedPattern(format!(
                    "variable '{}' is not bound by any pattern",
                    self.ctx.name(var)
                ))
            })
    }

    /// Named pattern variables with their canonical columns, in
    /// interning order, for `RETURN *` expansion.
    fn all_columns(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (index, variable) in self.ctx.variables().iter().enumerate() {
            if variable.anonymous {
                continue;
            }
            if let Some((alias, column)) = self.columns.get(&VarId(index as u32)) {
                out.push((
                    format!("{alias}.{}", sql_ident(column)),
                    variable.name.clone(),
                ));
            }
        }
        out
    }

    fn default_name(&self, expr: &Expr, index: usize) -> String {
        match expr {
            Expr::Variable(var) => self.ctx.name(*var).to_string(),
            Expr::Property { key, .. } => key.clone(),
            _ => format!("col{}", index + 1),
        }
    }

    fn contains_aggregate(&self, expr: &Expr) -> Result<bool> {
        Ok(match expr {
            Expr::Call { name, args, .. } => {
                if get_function(name)?.kind == FunctionKind::Aggregate {
                    true
                } else {
                    for arg in args {
                        if self.contains_aggregate(arg)? {
                            return Ok(true);
                        }
                    }
                    false
                }
            }
            Expr::Unary { operand, .. } => self.contains_aggregate(operand)?,
            Expr::Binary { left, right, .. } => {
                self.contains_aggregate(left)? || self.contains_aggregate(right)?
            }
            Expr::Property { base, .. } => self.contains_aggregate(base)?,
            _ => false,
        })
    }

    fn expr(&mut self, expr: &Expr) -> Result<String> {
        Ok(match expr {
            Expr::Literal(literal) => match literal {
                Literal::Null => "NULL".to_string(),
                Literal::Bool(true) => "TRUE".to_string(),
                Literal::Bool(false) => "FALSE".to_string(),
                Literal::Int(value) => value.to_string(),
                Literal::Float(value) => format!("{value:?}"),
                Literal::String(value) => {
                    self.push_param(ParamSlot::Fixed(value.clone()))
                }
            },
            Expr::Parameter(name) => self.push_param(ParamSlot::Named(name.clone())),
            Expr::Variable(var) => self.column_ref(*var)?,
            Expr::Property { base, key } => {
                let var = match base.as_ref() {
                    Expr::Variable(var) => *var,
                    other => {
                        return Err(QuiverError::UnsupportedPattern(format!(
                            "property access on a non-variable expression: {other:?}"
                        )))
                    }
                };
                let (alias, _) = self
                    .columns
                    .get(&var)
                    .ok_or_else(|| {
                        QuiverError::UnsupportedPattern(format!(
                            "variable '{}' is not bound by any pattern",
                            self.ctx.name(var)
                        ))
                    })?
                    .clone();
                let table = self.alias_tables[&alias].clone();
                let header = self.store.table_header(&table)?;
                if !header.iter().any(|c| c == key) {
                    return Err(QuiverError::UnsupportedPattern(format!(
                        "graph table '{table}' has no column '{key}'"
                    )));
                }
                format!("{alias}.{}", sql_ident(key))
            }
            Expr::Unary { op, operand } => {
                let operand = self.expr(operand)?;
                match op {
                    UnaryOp::Not => format!("(NOT {operand})"),
                    UnaryOp::Neg => format!("(- {operand})"),
                    UnaryOp::IsNull => format!("({operand} IS NULL)"),
                    UnaryOp::IsNotNull => format!("({operand} IS NOT NULL)"),
                }
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right)?,
            Expr::Call {
                name,
                distinct,
                star,
                args,
            } => self.call(name, *distinct, *star, args)?,
            Expr::Case {
                input,
                branches,
                default,
            } => {
                let mut sql = String::from("CASE");
                if let Some(input) = input {
                    sql.push(' ');
                    sql.push_str(&self.expr(input)?);
                }
                for (when, then) in branches {
                    let when = self.expr(when)?;
                    let then = self.expr(then)?;
                    sql.push_str(&format!(" WHEN {when} THEN {then}"));
                }
                if let Some(default) = default {
                    let default = self.expr(default)?;
                    sql.push_str(&format!(" ELSE {default}"));
                }
                sql.push_str(" END");
                sql
            }
            Expr::PathPredicate(pattern) => self.exists_subquery(pattern)?,
            Expr::List(_) => {
                return Err(QuiverError::UnsupportedPattern(
                    "list literals are only supported as the right side of IN".into(),
                ))
            }
            Expr::ListComprehension { .. } => {
                return Err(QuiverError::UnsupportedPattern(
                    "list comprehensions are not supported in translation".into(),
                ))
            }
            Expr::Quantified { .. } => {
                return Err(QuiverError::UnsupportedPattern(
                    "quantified predicates are not supported in translation".into(),
                ))
            }
        })
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<String> {
        if op == BinaryOp::In {
            let value = self.expr(left)?;
            let items = match right {
                Expr::List(items) => items,
                other => {
                    return Err(QuiverError::UnsupportedPattern(format!(
                        "IN requires a list literal on the right, got {other:?}"
                    )))
                }
            };
            let mut rendered = Vec::with_capacity(items.len());
            for item in items {
                rendered.push(self.expr(item)?);
            }
            return Ok(format!("({value} IN ({}))", rendered.join(", ")));
        }
        let left = self.expr(left)?;
        let right = self.expr(right)?;
        Ok(match op {
            BinaryOp::Or => format!("({left} OR {right})"),
            BinaryOp::And => format!("({left} AND {right})"),
            // No XOR in the SQL engine; inequality over booleans.
            BinaryOp::Xor => format!("(({left}) != ({right}))"),
            BinaryOp::Eq => format!("({left} = {right})"),
            BinaryOp::Ne => format!("({left} != {right})"),
            BinaryOp::Lt => format!("({left} < {right})"),
            BinaryOp::Le => format!("({left} <= {right})"),
            BinaryOp::Gt => format!("({left} > {right})"),
            BinaryOp::Ge => format!("({left} >= {right})"),
            BinaryOp::RegexMatch => format!("({left} REGEXP {right})"),
            BinaryOp::StartsWith => format!("({left} LIKE {right} || '%')"),
            BinaryOp::EndsWith => format!("({left} LIKE '%' || {right})"),
            BinaryOp::Contains => format!("({left} LIKE '%' || {right} || '%')"),
            BinaryOp::Add => format!("({left} + {right})"),
            BinaryOp::Sub => format!("({left} - {right})"),
            BinaryOp::Mul => format!("({left} * {right})"),
            BinaryOp::Div => format!("({left} / {right})"),
            BinaryOp::Mod => format!("({left} % {right})"),
            BinaryOp::Pow => format!("power({left}, {right})"),
            BinaryOp::In => unreachable!("handled above"),
        })
    }

    fn call(
        &mut self,
        name: &str,
        distinct: bool,
        star: bool,
        args: &[Expr],
    ) -> Result<String> {
        let def = get_function(name)?;
        if def.kind == FunctionKind::TableValued {
            return Err(QuiverError::UnsupportedPattern(format!(
                "table-valued function '{}' cannot be called in a query",
                def.name
            )));
        }
        if star {
            if def.name != "count" {
                return Err(QuiverError::UnsupportedPattern(format!(
                    "'*' argument is only legal in count(*), not {}(*)",
                    def.name
                )));
            }
            return Ok("count(*)".to_string());
        }
        if distinct && def.kind != FunctionKind::Aggregate {
            return Err(QuiverError::UnsupportedPattern(format!(
                "DISTINCT is only legal inside aggregate calls, not {}()",
                def.name
            )));
        }
        def.check_arity(args.len())?;

        match def.rewrite {
            CallRewrite::Passthrough => {
                let mut rendered = Vec::with_capacity(args.len());
                for arg in args {
                    rendered.push(self.expr(arg)?);
                }
                let distinct = if distinct { "DISTINCT " } else { "" };
                Ok(format!("{}({distinct}{})", def.name, rendered.join(", ")))
            }
            CallRewrite::Cast => {
                let value = self.expr(&args[0])?;
                // The type operand is part of the SQL grammar, never a
                // bindable value.
                let target = match &args[1] {
                    Expr::Variable(var) => self.ctx.name(*var).to_string(),
                    Expr::Literal(Literal::String(text)) => text.clone(),
                    other => {
                        return Err(QuiverError::UnsupportedPattern(format!(
                            "cast type operand must be a type name, got {other:?}"
                        )))
                    }
                };
                if !target.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(QuiverError::UnsupportedPattern(format!(
                        "illegal cast type name '{target}'"
                    )));
                }
                Ok(format!("CAST({value} AS {target})"))
            }
            CallRewrite::Likelihood => {
                let value = self.expr(&args[0])?;
                // The probability must be a compile-time constant.
                let prob = match &args[1] {
                    Expr::Literal(Literal::Float(p)) if (0.0..=1.0).contains(p) => {
                        format!("{p:?}")
                    }
                    other => {
                        return Err(QuiverError::UnsupportedPattern(format!(
                            "likelihood probability must be a float literal \
                             between 0.0 and 1.0, got {other:?}"
                        )))
                    }
                };
                Ok(format!("LIKELIHOOD({value}, {prob})"))
            }
            CallRewrite::VectorSimilarity(op) => self.vector_call(op, args),
        }
    }

    /// Vector calls dispatch on the dtypes of their column arguments.
    /// Cosine similarity over columns that were L2-normalized at import
    /// degrades to a plain dot product.
    fn vector_call(&mut self, op: VectorOp, args: &[Expr]) -> Result<String> {
        let mut rendered = Vec::with_capacity(args.len());
        let mut dtypes = Vec::with_capacity(args.len());
        let mut all_normalized = true;
        for arg in args {
            let (table, column) = self.vector_column_of(arg)?;
            let dtype = self
                .store
                .vector_column_dtype(&table, &column)
                .ok_or_else(|| {
                    QuiverError::UnsupportedPattern(format!(
                        "column '{column}' of '{table}' is not a vector column"
                    ))
                })?;
            if self
                .store
                .vector_column_is_external(&table, &column)
            {
                return Err(QuiverError::UnsupportedPattern(format!(
                    "vector column '{column}' of '{table}' is stored externally \
                     and cannot be used inside a query"
                )));
            }
            all_normalized &= self.store.is_normalized_vector_column(&table, &column);
            dtypes.push(dtype);
            rendered.push(self.expr(arg)?);
        }
        let op = match op {
            VectorOp::CosSim if all_normalized => VectorOp::Dot,
            other => other,
        };
        let name = self.store.ensure_vector_function(op, &dtypes)?;
        Ok(format!("{name}({})", rendered.join(", ")))
    }

    fn vector_column_of(&self, arg: &Expr) -> Result<(String, String)> {
        match arg {
            Expr::Property { base, key } => {
                let var = match base.as_ref() {
                    Expr::Variable(var) => *var,
                    _ => {
                        return Err(QuiverError::UnsupportedPattern(
                            "vector function arguments must be column references".into(),
                        ))
                    }
                };
                let (alias, _) = self.columns.get(&var).ok_or_else(|| {
                    QuiverError::UnsupportedPattern(format!(
                        "variable '{}' is not bound by any pattern",
                        self.ctx.name(var)
                    ))
                })?;
                Ok((self.alias_tables[alias].clone(), key.clone()))
            }
            _ => Err(QuiverError::UnsupportedPattern(
                "vector function arguments must be column references".into(),
            )),
        }
    }

    /// A pattern in expression position becomes a correlated EXISTS
    /// subquery; variables already bound outside join against the
    /// outer scan, the rest stay local to the subquery.
    fn exists_subquery(&mut self, pattern: &Pattern) -> Result<String> {
        let path = match pattern {
            Pattern::Path(path) => path.clone(),
            other => {
                return Err(QuiverError::Internal(format!(
                    "path predicate was not simplified: {other:?}"
                )))
            }
        };
        let triples = normalize_path(self.ctx, &path)?;
        let mut local_vars = Vec::new();
        let mut from = Vec::new();
        let mut conds = Vec::new();
        for triple in &triples {
            // Reuse the binding machinery; remember which variables
            // were first bound here so they can be unbound after.
            let before: Vec<VarId> = self.columns.keys().copied().collect();
            let (entry, triple_conds) = self.add_triple(triple)?;
            from.push(entry);
            conds.extend(triple_conds);
            for key in self.columns.keys() {
                if !before.contains(key) && !local_vars.contains(key) {
                    local_vars.push(*key);
                }
            }
        }
        for var in local_vars {
            self.columns.remove(&var);
        }
        let conds = if conds.is_empty() {
            "TRUE".to_string()
        } else {
            conds.join(" AND ")
        };
        Ok(format!(
            "EXISTS (SELECT 1 FROM {} WHERE {conds})",
            from.join(", ")
        ))
    }
}

fn core_column(header: &[String], canonical: &str, position: usize) -> String {
    if header.iter().any(|c| c == canonical) {
        canonical.to_string()
    } else {
        header[position].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::prepare;
    use std::io::Write as _;
    use std::path::PathBuf;

    fn sample_store(dir: &tempfile::TempDir) -> (SqlStore, PathBuf) {
        let path = dir.path().join("edges.tsv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(
            b"node1\tlabel\tnode2\n\
              john\tloves\tjoe\n\
              joe\tknows\tmary\n\
              mary\tknows\tjohn\n",
        )
        .unwrap();
        let store = SqlStore::open(dir.path().join("cache.db")).unwrap();
        (store, path)
    }

    fn translated(store: &mut SqlStore, text: &str) -> TranslatedQuery {
        let query = prepare(text).unwrap();
        translate_query(query, store, false).unwrap()
    }

    fn translate_err(store: &mut SqlStore, text: &str) -> QuiverError {
        let query = prepare(text).unwrap();
        translate_query(query, store, false).unwrap_err()
    }

    #[test]
    fn single_triple_translates_to_single_scan() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, edges) = sample_store(&dir);
        store.add_graph(&edges, None, &[], false).unwrap();
        let q = translated(&mut store, "MATCH (a)-[r]->(b) RETURN a, b");
        assert_eq!(
            q.sql,
            "SELECT graph_1_c1.\"node1\" AS \"a\", graph_1_c1.\"node2\" AS \"b\" \
             FROM \"graph_1\" AS graph_1_c1"
        );
        assert_eq!(q.header, vec!["a", "b"]);
        assert!(q.params.is_empty());
    }

    #[test]
    fn relationship_label_becomes_fixed_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, edges) = sample_store(&dir);
        store.add_graph(&edges, None, &[], false).unwrap();
        let q = translated(&mut store, "MATCH (a)-[r:knows]->(b) RETURN a");
        assert!(q.sql.contains("graph_1_c1.\"label\" = ?1"));
        assert_eq!(q.params, vec![ParamSlot::Fixed("knows".to_string())]);
    }

    #[test]
    fn shared_variables_become_join_conditions() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, edges) = sample_store(&dir);
        store.add_graph(&edges, None, &[], false).unwrap();
        let q = translated(&mut store, "MATCH (a)-[r]->(b)-[s]->(c) RETURN a, c");
        assert!(q.sql.contains("FROM \"graph_1\" AS graph_1_c1, \"graph_1\" AS graph_1_c2"));
        assert!(q
            .sql
            .contains("WHERE graph_1_c1.\"node2\" = graph_1_c2.\"node1\""));
    }

    #[test]
    fn optional_match_becomes_left_join() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, edges) = sample_store(&dir);
        store.add_graph(&edges, None, &[], false).unwrap();
        let q = translated(
            &mut store,
            "MATCH (a)-[r]->(b) OPTIONAL MATCH (b)-[s]->(c) RETURN a, c",
        );
        assert!(q
            .sql
            .contains("LEFT JOIN \"graph_1\" AS graph_1_c2 ON graph_1_c1.\"node2\" = graph_1_c2.\"node1\""));
    }

    #[test]
    fn string_literals_are_lifted_into_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, edges) = sample_store(&dir);
        store.add_graph(&edges, None, &[], false).unwrap();
        let a = translated(&mut store, "MATCH (a)-[r]->(b) WHERE a = 'john' RETURN b");
        let b = translated(&mut store, "MATCH (a)-[r]->(b) WHERE a = 'mary' RETURN b");
        assert_eq!(a.sql, b.sql);
        assert_eq!(a.params, vec![ParamSlot::Fixed("john".to_string())]);
        assert_eq!(b.params, vec![ParamSlot::Fixed("mary".to_string())]);
    }

    #[test]
    fn named_parameters_are_deferred() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, edges) = sample_store(&dir);
        store.add_graph(&edges, None, &[], false).unwrap();
        let q = translated(&mut store, "MATCH (a)-[r]->(b) WHERE a = $WHO RETURN b");
        assert_eq!(q.params, vec![ParamSlot::Named("WHO".to_string())]);
        let mut bindings = FxHashMap::default();
        bindings.insert("WHO".to_string(), "john".to_string());
        assert_eq!(
            q.bind(&bindings).unwrap(),
            vec![Value::Text("john".to_string())]
        );
        assert!(q.bind(&FxHashMap::default()).is_err());
    }

    #[test]
    fn property_map_restricts_same_named_column() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, edges) = sample_store(&dir);
        store.add_graph(&edges, None, &[], false).unwrap();
        let q = translated(&mut store, "MATCH (a)-[r {label: 'knows'}]->(b) RETURN a");
        assert!(q.sql.contains("graph_1_c1.\"label\" = ?1"));
        let err = translate_err(&mut store, "MATCH (a {nope: 'x'})-[r]->(b) RETURN a");
        assert!(matches!(err, QuiverError::UnsupportedPattern(_)));
    }

    #[test]
    fn skip_without_limit_uses_negative_limit() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, edges) = sample_store(&dir);
        store.add_graph(&edges, None, &[], false).unwrap();
        let q = translated(&mut store, "MATCH (a)-[r]->(b) RETURN a SKIP 2");
        assert!(q.sql.ends_with("LIMIT -1 OFFSET 2"));
        let q = translated(&mut store, "MATCH (a)-[r]->(b) RETURN a SKIP 2 LIMIT 5");
        assert!(q.sql.ends_with("LIMIT 5 OFFSET 2"));
    }

    #[test]
    fn aggregates_group_by_plain_items() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, edges) = sample_store(&dir);
        store.add_graph(&edges, None, &[], false).unwrap();
        let q = translated(&mut store, "MATCH (a)-[r]->(b) RETURN a, count(b)");
        assert!(q.sql.contains("count(graph_1_c1.\"node2\")"));
        assert!(q.sql.contains("GROUP BY graph_1_c1.\"node1\""));
    }

    #[test]
    fn missing_graph_handle_with_multiple_graphs_is_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, edges) = sample_store(&dir);
        store.add_graph(&edges, Some("g1"), &[], false).unwrap();
        let other = dir.path().join("other.tsv");
        std::fs::write(&other, "node1\tlabel\tnode2\na\tb\tc\n").unwrap();
        store.add_graph(&other, Some("g2"), &[], false).unwrap();
        let err = translate_err(&mut store, "MATCH (a)-[r]->(b) RETURN a");
        match err {
            QuiverError::UnsupportedPattern(msg) => assert!(msg.contains("ambiguous")),
            other => panic!("expected unsupported pattern, got {other:?}"),
        }
        // A handle resolves it.
        let q = translated(&mut store, "MATCH g2: (a)-[r]->(b) RETURN a");
        assert!(q.sql.contains("\"graph_2\""));
    }

    #[test]
    fn node_labels_fail_at_translation() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, edges) = sample_store(&dir);
        store.add_graph(&edges, None, &[], false).unwrap();
        let err = translate_err(&mut store, "MATCH (a:Person)-[r]->(b) RETURN a");
        match err {
            QuiverError::UnsupportedPattern(msg) => assert!(msg.contains("node labels")),
            other => panic!("expected unsupported pattern, got {other:?}"),
        }
    }

    #[test]
    fn pattern_in_where_becomes_exists() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, edges) = sample_store(&dir);
        store.add_graph(&edges, None, &[], false).unwrap();
        let q = translated(
            &mut store,
            "MATCH (a)-[r]->(b) WHERE (b)-[]->(c) RETURN a",
        );
        assert!(q.sql.contains("EXISTS (SELECT 1 FROM \"graph_1\" AS graph_1_c2"));
        assert!(q.sql.contains("graph_1_c1.\"node2\" = graph_1_c2.\"node1\""));
    }

    #[test]
    fn auto_index_records_join_columns() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, edges) = sample_store(&dir);
        store.add_graph(&edges, None, &[], false).unwrap();
        let query = prepare("MATCH (a)-[r:knows]->(b)-[s]->(c) RETURN a").unwrap();
        translate_query(query, &mut store, true).unwrap();
        let names: Vec<String> = store
            .indexes_on("graph_1")
            .unwrap()
            .iter()
            .map(|i| i.get_name())
            .collect();
        assert!(names.contains(&"graph_1_label_idx".to_string()));
        assert!(names.contains(&"graph_1_node2_idx".to_string()));
        assert!(names.contains(&"graph_1_node1_idx".to_string()));
    }

    #[test]
    fn with_star_where_folds_into_conditions() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, edges) = sample_store(&dir);
        store.add_graph(&edges, None, &[], false).unwrap();
        let q = translated(
            &mut store,
            "MATCH (a)-[r]->(b) WITH * WHERE a = 'john' RETURN b",
        );
        assert!(q.sql.contains("WHERE (graph_1_c1.\"node1\" = ?1)"));
        let err = translate_err(&mut store, "MATCH (a)-[r]->(b) WITH a RETURN a");
        assert!(matches!(err, QuiverError::UnsupportedPattern(_)));
    }
}
