//! Simplification pass: collapses grammar-artifact wrapper nodes into
//! the canonical minimal AST shape.
//!
//! Three rewrites happen here, all in place:
//! - `PatternPart` / `GraphPatternPart` wrappers (and the anonymous
//!   form) unwrap into a flat [`PathPattern`];
//! - the `RelationshipTypes` wrapper on relationship details flattens
//!   into the plain label list;
//! - a bare `*` in RETURN or WITH becomes an explicit all-columns item.
//!
//! The pass is idempotent: the query is marked simplified and repeat
//! calls return immediately.

use crate::error::{QuiverError, Result};
use crate::query::ast::{
    Expr, PathElement, PathPattern, Pattern, ReturnItem, SingleQuery,
};

/// Runs the simplification pass over a freshly interned query.
pub fn simplify(query: &mut SingleQuery) -> Result<()> {
    if query.context.simplified {
        return Ok(());
    }
    for m in &mut query.matches {
        for pattern in &mut m.patterns {
            simplify_pattern(pattern)?;
        }
        if let Some(expr) = &mut m.where_clause {
            simplify_expr(expr)?;
        }
    }
    for w in &mut query.with {
        if w.star {
            w.items.insert(0, ReturnItem::All);
            w.star = false;
        }
        if let Some(expr) = &mut w.where_clause {
            simplify_expr(expr)?;
        }
    }
    if query.ret.star {
        query.ret.items.insert(0, ReturnItem::All);
        query.ret.star = false;
    }
    query.context.simplified = true;
    Ok(())
}

fn simplify_pattern(pattern: &mut Pattern) -> Result<()> {
    let canonical = lower_pattern(pattern, None, None)?;
    *pattern = Pattern::Path(canonical);
    Ok(())
}

/// Unwraps nested Part wrappers, accumulating the outermost path
/// variable and graph handle, until the underlying element is reached.
fn lower_pattern(
    pattern: &mut Pattern,
    path_var: Option<crate::query::ast::VarId>,
    graph: Option<String>,
) -> Result<PathPattern> {
    match pattern {
        Pattern::Part {
            var,
            graph: part_graph,
            element,
        } => {
            let var = path_var.or(*var);
            let graph = graph.or_else(|| part_graph.clone());
            lower_pattern(element, var, graph)
        }
        Pattern::Element { node, chain } => {
            let mut elements = Vec::with_capacity(1 + chain.len() * 2);
            let mut head = node.clone();
            simplify_node(&mut head)?;
            elements.push(PathElement::Node(head));
            for (rel, node) in chain.iter() {
                let mut rel = rel.clone();
                // RelationshipTypes wrapper flattens into the label list.
                if let Some(types) = rel.type_list.take() {
                    rel.labels = types;
                }
                for (_, value) in &mut rel.properties {
                    simplify_expr(value)?;
                }
                elements.push(PathElement::Relationship(rel));
                let mut node = node.clone();
                simplify_node(&mut node)?;
                elements.push(PathElement::Node(node));
            }
            Ok(PathPattern {
                path_var,
                graph,
                elements,
            })
        }
        Pattern::Path(path) => {
            // Already canonical; running the pass twice changes nothing.
            let mut path = path.clone();
            if path.path_var.is_none() {
                path.path_var = path_var;
            }
            if path.graph.is_none() {
                path.graph = graph;
            }
            Ok(path)
        }
    }
}

fn simplify_node(node: &mut crate::query::ast::NodePattern) -> Result<()> {
    for (_, value) in &mut node.properties {
        simplify_expr(value)?;
    }
    Ok(())
}

fn simplify_expr(expr: &mut Expr) -> Result<()> {
    match expr {
        Expr::Unary { operand, .. } => simplify_expr(operand),
        Expr::Binary { left, right, .. } => {
            simplify_expr(left)?;
            simplify_expr(right)
        }
        Expr::Property { base, .. } => simplify_expr(base),
        Expr::Call { args, .. } => {
            for arg in args {
                simplify_expr(arg)?;
            }
            Ok(())
        }
        Expr::Case {
            input,
            branches,
            default,
        } => {
            if let Some(input) = input {
                simplify_expr(input)?;
            }
            for (when, then) in branches {
                simplify_expr(when)?;
                simplify_expr(then)?;
            }
            if let Some(default) = default {
                simplify_expr(default)?;
            }
            Ok(())
        }
        Expr::List(items) => {
            for item in items {
                simplify_expr(item)?;
            }
            Ok(())
        }
        Expr::ListComprehension {
            source,
            filter,
            map,
            ..
        } => {
            simplify_expr(source)?;
            if let Some(filter) = filter {
                simplify_expr(filter)?;
            }
            if let Some(map) = map {
                simplify_expr(map)?;
            }
            Ok(())
        }
        Expr::Quantified { source, filter, .. } => {
            simplify_expr(source)?;
            if let Some(filter) = filter {
                simplify_expr(filter)?;
            }
            Ok(())
        }
        Expr::PathPredicate(pattern) => {
            simplify_pattern(pattern)?;
            match pattern.as_mut() {
                Pattern::Path(path) if path.elements.len() % 2 == 1 => Ok(()),
                _ => Err(QuiverError::Internal(
                    "path predicate did not simplify to an odd-length path".into(),
                )),
            }
        }
        Expr::Literal(_) | Expr::Variable(_) | Expr::Parameter(_) => Ok(()),
    }
}
