//! Raw-tree interning: builds typed AST nodes by dispatching on the
//! leading tag symbol of each raw list.
//!
//! The dispatch table is the closed `match` in [`intern_expr`] and the
//! pattern constructors below; an unknown tag or a wrong argument count
//! is an internal error (the parser and interner are expected to agree).
//! Variables are registered in the owning query's variable table as they
//! are encountered, so a second reference to the same name resolves to
//! the same [`VarId`].

use crate::error::{QuiverError, Result};
use crate::query::ast::{
    BinaryOp, Expr, Literal, MatchClause, NodePattern, Pattern, Quantifier, QueryContext,
    RelationshipPattern, ReturnClause, ReturnItem, SingleQuery, SortItem, UnaryOp, VarId,
    WithClause,
};
use crate::query::raw::RawNode;

fn unhandled(tag: &str) -> QuiverError {
    QuiverError::Internal(format!("unhandled expression kind '{tag}'"))
}

fn bad_arity(tag: &str, expected: usize, got: usize) -> QuiverError {
    QuiverError::Internal(format!(
        "malformed arity for '{tag}': expected {expected} list elements, got {got}"
    ))
}

fn expect_args<'a>(raw: &'a RawNode, tag: &str, expected: usize) -> Result<&'a [RawNode]> {
    if raw.len() != expected {
        return Err(bad_arity(tag, expected, raw.len()));
    }
    Ok(raw.args())
}

fn expect_bool(node: &RawNode, tag: &str) -> Result<bool> {
    match node {
        RawNode::Bool(b) => Ok(*b),
        _ => Err(bad_arity(tag, 0, 0)),
    }
}

fn expect_name<'a>(node: &'a RawNode, tag: &str) -> Result<&'a str> {
    node.as_name()
        .ok_or_else(|| QuiverError::Internal(format!("expected name argument in '{tag}'")))
}

/// Interns a full raw query tree into a typed [`SingleQuery`].
pub fn intern_query(raw: &RawNode) -> Result<SingleQuery> {
    if raw.tag() != Some("SingleQuery") {
        return Err(unhandled(raw.tag().unwrap_or("<leaf>")));
    }
    let mut ctx = QueryContext::new();
    let mut matches = Vec::new();
    let mut with = Vec::new();
    let mut ret = None;
    for clause in raw.args() {
        match clause.tag() {
            Some("Match") => matches.push(intern_match(&mut ctx, clause)?),
            Some("With") => with.push(intern_with(&mut ctx, clause)?),
            Some("Return") => ret = Some(intern_return(&mut ctx, clause)?),
            Some(tag) => return Err(unhandled(tag)),
            None => return Err(unhandled("<leaf>")),
        }
    }
    let ret = ret.ok_or_else(|| QuiverError::Internal("query missing RETURN clause".into()))?;
    Ok(SingleQuery {
        context: ctx,
        matches,
        with,
        ret,
    })
}

fn intern_match(ctx: &mut QueryContext, raw: &RawNode) -> Result<MatchClause> {
    let args = expect_args(raw, "Match", 4)?;
    let optional = expect_bool(&args[0], "Match")?;
    let patterns = args[1]
        .args()
        .iter()
        .map(|part| intern_pattern(ctx, part))
        .collect::<Result<Vec<_>>>()?;
    let where_clause = intern_where(ctx, &args[2])?;
    Ok(MatchClause {
        optional,
        patterns,
        where_clause,
    })
}

fn intern_where(ctx: &mut QueryContext, raw: &RawNode) -> Result<Option<Expr>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let args = expect_args(raw, "Where", 2)?;
    Ok(Some(intern_expr(ctx, &args[0])?))
}

fn intern_with(ctx: &mut QueryContext, raw: &RawNode) -> Result<WithClause> {
    let args = expect_args(raw, "With", 4)?;
    let distinct = expect_bool(&args[0], "With")?;
    let (star, items) = intern_return_items(ctx, &args[1])?;
    let where_clause = intern_where(ctx, &args[2])?;
    Ok(WithClause {
        distinct,
        star,
        items,
        where_clause,
    })
}

fn intern_return(ctx: &mut QueryContext, raw: &RawNode) -> Result<ReturnClause> {
    let args = expect_args(raw, "Return", 6)?;
    let distinct = expect_bool(&args[0], "Return")?;
    let (star, items) = intern_return_items(ctx, &args[1])?;
    let order_by = if args[2].is_empty() {
        Vec::new()
    } else {
        args[2]
            .args()
            .iter()
            .map(|item| {
                let sort = expect_args(item, "SortItem", 3)?;
                Ok(SortItem {
                    expr: intern_expr(ctx, &sort[0])?,
                    ascending: expect_bool(&sort[1], "SortItem")?,
                })
            })
            .collect::<Result<Vec<_>>>()?
    };
    let skip = if args[3].is_empty() {
        None
    } else {
        Some(intern_expr(ctx, &expect_args(&args[3], "Skip", 2)?[0])?)
    };
    let limit = if args[4].is_empty() {
        None
    } else {
        Some(intern_expr(ctx, &expect_args(&args[4], "Limit", 2)?[0])?)
    };
    Ok(ReturnClause {
        distinct,
        star,
        items,
        order_by,
        skip,
        limit,
    })
}

fn intern_return_items(ctx: &mut QueryContext, raw: &RawNode) -> Result<(bool, Vec<ReturnItem>)> {
    if raw.tag() != Some("ReturnItems") {
        return Err(unhandled(raw.tag().unwrap_or("<leaf>")));
    }
    let args = raw.args();
    let star = expect_bool(&args[0], "ReturnItems")?;
    let items = args[1..]
        .iter()
        .map(|item| {
            let parts = expect_args(item, "ReturnItem", 3)?;
            let expr = intern_expr(ctx, &parts[0])?;
            let alias = if parts[1].is_empty() {
                None
            } else {
                Some(expect_name(&parts[1], "ReturnItem")?.to_string())
            };
            Ok(ReturnItem::Expr { expr, alias })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((star, items))
}

// ---- patterns ----------------------------------------------------------

fn intern_pattern(ctx: &mut QueryContext, raw: &RawNode) -> Result<Pattern> {
    match raw.tag() {
        Some("PatternPart") => {
            let args = expect_args(raw, "PatternPart", 3)?;
            let var = ctx.intern_var(expect_name(&args[0], "PatternPart")?);
            let element = intern_pattern(ctx, &args[1])?;
            Ok(Pattern::Part {
                var: Some(var),
                graph: None,
                element: Box::new(element),
            })
        }
        Some("GraphPatternPart") => {
            let args = expect_args(raw, "GraphPatternPart", 3)?;
            let handle = expect_name(&args[0], "GraphPatternPart")?.to_string();
            let element = intern_pattern(ctx, &args[1])?;
            Ok(Pattern::Part {
                var: None,
                graph: Some(handle),
                element: Box::new(element),
            })
        }
        Some("AnonymousPatternPart") => {
            let args = expect_args(raw, "AnonymousPatternPart", 2)?;
            let element = intern_pattern(ctx, &args[0])?;
            Ok(Pattern::Part {
                var: None,
                graph: None,
                element: Box::new(element),
            })
        }
        Some("PatternElement") => intern_pattern_element(ctx, raw),
        Some(tag) => Err(unhandled(tag)),
        None => Err(unhandled("<leaf>")),
    }
}

fn intern_pattern_element(ctx: &mut QueryContext, raw: &RawNode) -> Result<Pattern> {
    let args = expect_args(raw, "PatternElement", 3)?;
    let node = intern_node_pattern(ctx, &args[0])?;
    let chains = match &args[1] {
        RawNode::List(chains) => chains,
        _ => return Err(bad_arity("PatternElement", 3, raw.len())),
    };
    let chain = chains
        .iter()
        .map(|link| intern_chain_link(ctx, link))
        .collect::<Result<Vec<_>>>()?;
    Ok(Pattern::Element { node, chain })
}

/// Interns one `RelationshipsPattern` chain link (the 3-tuple shape:
/// tag, relationship pattern, node pattern). The 2-tuple shape of the
/// same tag never appears in chain position; it is handled in
/// [`intern_expr`] where the grammar emits it for WHERE-clause pattern
/// references. This duplicate signature is a grammar artifact, kept as a
/// single explicit special case and not generalized to other productions.
fn intern_chain_link(
    ctx: &mut QueryContext,
    raw: &RawNode,
) -> Result<(RelationshipPattern, NodePattern)> {
    if raw.tag() != Some("RelationshipsPattern") {
        return Err(unhandled(raw.tag().unwrap_or("<leaf>")));
    }
    let args = expect_args(raw, "RelationshipsPattern", 3)?;
    let rel = intern_relationship_pattern(ctx, &args[0])?;
    let node = intern_node_pattern(ctx, &args[1])?;
    Ok((rel, node))
}

fn intern_node_pattern(ctx: &mut QueryContext, raw: &RawNode) -> Result<NodePattern> {
    let args = expect_args(raw, "NodePattern", 4)?;
    let var = intern_optional_var(ctx, &args[0])?;
    let labels = intern_name_list(&args[1], "NodeLabels")?;
    let properties = intern_property_map(ctx, &args[2])?;
    Ok(NodePattern {
        var,
        labels: labels.unwrap_or_default(),
        properties,
        graph: None,
    })
}

fn intern_relationship_pattern(
    ctx: &mut QueryContext,
    raw: &RawNode,
) -> Result<RelationshipPattern> {
    let args = expect_args(raw, "RelationshipPattern", 4)?;
    let left_arrow = expect_bool(&args[0], "RelationshipPattern")?;
    let right_arrow = expect_bool(&args[2], "RelationshipPattern")?;
    let (var, type_list, properties) = if args[1].is_empty() {
        (None, None, Vec::new())
    } else {
        let detail = expect_args(&args[1], "RelationshipDetail", 4)?;
        let var = intern_optional_var(ctx, &detail[0])?;
        let type_list = intern_name_list(&detail[1], "RelationshipTypes")?;
        let properties = intern_property_map(ctx, &detail[2])?;
        (var, type_list, properties)
    };
    Ok(RelationshipPattern {
        var,
        type_list,
        labels: Vec::new(),
        properties,
        left_arrow,
        right_arrow,
    })
}

fn intern_optional_var(ctx: &mut QueryContext, raw: &RawNode) -> Result<Option<VarId>> {
    if raw.is_empty() {
        return Ok(None);
    }
    Ok(Some(ctx.intern_var(expect_name(raw, "variable")?)))
}

fn intern_name_list(raw: &RawNode, tag: &str) -> Result<Option<Vec<String>>> {
    if raw.is_empty() {
        return Ok(None);
    }
    if raw.tag() != Some(tag) {
        return Err(unhandled(raw.tag().unwrap_or("<leaf>")));
    }
    let names = raw
        .args()
        .iter()
        .map(|n| Ok(expect_name(n, tag)?.to_string()))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(names))
}

fn intern_property_map(ctx: &mut QueryContext, raw: &RawNode) -> Result<Vec<(String, Expr)>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    if raw.tag() != Some("PropertyMap") {
        return Err(unhandled(raw.tag().unwrap_or("<leaf>")));
    }
    raw.args()
        .iter()
        .map(|pair| match pair {
            RawNode::List(kv) if kv.len() == 2 => {
                let key = expect_name(&kv[0], "PropertyMap")?.to_string();
                let value = intern_expr(ctx, &kv[1])?;
                Ok((key, value))
            }
            _ => Err(bad_arity("PropertyMap", 2, pair.len())),
        })
        .collect()
}

// ---- expressions -------------------------------------------------------

/// Interns one raw expression node.
pub fn intern_expr(ctx: &mut QueryContext, raw: &RawNode) -> Result<Expr> {
    match raw {
        RawNode::Int(v) => return Ok(Expr::Literal(Literal::Int(*v))),
        RawNode::Float(v) => return Ok(Expr::Literal(Literal::Float(*v))),
        RawNode::Text(v) => return Ok(Expr::Literal(Literal::String(v.clone()))),
        RawNode::Bool(v) => return Ok(Expr::Literal(Literal::Bool(*v))),
        RawNode::Null => return Ok(Expr::Literal(Literal::Null)),
        RawNode::Param(name) => return Ok(Expr::Parameter(name.clone())),
        _ => {}
    }
    let tag = raw.tag().ok_or_else(|| unhandled("<leaf>"))?;
    let binary = |op: BinaryOp, ctx: &mut QueryContext, raw: &RawNode| -> Result<Expr> {
        let args = expect_args(raw, tag, 3)?;
        Ok(Expr::Binary {
            op,
            left: Box::new(intern_expr(ctx, &args[0])?),
            right: Box::new(intern_expr(ctx, &args[1])?),
        })
    };
    let unary = |op: UnaryOp, ctx: &mut QueryContext, raw: &RawNode| -> Result<Expr> {
        let args = expect_args(raw, tag, 2)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(intern_expr(ctx, &args[0])?),
        })
    };
    match tag {
        "Variable" => {
            let args = expect_args(raw, tag, 2)?;
            let name = expect_name(&args[0], tag)?;
            Ok(Expr::Variable(ctx.intern_var(name)))
        }
        "Or" => binary(BinaryOp::Or, ctx, raw),
        "Xor" => binary(BinaryOp::Xor, ctx, raw),
        "And" => binary(BinaryOp::And, ctx, raw),
        "Eq" => binary(BinaryOp::Eq, ctx, raw),
        "Ne" => binary(BinaryOp::Ne, ctx, raw),
        "Lt" => binary(BinaryOp::Lt, ctx, raw),
        "Le" => binary(BinaryOp::Le, ctx, raw),
        "Gt" => binary(BinaryOp::Gt, ctx, raw),
        "Ge" => binary(BinaryOp::Ge, ctx, raw),
        "In" => binary(BinaryOp::In, ctx, raw),
        "RegexMatch" => binary(BinaryOp::RegexMatch, ctx, raw),
        "StartsWith" => binary(BinaryOp::StartsWith, ctx, raw),
        "EndsWith" => binary(BinaryOp::EndsWith, ctx, raw),
        "Contains" => binary(BinaryOp::Contains, ctx, raw),
        "Add" => binary(BinaryOp::Add, ctx, raw),
        "Sub" => binary(BinaryOp::Sub, ctx, raw),
        "Mul" => binary(BinaryOp::Mul, ctx, raw),
        "Div" => binary(BinaryOp::Div, ctx, raw),
        "Mod" => binary(BinaryOp::Mod, ctx, raw),
        "Pow" => binary(BinaryOp::Pow, ctx, raw),
        "Not" => unary(UnaryOp::Not, ctx, raw),
        "Neg" => unary(UnaryOp::Neg, ctx, raw),
        "IsNull" => unary(UnaryOp::IsNull, ctx, raw),
        "IsNotNull" => unary(UnaryOp::IsNotNull, ctx, raw),
        "Property" => {
            let args = expect_args(raw, tag, 3)?;
            Ok(Expr::Property {
                base: Box::new(intern_expr(ctx, &args[0])?),
                key: expect_name(&args[1], tag)?.to_string(),
            })
        }
        "Call" => {
            let args = expect_args(raw, tag, 5)?;
            let name = expect_name(&args[0], tag)?.to_string();
            let distinct = expect_bool(&args[1], tag)?;
            let star = expect_bool(&args[2], tag)?;
            let call_args = match &args[3] {
                RawNode::List(items) => items
                    .iter()
                    .map(|a| intern_expr(ctx, a))
                    .collect::<Result<Vec<_>>>()?,
                _ => return Err(bad_arity(tag, 5, raw.len())),
            };
            Ok(Expr::Call {
                name,
                distinct,
                star,
                args: call_args,
            })
        }
        "Case" => {
            let args = expect_args(raw, tag, 4)?;
            let input = if args[0].is_empty() {
                None
            } else {
                Some(Box::new(intern_expr(ctx, &args[0])?))
            };
            let branches = match &args[1] {
                RawNode::List(branches) => branches
                    .iter()
                    .map(|branch| match branch {
                        RawNode::List(pair) if pair.len() == 2 => Ok((
                            intern_expr(ctx, &pair[0])?,
                            intern_expr(ctx, &pair[1])?,
                        )),
                        _ => Err(bad_arity(tag, 2, branch.len())),
                    })
                    .collect::<Result<Vec<_>>>()?,
                _ => return Err(bad_arity(tag, 4, raw.len())),
            };
            let default = if args[2].is_empty() {
                None
            } else {
                Some(Box::new(intern_expr(ctx, &args[2])?))
            };
            Ok(Expr::Case {
                input,
                branches,
                default,
            })
        }
        "ListLiteral" => {
            let items = raw
                .args()
                .iter()
                .map(|a| intern_expr(ctx, a))
                .collect::<Result<Vec<_>>>()?;
            Ok(Expr::List(items))
        }
        "ListComprehension" => {
            let args = expect_args(raw, tag, 5)?;
            let var = ctx.intern_var(expect_name(&args[0], tag)?);
            let source = Box::new(intern_expr(ctx, &args[1])?);
            let filter = if args[2].is_empty() {
                None
            } else {
                Some(Box::new(intern_expr(ctx, &args[2])?))
            };
            let map = if args[3].is_empty() {
                None
            } else {
                Some(Box::new(intern_expr(ctx, &args[3])?))
            };
            Ok(Expr::ListComprehension {
                var,
                source,
                filter,
                map,
            })
        }
        "Quantified" => {
            let args = expect_args(raw, tag, 5)?;
            let kind = match &args[0] {
                RawNode::Symbol(kind) => match kind.as_str() {
                    "all" => Quantifier::All,
                    "any" => Quantifier::Any,
                    "none" => Quantifier::None,
                    "single" => Quantifier::Single,
                    other => return Err(unhandled(other)),
                },
                _ => return Err(bad_arity(tag, 5, raw.len())),
            };
            let var = ctx.intern_var(expect_name(&args[1], tag)?);
            let source = Box::new(intern_expr(ctx, &args[2])?);
            let filter = if args[3].is_empty() {
                None
            } else {
                Some(Box::new(intern_expr(ctx, &args[3])?))
            };
            Ok(Expr::Quantified {
                kind,
                var,
                source,
                filter,
            })
        }
        // Grammar artifact: `RelationshipsPattern` is emitted with two
        // different arities. The 3-tuple is a chain link (handled in
        // intern_chain_link); the 2-tuple is a bare pattern reference in
        // expression position and re-dispatches to the PatternElement
        // constructor. Detect on length; do not generalize this handling.
        "RelationshipsPattern" => match raw.len() {
            2 => {
                let element = intern_pattern_element(ctx, &raw.args()[0])?;
                Ok(Expr::PathPredicate(Box::new(element)))
            }
            got => Err(bad_arity(tag, 2, got)),
        },
        other => Err(unhandled(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;

    #[test]
    fn duplicate_variable_references_share_one_id() {
        let raw = parse("MATCH (a)-[r]->(b), (b)-[s]->(c) RETURN a").unwrap();
        let query = intern_query(&raw).unwrap();
        let b = query.context.lookup("b").unwrap();
        // Both pattern parts reference `b`; the table holds it once.
        assert_eq!(
            query
                .context
                .variables()
                .iter()
                .filter(|v| v.name == "b")
                .count(),
            1
        );
        assert_eq!(query.context.name(b), "b");
    }

    #[test]
    fn where_pattern_re_dispatches_to_pattern_element() {
        let raw = parse("MATCH (a), (b) WHERE (a)-[:KNOWS]->(b) RETURN a").unwrap();
        let query = intern_query(&raw).unwrap();
        match query.matches[0].where_clause.as_ref().unwrap() {
            Expr::PathPredicate(pattern) => match pattern.as_ref() {
                Pattern::Element { chain, .. } => assert_eq!(chain.len(), 1),
                other => panic!("expected pattern element, got {other:?}"),
            },
            other => panic!("expected path predicate, got {other:?}"),
        }
    }

    #[test]
    fn return_distinct_and_item_variable() {
        let raw = parse("MATCH (n:Person {name: 'Bob'}) RETURN DISTINCT n").unwrap();
        let query = intern_query(&raw).unwrap();
        assert!(query.ret.distinct);
        assert_eq!(query.ret.items.len(), 1);
        let n = query.context.lookup("n").unwrap();
        match &query.ret.items[0] {
            ReturnItem::Expr { expr, alias } => {
                assert_eq!(expr, &Expr::Variable(n));
                assert!(alias.is_none());
            }
            other => panic!("unexpected item {other:?}"),
        }
    }

    #[test]
    fn relationship_types_are_kept_as_wrapper_until_simplify() {
        let raw = parse("MATCH (a)-[r:KNOWS|LIKES]->(b) RETURN a").unwrap();
        let query = intern_query(&raw).unwrap();
        let part = &query.matches[0].patterns[0];
        let element = match part {
            Pattern::Part { element, .. } => element.as_ref(),
            other => panic!("expected part, got {other:?}"),
        };
        match element {
            Pattern::Element { chain, .. } => {
                let (rel, _) = &chain[0];
                assert_eq!(
                    rel.type_list.as_deref(),
                    Some(&["KNOWS".to_string(), "LIKES".to_string()][..])
                );
                assert!(rel.labels.is_empty());
            }
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_is_internal_error() {
        let raw = RawNode::tagged("Bogus", vec![]);
        let mut ctx = QueryContext::new();
        assert!(matches!(
            intern_expr(&mut ctx, &raw),
            Err(QuiverError::Internal(_))
        ));
    }

    #[test]
    fn wrong_arity_is_detected() {
        let raw = RawNode::tagged("Or", vec![RawNode::Int(1)]);
        let mut ctx = QueryContext::new();
        let err = intern_expr(&mut ctx, &raw).unwrap_err();
        match err {
            QuiverError::Internal(msg) => assert!(msg.contains("arity")),
            other => panic!("expected internal error, got {other:?}"),
        }
    }
}
