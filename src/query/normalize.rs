//! Path normalization: expands simplified path patterns into ordered
//! lists of elementary (node, relationship, node) triples.
//!
//! - A single-node path gets a synthesized anonymous relationship and
//!   target node so it can flow through the same join machinery; the
//!   synthesized elements are never referenced in output.
//! - A one-hop path normalizes its direction: a relationship declared
//!   right-to-left swaps its endpoint nodes.
//! - Longer chains peel off three-element windows that share connector
//!   node variables so joins line up.
//!
//! Multi-label, undirected, and bidirectional patterns are permanent
//! restrictions and rejected here, never silently worked around.

use crate::error::{QuiverError, Result};
use crate::query::ast::{
    MatchClause, NodePattern, PathElement, PathPattern, Pattern, QueryContext,
    RelationshipPattern,
};

/// One canonical unit of matching. Direction is always left-to-right
/// (node1 to node2) after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Triple {
    /// Left endpoint.
    pub node1: NodePattern,
    /// Connecting relationship, forward-directed.
    pub relation: RelationshipPattern,
    /// Right endpoint.
    pub node2: NodePattern,
}

/// Normalizes every pattern of a match clause, concatenating the triples
/// in source order.
pub fn normalize_match(ctx: &mut QueryContext, clause: &MatchClause) -> Result<Vec<Triple>> {
    let mut triples = Vec::new();
    for pattern in &clause.patterns {
        let path = match pattern {
            Pattern::Path(path) => path,
            other => {
                return Err(QuiverError::Internal(format!(
                    "normalize called before simplify: {other:?}"
                )))
            }
        };
        triples.extend(normalize_path(ctx, path)?);
    }
    Ok(triples)
}

/// Normalizes one simplified path into its triples.
pub fn normalize_path(ctx: &mut QueryContext, path: &PathPattern) -> Result<Vec<Triple>> {
    let elements = &path.elements;
    if elements.is_empty() || elements.len() % 2 == 0 {
        return Err(QuiverError::Internal(format!(
            "path pattern must have odd length, got {}",
            elements.len()
        )));
    }

    if elements.len() == 1 {
        let mut node1 = node_at(elements, 0)?.clone();
        ensure_node_var(ctx, &mut node1);
        check_node(&node1)?;
        node1.graph = node1.graph.take().or_else(|| path.graph.clone());
        // Synthesized hop: lets the single node participate in the join
        // machinery uniformly; neither element is ever projected.
        let relation = RelationshipPattern {
            var: Some(ctx.fresh_anonymous()),
            type_list: None,
            labels: Vec::new(),
            properties: Vec::new(),
            left_arrow: false,
            right_arrow: true,
        };
        let node2 = NodePattern {
            var: Some(ctx.fresh_anonymous()),
            labels: Vec::new(),
            properties: Vec::new(),
            graph: None,
        };
        return Ok(vec![Triple {
            node1,
            relation,
            node2,
        }]);
    }

    let mut triples = Vec::new();
    let mut connector: Option<NodePattern> = None;
    let mut offset = 0;
    while offset + 2 < elements.len() {
        let mut left = match connector.take() {
            Some(node) => node,
            None => {
                let mut node = node_at(elements, offset)?.clone();
                ensure_node_var(ctx, &mut node);
                node
            }
        };
        let mut relation = relationship_at(elements, offset + 1)?.clone();
        let mut right = node_at(elements, offset + 2)?.clone();
        ensure_node_var(ctx, &mut right);
        ensure_relationship_var(ctx, &mut relation);

        check_node(&left)?;
        check_relationship(&relation)?;
        check_node(&right)?;

        // The connector into the next window is the right endpoint as
        // written, before any direction flip.
        connector = Some(right.clone());

        if relation.left_arrow {
            // Declared right-to-left: flip the endpoints.
            relation.left_arrow = false;
            relation.right_arrow = true;
            std::mem::swap(&mut left, &mut right);
        }

        // Every window carries the path's graph annotation on node1 so
        // the translator can resolve its table without walking back.
        if left.graph.is_none() {
            left.graph = path.graph.clone();
        }

        triples.push(Triple {
            node1: left,
            relation,
            node2: right,
        });
        offset += 2;
    }
    Ok(triples)
}

fn node_at<'a>(elements: &'a [PathElement], index: usize) -> Result<&'a NodePattern> {
    match &elements[index] {
        PathElement::Node(node) => Ok(node),
        PathElement::Relationship(_) => Err(QuiverError::Internal(format!(
            "expected node pattern at path position {index}"
        ))),
    }
}

fn relationship_at<'a>(
    elements: &'a [PathElement],
    index: usize,
) -> Result<&'a RelationshipPattern> {
    match &elements[index] {
        PathElement::Relationship(rel) => Ok(rel),
        PathElement::Node(_) => Err(QuiverError::Internal(format!(
            "expected relationship pattern at path position {index}"
        ))),
    }
}

fn ensure_node_var(ctx: &mut QueryContext, node: &mut NodePattern) {
    if node.var.is_none() {
        node.var = Some(ctx.fresh_anonymous());
    }
}

fn ensure_relationship_var(ctx: &mut QueryContext, rel: &mut RelationshipPattern) {
    if rel.var.is_none() {
        rel.var = Some(ctx.fresh_anonymous());
    }
}

fn check_node(node: &NodePattern) -> Result<()> {
    if node.labels.len() > 1 {
        return Err(QuiverError::UnsupportedPattern(
            "multiple node/relationship labels are not allowed".into(),
        ));
    }
    Ok(())
}

fn check_relationship(rel: &RelationshipPattern) -> Result<()> {
    if rel.labels.len() > 1 {
        return Err(QuiverError::UnsupportedPattern(
            "multiple node/relationship labels are not allowed".into(),
        ));
    }
    if rel.left_arrow && rel.right_arrow {
        return Err(QuiverError::UnsupportedPattern(
            "illegal bidirectional arrow".into(),
        ));
    }
    if !rel.left_arrow && !rel.right_arrow {
        return Err(QuiverError::UnsupportedPattern(
            "undirected relationships are not allowed".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::intern::intern_query;
    use crate::query::parser::parse;
    use crate::query::simplify::simplify;

    fn normalized(text: &str) -> (QueryContext, Vec<Triple>) {
        let raw = parse(text).unwrap();
        let mut query = intern_query(&raw).unwrap();
        simplify(&mut query).unwrap();
        let clause = query.matches.remove(0);
        let mut ctx = query.context;
        let triples = normalize_match(&mut ctx, &clause).unwrap();
        (ctx, triples)
    }

    fn normalize_err(text: &str) -> QuiverError {
        let raw = parse(text).unwrap();
        let mut query = intern_query(&raw).unwrap();
        simplify(&mut query).unwrap();
        let clause = query.matches.remove(0);
        let mut ctx = query.context;
        normalize_match(&mut ctx, &clause).unwrap_err()
    }

    #[test]
    fn single_hop_produces_one_forward_triple() {
        let (ctx, triples) = normalized("MATCH (a)-[r]->(b) RETURN a");
        assert_eq!(triples.len(), 1);
        let t = &triples[0];
        assert_eq!(ctx.name(t.node1.var.unwrap()), "a");
        assert_eq!(ctx.name(t.relation.var.unwrap()), "r");
        assert_eq!(ctx.name(t.node2.var.unwrap()), "b");
        assert!(t.relation.right_arrow && !t.relation.left_arrow);
    }

    #[test]
    fn backward_arrow_flips_to_forward() {
        let (ctx, backward) = normalized("MATCH (a)<-[r]-(b) RETURN a");
        let (ctx2, forward) = normalized("MATCH (b)-[r]->(a) RETURN a");
        assert_eq!(backward.len(), 1);
        assert_eq!(ctx.name(backward[0].node1.var.unwrap()), "b");
        assert_eq!(ctx.name(backward[0].node2.var.unwrap()), "a");
        assert_eq!(
            ctx2.name(forward[0].node1.var.unwrap()),
            ctx.name(backward[0].node1.var.unwrap())
        );
    }

    #[test]
    fn chain_produces_one_triple_per_relation() {
        let (ctx, triples) = normalized("MATCH (a)-[r]->(b)-[s]->(c)-[t]->(d) RETURN a");
        assert_eq!(triples.len(), 3);
        // Consecutive triples share their connector variable.
        assert_eq!(
            triples[0].node2.var.unwrap(),
            triples[1].node1.var.unwrap()
        );
        assert_eq!(
            triples[1].node2.var.unwrap(),
            triples[2].node1.var.unwrap()
        );
        assert_eq!(ctx.name(triples[0].node2.var.unwrap()), "b");
    }

    #[test]
    fn chain_with_anonymous_connector_gets_fresh_variable() {
        let (ctx, triples) = normalized("MATCH (a)-[r]->()-[s]->(c) RETURN a");
        assert_eq!(triples.len(), 2);
        let connector = triples[0].node2.var.unwrap();
        assert_eq!(connector, triples[1].node1.var.unwrap());
        assert!(ctx.variable(connector).anonymous);
    }

    #[test]
    fn mixed_direction_chain_shares_connectors() {
        let (_, triples) = normalized("MATCH (a)-[r]->(b)<-[s]-(c) RETURN a");
        assert_eq!(triples.len(), 2);
        // Window two flipped: (c)-[s]->(b); connector is still b.
        assert_eq!(
            triples[0].node2.var.unwrap(),
            triples[1].node2.var.unwrap()
        );
    }

    #[test]
    fn single_node_synthesizes_anonymous_hop() {
        let (ctx, triples) = normalized("MATCH (n:Person {name: 'Bob'}) RETURN DISTINCT n");
        assert_eq!(triples.len(), 1);
        let t = &triples[0];
        assert_eq!(ctx.name(t.node1.var.unwrap()), "n");
        assert_eq!(t.node1.labels, vec!["Person".to_string()]);
        assert!(ctx.variable(t.relation.var.unwrap()).anonymous);
        assert!(ctx.variable(t.node2.var.unwrap()).anonymous);
        assert!(t.relation.right_arrow);
    }

    #[test]
    fn graph_annotation_propagates_to_node1() {
        let (_, triples) = normalized("MATCH g: (a)-[r]->(b)-[s]->(c) RETURN a");
        assert_eq!(triples[0].node1.graph.as_deref(), Some("g"));
        assert_eq!(triples[1].node1.graph.as_deref(), Some("g"));
    }

    #[test]
    fn undirected_relationship_is_rejected() {
        let err = normalize_err("MATCH (a)--(b) RETURN a");
        match err {
            QuiverError::UnsupportedPattern(msg) => {
                assert!(msg.contains("undirected"))
            }
            other => panic!("expected unsupported pattern, got {other:?}"),
        }
    }

    #[test]
    fn bidirectional_arrow_is_rejected() {
        let err = normalize_err("MATCH (a)<-[r]->(b) RETURN a");
        match err {
            QuiverError::UnsupportedPattern(msg) => {
                assert!(msg.contains("bidirectional"))
            }
            other => panic!("expected unsupported pattern, got {other:?}"),
        }
    }

    #[test]
    fn multiple_relationship_labels_are_rejected() {
        let err = normalize_err("MATCH (a)-[r:X|Y]->(b) RETURN a");
        match err {
            QuiverError::UnsupportedPattern(msg) => {
                assert!(msg.contains("multiple"))
            }
            other => panic!("expected unsupported pattern, got {other:?}"),
        }
    }

    #[test]
    fn multiple_node_labels_are_rejected() {
        let err = normalize_err("MATCH (a:X:Y)-[r]->(b) RETURN a");
        assert!(matches!(err, QuiverError::UnsupportedPattern(_)));
    }
}
