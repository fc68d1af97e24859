//! Front-end pipeline checks: parsed queries normalize into the
//! expected triple sequences.

use quiver::query::normalize::normalize_match;
use quiver::query::{prepare, QueryContext, Triple};
use quiver::QuiverError;

fn triples(text: &str) -> (QueryContext, Vec<Triple>) {
    let mut query = prepare(text).unwrap();
    let clause = query.matches.remove(0);
    let mut ctx = query.context;
    let triples = normalize_match(&mut ctx, &clause).unwrap();
    (ctx, triples)
}

#[test]
fn chain_of_n_hops_yields_n_triples() {
    for hops in 1..=5 {
        let mut pattern = String::from("(n0)");
        for i in 1..=hops {
            pattern.push_str(&format!("-[r{i}]->(n{i})"));
        }
        let (_, triples) = triples(&format!("MATCH {pattern} RETURN n0"));
        assert_eq!(triples.len(), hops);
        for window in triples.windows(2) {
            assert_eq!(window[0].node2.var, window[1].node1.var);
        }
    }
}

#[test]
fn forward_and_backward_writings_normalize_identically() {
    let (ctx_f, forward) = triples("MATCH (x)-[e]->(y) RETURN x");
    let (ctx_b, backward) = triples("MATCH (y)<-[e]-(x) RETURN x");
    let name = |ctx: &QueryContext, var| ctx.name(var).to_string();
    assert_eq!(
        name(&ctx_f, forward[0].node1.var.unwrap()),
        name(&ctx_b, backward[0].node1.var.unwrap())
    );
    assert_eq!(
        name(&ctx_f, forward[0].node2.var.unwrap()),
        name(&ctx_b, backward[0].node2.var.unwrap())
    );
    assert!(backward[0].relation.right_arrow);
    assert!(!backward[0].relation.left_arrow);
}

#[test]
fn single_node_gets_synthesized_anonymous_hop() {
    let (ctx, triples) = triples("MATCH (n) RETURN n");
    assert_eq!(triples.len(), 1);
    assert!(!ctx.variable(triples[0].node1.var.unwrap()).anonymous);
    assert!(ctx.variable(triples[0].relation.var.unwrap()).anonymous);
    assert!(ctx.variable(triples[0].node2.var.unwrap()).anonymous);
}

#[test]
fn comma_separated_patterns_concatenate() {
    let (_, triples) = triples("MATCH (a)-[r]->(b), (c)-[s]->(d) RETURN a");
    assert_eq!(triples.len(), 2);
    assert_ne!(triples[0].node1.var, triples[1].node1.var);
}

#[test]
fn graph_handles_annotate_their_own_pattern_only() {
    let (_, triples) = triples("MATCH g: (a)-[r]->(b), (c)-[s]->(d) RETURN a");
    assert_eq!(triples[0].node1.graph.as_deref(), Some("g"));
    assert_eq!(triples[1].node1.graph, None);
}

#[test]
fn permanent_restrictions_are_rejected() {
    let cases = [
        ("MATCH (a)--(b) RETURN a", "undirected"),
        ("MATCH (a)<-[r]->(b) RETURN a", "bidirectional"),
        ("MATCH (a)-[r:X|Y]->(b) RETURN a", "multiple"),
        ("MATCH (a:X:Y)-[r]->(b) RETURN a", "multiple"),
    ];
    for (text, needle) in cases {
        let mut query = prepare(text).unwrap();
        let clause = query.matches.remove(0);
        let mut ctx = query.context;
        match normalize_match(&mut ctx, &clause) {
            Err(QuiverError::UnsupportedPattern(msg)) => {
                assert!(msg.contains(needle), "{text}: {msg}")
            }
            other => panic!("{text}: expected unsupported pattern, got {other:?}"),
        }
    }
}

#[test]
fn syntax_errors_report_positions() {
    match prepare("MATCH (a)-[r]->(b) RETRUN a") {
        Err(QuiverError::Syntax { line, column, .. }) => {
            assert_eq!(line, 1);
            assert!(column > 1);
        }
        other => panic!("expected syntax error, got {other:?}"),
    }
}
