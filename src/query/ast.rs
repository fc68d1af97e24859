//! Typed abstract syntax tree and per-query variable table.
//!
//! The interning layer builds these nodes from the raw nested-list tree.
//! Variables are interned once per distinct name within a query so that
//! two references to the same name share one [`VarId`]; that sharing is
//! what later drives join-key inference in the translator. Anonymous
//! variables are synthesized with a monotonically increasing counter and
//! never collide with user-chosen names.

use rustc_hash::FxHashMap;

/// Index into a query's variable table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

/// One interned variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// The variable's name, user-chosen or synthesized.
    pub name: String,
    /// True when the variable was synthesized during interning or
    /// normalization rather than written by the user.
    pub anonymous: bool,
}

/// Per-query working state: the variable table and pipeline flags.
#[derive(Debug, Default)]
pub struct QueryContext {
    vars: Vec<Variable>,
    by_name: FxHashMap<String, VarId>,
    anon_counter: u32,
    /// Set by the simplifier so repeat passes are no-ops.
    pub simplified: bool,
}

impl QueryContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a named variable; repeated names resolve to the same id.
    pub fn intern_var(&mut self, name: &str) -> VarId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = VarId(self.vars.len() as u32);
        self.vars.push(Variable {
            name: name.to_string(),
            anonymous: false,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Synthesizes a fresh anonymous variable (`_x0001`, `_x0002`, ...),
    /// skipping any name the user already claimed.
    pub fn fresh_anonymous(&mut self) -> VarId {
        loop {
            self.anon_counter += 1;
            let name = format!("_x{:04}", self.anon_counter);
            if self.by_name.contains_key(&name) {
                continue;
            }
            let id = VarId(self.vars.len() as u32);
            self.vars.push(Variable {
                name: name.clone(),
                anonymous: true,
            });
            self.by_name.insert(name, id);
            return id;
        }
    }

    /// Looks up a variable by id.
    pub fn variable(&self, id: VarId) -> &Variable {
        &self.vars[id.0 as usize]
    }

    /// Returns the name of a variable.
    pub fn name(&self, id: VarId) -> &str {
        &self.vars[id.0 as usize].name
    }

    /// Resolves a name to its id if it was interned.
    pub fn lookup(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    /// All variables in interning order.
    pub fn variables(&self) -> &[Variable] {
        &self.vars
    }
}

/// Scalar literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Null literal.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit float literal.
    Float(f64),
    /// String literal.
    String(String),
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical negation.
    Not,
    /// Arithmetic negation.
    Neg,
    /// `IS NULL` test.
    IsNull,
    /// `IS NOT NULL` test.
    IsNotNull,
}

/// Binary operators in precedence order of the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Logical OR.
    Or,
    /// Logical XOR.
    Xor,
    /// Logical AND.
    And,
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Less-than.
    Lt,
    /// Less-or-equal.
    Le,
    /// Greater-than.
    Gt,
    /// Greater-or-equal.
    Ge,
    /// List membership.
    In,
    /// Regular-expression match (`=~`).
    RegexMatch,
    /// String prefix test.
    StartsWith,
    /// String suffix test.
    EndsWith,
    /// Substring test.
    Contains,
    /// Addition / string concatenation.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Modulo.
    Mod,
    /// Exponentiation.
    Pow,
}

/// Quantifier kinds for list predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    /// Every element satisfies the predicate.
    All,
    /// At least one element satisfies the predicate.
    Any,
    /// No element satisfies the predicate.
    None,
    /// Exactly one element satisfies the predicate.
    Single,
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Scalar literal.
    Literal(Literal),
    /// Interned variable reference.
    Variable(VarId),
    /// `$NAME` parameter, bound at execution time.
    Parameter(String),
    /// Property access `base.key`.
    Property {
        /// Expression the property is read from.
        base: Box<Expr>,
        /// Property name.
        key: String,
    },
    /// Unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Function call.
    Call {
        /// Function name as written (case preserved for error messages).
        name: String,
        /// `DISTINCT` flag inside an aggregate call.
        distinct: bool,
        /// `*` argument, e.g. `count(*)`.
        star: bool,
        /// Positional arguments.
        args: Vec<Expr>,
    },
    /// CASE expression.
    Case {
        /// Optional input expression (simple CASE form).
        input: Option<Box<Expr>>,
        /// `(WHEN, THEN)` branches in order.
        branches: Vec<(Expr, Expr)>,
        /// Optional ELSE expression.
        default: Option<Box<Expr>>,
    },
    /// List literal.
    List(Vec<Expr>),
    /// List comprehension `[var IN source WHERE filter | map]`.
    ListComprehension {
        /// Bound element variable.
        var: VarId,
        /// Source list expression.
        source: Box<Expr>,
        /// Optional filter predicate.
        filter: Option<Box<Expr>>,
        /// Optional mapping expression.
        map: Option<Box<Expr>>,
    },
    /// Quantified predicate `all/any/none/single(var IN source WHERE f)`.
    Quantified {
        /// Quantifier kind.
        kind: Quantifier,
        /// Bound element variable.
        var: VarId,
        /// Source list expression.
        source: Box<Expr>,
        /// Filter predicate (defaults to true when omitted).
        filter: Option<Box<Expr>>,
    },
    /// Graph pattern used in expression position (WHERE predicate).
    PathPredicate(Box<Pattern>),
}

/// A node pattern element.
#[derive(Debug, Clone, PartialEq)]
pub struct NodePattern {
    /// Associated variable; guaranteed present after normalization.
    pub var: Option<VarId>,
    /// Node labels as written; at most one survives normalization.
    pub labels: Vec<String>,
    /// Property map restrictions.
    pub properties: Vec<(String, Expr)>,
    /// Graph-source annotation propagated from the enclosing path.
    pub graph: Option<String>,
}

/// A relationship pattern element.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipPattern {
    /// Associated variable; guaranteed present after normalization.
    pub var: Option<VarId>,
    /// Raw `RelationshipTypes` production; the simplifier flattens this
    /// into `labels`.
    pub type_list: Option<Vec<String>>,
    /// Relationship labels; at most one survives normalization.
    pub labels: Vec<String>,
    /// Property map restrictions.
    pub properties: Vec<(String, Expr)>,
    /// `<-` arrow present on the left.
    pub left_arrow: bool,
    /// `->` arrow present on the right.
    pub right_arrow: bool,
}

/// Alternating node/relationship element of a path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathElement {
    /// Node element (even positions).
    Node(NodePattern),
    /// Relationship element (odd positions).
    Relationship(RelationshipPattern),
}

/// A canonical path pattern: odd-length alternating element list.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    /// Optional path variable (`p = (a)-...`).
    pub path_var: Option<VarId>,
    /// Optional graph-source handle (`g: (a)-...`).
    pub graph: Option<String>,
    /// Alternating elements, nodes at even indices.
    pub elements: Vec<PathElement>,
}

/// Pattern shapes as interned; the simplifier collapses the wrapper
/// variants into [`Pattern::Path`].
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// `PatternPart` / `GraphPatternPart` wrapper around an element.
    Part {
        /// Optional path variable.
        var: Option<VarId>,
        /// Optional graph handle.
        graph: Option<String>,
        /// Wrapped element.
        element: Box<Pattern>,
    },
    /// `PatternElement`: head node plus relationship/node chain.
    Element {
        /// Head node.
        node: NodePattern,
        /// Chain of (relationship, node) links.
        chain: Vec<(RelationshipPattern, NodePattern)>,
    },
    /// Canonical simplified path.
    Path(PathPattern),
}

/// A MATCH or OPTIONAL MATCH clause.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchClause {
    /// True for OPTIONAL MATCH.
    pub optional: bool,
    /// Comma-separated patterns.
    pub patterns: Vec<Pattern>,
    /// Attached WHERE predicate.
    pub where_clause: Option<Expr>,
}

/// One projected item in RETURN or WITH.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnItem {
    /// Explicit all-columns item produced from the `*` marker.
    All,
    /// Projected expression with an optional alias.
    Expr {
        /// Projected expression.
        expr: Expr,
        /// Optional output column name.
        alias: Option<String>,
    },
}

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq)]
pub struct SortItem {
    /// Sort expression.
    pub expr: Expr,
    /// True for ASC (the default).
    pub ascending: bool,
}

/// RETURN clause with its trailing modifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnClause {
    /// DISTINCT flag.
    pub distinct: bool,
    /// Bare `*` marker; the simplifier rewrites it into an explicit
    /// [`ReturnItem::All`] entry.
    pub star: bool,
    /// Projected items.
    pub items: Vec<ReturnItem>,
    /// ORDER BY keys.
    pub order_by: Vec<SortItem>,
    /// SKIP expression.
    pub skip: Option<Expr>,
    /// LIMIT expression.
    pub limit: Option<Expr>,
}

/// WITH clause (projection plus optional WHERE).
#[derive(Debug, Clone, PartialEq)]
pub struct WithClause {
    /// DISTINCT flag.
    pub distinct: bool,
    /// Bare `*` marker, normalized like RETURN's.
    pub star: bool,
    /// Projected items.
    pub items: Vec<ReturnItem>,
    /// Attached WHERE predicate.
    pub where_clause: Option<Expr>,
}

/// A fully interned single query.
#[derive(Debug)]
pub struct SingleQuery {
    /// The query's variable table and pipeline flags.
    pub context: QueryContext,
    /// MATCH clauses in source order.
    pub matches: Vec<MatchClause>,
    /// WITH clauses in source order.
    pub with: Vec<WithClause>,
    /// The final RETURN clause.
    pub ret: ReturnClause,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_shares_ids() {
        let mut ctx = QueryContext::new();
        let a = ctx.intern_var("a");
        let b = ctx.intern_var("b");
        let a2 = ctx.intern_var("a");
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(ctx.name(a), "a");
    }

    #[test]
    fn anonymous_names_are_distinct() {
        let mut ctx = QueryContext::new();
        let x = ctx.fresh_anonymous();
        let y = ctx.fresh_anonymous();
        assert_ne!(x, y);
        assert_eq!(ctx.name(x), "_x0001");
        assert_eq!(ctx.name(y), "_x0002");
        assert!(ctx.variable(x).anonymous);
    }

    #[test]
    fn anonymous_names_skip_user_claims() {
        let mut ctx = QueryContext::new();
        ctx.intern_var("_x0001");
        let fresh = ctx.fresh_anonymous();
        assert_eq!(ctx.name(fresh), "_x0002");
    }
}
