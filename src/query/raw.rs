//! Raw nested-list parse tree.
//!
//! The parser emits lists whose first element is a tag symbol naming the
//! grammar production, mirroring the shape a PEG grammar would produce.
//! The interning layer dispatches on that tag to build typed AST nodes.

/// One node of the raw parse tree.
#[derive(Debug, Clone, PartialEq)]
pub enum RawNode {
    /// Absent optional production.
    Empty,
    /// Production tag or bare word.
    Symbol(String),
    /// Identifier (variable, label, property, or function name).
    Name(String),
    /// String literal.
    Text(String),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// Boolean literal.
    Bool(bool),
    /// Null literal.
    Null,
    /// `$NAME` parameter reference.
    Param(String),
    /// Tagged or plain list of child nodes.
    List(Vec<RawNode>),
}

impl RawNode {
    /// Builds a tagged list: `[Symbol(tag), items...]`.
    pub fn tagged(tag: &str, items: Vec<RawNode>) -> RawNode {
        let mut list = Vec::with_capacity(items.len() + 1);
        list.push(RawNode::Symbol(tag.to_string()));
        list.extend(items);
        RawNode::List(list)
    }

    /// Returns the leading tag symbol if this is a tagged list.
    pub fn tag(&self) -> Option<&str> {
        match self {
            RawNode::List(items) => match items.first() {
                Some(RawNode::Symbol(tag)) => Some(tag.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Returns the child nodes following the tag of a tagged list.
    pub fn args(&self) -> &[RawNode] {
        match self {
            RawNode::List(items) if self.tag().is_some() => &items[1..],
            RawNode::List(items) => items,
            _ => &[],
        }
    }

    /// Total list length including the tag. Arity checks in the interning
    /// layer count the tag, matching how the grammar emits productions.
    pub fn len(&self) -> usize {
        match self {
            RawNode::List(items) => items.len(),
            _ => 0,
        }
    }

    /// Returns true when this is an empty (absent) production.
    pub fn is_empty(&self) -> bool {
        matches!(self, RawNode::Empty)
    }

    /// Extracts an identifier payload.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            RawNode::Name(name) => Some(name.as_str()),
            _ => None,
        }
    }
}
