//! Recursive-descent parser producing the raw nested-list tree.
//!
//! Expression parsing follows the grammar's twelve precedence levels
//! (OR, XOR, AND, NOT, comparison, predicate, additive, multiplicative,
//! power, unary, property access, atom). Failures report the furthest
//! token position the parser reached; there are no partial results.
//!
//! Raw tree shapes (tag followed by arguments):
//!
//! ```text
//! SingleQuery        clause...
//! Match              optional:bool pattern where|Empty
//! Pattern            part...
//! PatternPart        var element
//! GraphPatternPart   handle part|element
//! AnonymousPatternPart element
//! PatternElement     node chains:list
//! RelationshipsPattern relpat node          (chain link, 3-tuple)
//! RelationshipsPattern element              (pattern used as expression, 2-tuple)
//! RelationshipPattern  left:bool detail|Empty right:bool
//! RelationshipDetail   var|Empty types|Empty props|Empty
//! NodePattern          var|Empty labels|Empty props|Empty
//! NodeLabels / RelationshipTypes  name...
//! PropertyMap          [key value]...
//! Return             distinct:bool items order|Empty skip|Empty limit|Empty
//! With               distinct:bool items where|Empty
//! ReturnItems        star:bool item...
//! ReturnItem         expr alias|Empty
//! Order              sortitem... / SortItem expr asc:bool
//! ```
//!
//! The two `RelationshipsPattern` arities are a grammar artifact carried
//! over deliberately; the interning layer disambiguates on list length.

use crate::error::{QuiverError, Result};
use crate::query::lexer::{Lexer, Token, TokenType};
use crate::query::raw::RawNode;

/// Parses a query string into the raw nested-list tree.
pub fn parse(text: &str) -> Result<RawNode> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = RawParser::new(tokens);
    let query = parser.parse_query()?;
    parser.expect_eof()?;
    Ok(query)
}

struct RawParser {
    tokens: Vec<Token>,
    pos: usize,
    furthest: usize,
}

impl RawParser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            furthest: 0,
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &TokenType {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].token_type
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        if self.pos > self.furthest {
            self.furthest = self.pos;
        }
        token
    }

    fn check(&self, kind: &TokenType) -> bool {
        &self.peek().token_type == kind
    }

    fn match_token(&mut self, kind: &TokenType) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: &TokenType, message: &str) -> Result<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(message))
        }
    }

    fn error_here(&self, message: &str) -> QuiverError {
        let at = self.furthest.max(self.pos).min(self.tokens.len() - 1);
        let token = &self.tokens[at];
        QuiverError::syntax(
            token.line,
            token.column,
            format!("{message} (found {:?})", token.token_type),
        )
    }

    fn expect_eof(&mut self) -> Result<()> {
        self.match_token(&TokenType::Semicolon);
        if self.check(&TokenType::Eof) {
            Ok(())
        } else {
            Err(self.error_here("unexpected trailing input"))
        }
    }

    fn identifier(&mut self, message: &str) -> Result<String> {
        match self.peek().token_type.clone() {
            TokenType::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here(message)),
        }
    }

    // ---- clauses -------------------------------------------------------

    fn parse_query(&mut self) -> Result<RawNode> {
        let mut clauses = Vec::new();
        loop {
            if self.match_token(&TokenType::Optional) {
                self.consume(&TokenType::Match, "expected MATCH after OPTIONAL")?;
                clauses.push(self.parse_match(true)?);
            } else if self.match_token(&TokenType::Match) {
                clauses.push(self.parse_match(false)?);
            } else if self.match_token(&TokenType::With) {
                clauses.push(self.parse_with()?);
            } else if self.match_token(&TokenType::Return) {
                clauses.push(self.parse_return()?);
                break;
            } else {
                return Err(self.error_here("expected MATCH, OPTIONAL MATCH, WITH, or RETURN"));
            }
        }
        Ok(RawNode::tagged("SingleQuery", clauses))
    }

    fn parse_match(&mut self, optional: bool) -> Result<RawNode> {
        let mut parts = vec![self.parse_pattern_part()?];
        while self.match_token(&TokenType::Comma) {
            parts.push(self.parse_pattern_part()?);
        }
        let pattern = RawNode::tagged("Pattern", parts);
        let where_clause = if self.match_token(&TokenType::Where) {
            RawNode::tagged("Where", vec![self.parse_expr()?])
        } else {
            RawNode::Empty
        };
        Ok(RawNode::tagged(
            "Match",
            vec![RawNode::Bool(optional), pattern, where_clause],
        ))
    }

    fn parse_with(&mut self) -> Result<RawNode> {
        let distinct = self.match_token(&TokenType::Distinct);
        let items = self.parse_return_items()?;
        let where_clause = if self.match_token(&TokenType::Where) {
            RawNode::tagged("Where", vec![self.parse_expr()?])
        } else {
            RawNode::Empty
        };
        Ok(RawNode::tagged(
            "With",
            vec![RawNode::Bool(distinct), items, where_clause],
        ))
    }

    fn parse_return(&mut self) -> Result<RawNode> {
        let distinct = self.match_token(&TokenType::Distinct);
        let items = self.parse_return_items()?;
        let order = if self.match_token(&TokenType::Order) {
            self.consume(&TokenType::By, "expected BY after ORDER")?;
            let mut sorts = vec![self.parse_sort_item()?];
            while self.match_token(&TokenType::Comma) {
                sorts.push(self.parse_sort_item()?);
            }
            RawNode::tagged("Order", sorts)
        } else {
            RawNode::Empty
        };
        let skip = if self.match_token(&TokenType::Skip) {
            RawNode::tagged("Skip", vec![self.parse_expr()?])
        } else {
            RawNode::Empty
        };
        let limit = if self.match_token(&TokenType::Limit) {
            RawNode::tagged("Limit", vec![self.parse_expr()?])
        } else {
            RawNode::Empty
        };
        Ok(RawNode::tagged(
            "Return",
            vec![RawNode::Bool(distinct), items, order, skip, limit],
        ))
    }

    fn parse_sort_item(&mut self) -> Result<RawNode> {
        let expr = self.parse_expr()?;
        let ascending = if self.match_token(&TokenType::Desc) {
            false
        } else {
            self.match_token(&TokenType::Asc);
            true
        };
        Ok(RawNode::tagged(
            "SortItem",
            vec![expr, RawNode::Bool(ascending)],
        ))
    }

    fn parse_return_items(&mut self) -> Result<RawNode> {
        let mut star = false;
        let mut items = Vec::new();
        if self.match_token(&TokenType::Asterisk) {
            star = true;
            while self.match_token(&TokenType::Comma) {
                items.push(self.parse_return_item()?);
            }
        } else {
            items.push(self.parse_return_item()?);
            while self.match_token(&TokenType::Comma) {
                items.push(self.parse_return_item()?);
            }
        }
        let mut args = vec![RawNode::Bool(star)];
        args.extend(items);
        Ok(RawNode::tagged("ReturnItems", args))
    }

    fn parse_return_item(&mut self) -> Result<RawNode> {
        let expr = self.parse_expr()?;
        let alias = if self.match_token(&TokenType::As) {
            RawNode::Name(self.identifier("expected alias name after AS")?)
        } else {
            RawNode::Empty
        };
        Ok(RawNode::tagged("ReturnItem", vec![expr, alias]))
    }

    // ---- patterns ------------------------------------------------------

    fn parse_pattern_part(&mut self) -> Result<RawNode> {
        // `handle: <part>` qualifies the part with a graph source.
        if let TokenType::Identifier(_) = self.peek().token_type {
            if self.peek_at(1) == &TokenType::Colon {
                let handle = self.identifier("expected graph handle")?;
                self.advance(); // colon
                let inner = self.parse_pattern_part()?;
                return Ok(RawNode::tagged(
                    "GraphPatternPart",
                    vec![RawNode::Name(handle), inner],
                ));
            }
            if self.peek_at(1) == &TokenType::Eq {
                let var = self.identifier("expected path variable")?;
                self.advance(); // equals
                let element = self.parse_pattern_element()?;
                return Ok(RawNode::tagged(
                    "PatternPart",
                    vec![RawNode::Name(var), element],
                ));
            }
        }
        let element = self.parse_pattern_element()?;
        Ok(RawNode::tagged("AnonymousPatternPart", vec![element]))
    }

    fn parse_pattern_element(&mut self) -> Result<RawNode> {
        let node = self.parse_node_pattern()?;
        let mut chains = Vec::new();
        while self.check(&TokenType::Dash) || self.check(&TokenType::LeftArrow) {
            chains.push(self.parse_chain()?);
        }
        Ok(RawNode::tagged(
            "PatternElement",
            vec![node, RawNode::List(chains)],
        ))
    }

    /// Parses one relationship arrow plus its target node. Emitted under
    /// the `RelationshipsPattern` tag with two arguments (the 3-tuple
    /// shape); see the module docs for the duplicate-arity artifact.
    fn parse_chain(&mut self) -> Result<RawNode> {
        let relpat = self.parse_relationship_pattern()?;
        let node = self.parse_node_pattern()?;
        Ok(RawNode::tagged("RelationshipsPattern", vec![relpat, node]))
    }

    fn parse_relationship_pattern(&mut self) -> Result<RawNode> {
        let left = self.match_token(&TokenType::LeftArrow);
        if !left {
            self.consume(&TokenType::Dash, "expected relationship arrow")?;
        }
        let detail = if self.match_token(&TokenType::LeftBracket) {
            let detail = self.parse_relationship_detail()?;
            self.consume(
                &TokenType::RightBracket,
                "expected ']' closing relationship detail",
            )?;
            detail
        } else {
            RawNode::Empty
        };
        let right = if self.match_token(&TokenType::RightArrow) {
            true
        } else {
            self.consume(&TokenType::Dash, "expected '-' or '->' after relationship")?;
            false
        };
        Ok(RawNode::tagged(
            "RelationshipPattern",
            vec![RawNode::Bool(left), detail, RawNode::Bool(right)],
        ))
    }

    fn parse_relationship_detail(&mut self) -> Result<RawNode> {
        let var = match self.peek().token_type.clone() {
            TokenType::Identifier(name) => {
                self.advance();
                RawNode::Name(name)
            }
            _ => RawNode::Empty,
        };
        let types = if self.match_token(&TokenType::Colon) {
            let mut names = vec![RawNode::Name(
                self.identifier("expected relationship type")?,
            )];
            while self.match_token(&TokenType::Pipe) {
                self.match_token(&TokenType::Colon);
                names.push(RawNode::Name(
                    self.identifier("expected relationship type after '|'")?,
                ));
            }
            RawNode::tagged("RelationshipTypes", names)
        } else {
            RawNode::Empty
        };
        let props = if self.check(&TokenType::LeftBrace) {
            self.parse_property_map()?
        } else {
            RawNode::Empty
        };
        Ok(RawNode::tagged(
            "RelationshipDetail",
            vec![var, types, props],
        ))
    }

    fn parse_node_pattern(&mut self) -> Result<RawNode> {
        self.consume(&TokenType::LeftParen, "expected '(' starting node pattern")?;
        let var = match self.peek().token_type.clone() {
            TokenType::Identifier(name) => {
                self.advance();
                RawNode::Name(name)
            }
            _ => RawNode::Empty,
        };
        let labels = if self.check(&TokenType::Colon) {
            let mut names = Vec::new();
            while self.match_token(&TokenType::Colon) {
                names.push(RawNode::Name(self.identifier("expected node label")?));
            }
            RawNode::tagged("NodeLabels", names)
        } else {
            RawNode::Empty
        };
        let props = if self.check(&TokenType::LeftBrace) {
            self.parse_property_map()?
        } else {
            RawNode::Empty
        };
        self.consume(&TokenType::RightParen, "expected ')' closing node pattern")?;
        Ok(RawNode::tagged("NodePattern", vec![var, labels, props]))
    }

    fn parse_property_map(&mut self) -> Result<RawNode> {
        self.consume(&TokenType::LeftBrace, "expected '{' starting property map")?;
        let mut pairs = Vec::new();
        if !self.check(&TokenType::RightBrace) {
            loop {
                let key = self.identifier("expected property key")?;
                self.consume(&TokenType::Colon, "expected ':' after property key")?;
                let value = self.parse_expr()?;
                pairs.push(RawNode::List(vec![RawNode::Name(key), value]));
                if !self.match_token(&TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenType::RightBrace, "expected '}' closing property map")?;
        Ok(RawNode::tagged("PropertyMap", pairs))
    }

    // ---- expressions ---------------------------------------------------

    fn parse_expr(&mut self) -> Result<RawNode> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<RawNode> {
        let mut left = self.parse_xor()?;
        while self.match_token(&TokenType::Or) {
            let right = self.parse_xor()?;
            left = RawNode::tagged("Or", vec![left, right]);
        }
        Ok(left)
    }

    fn parse_xor(&mut self) -> Result<RawNode> {
        let mut left = self.parse_and()?;
        while self.match_token(&TokenType::Xor) {
            let right = self.parse_and()?;
            left = RawNode::tagged("Xor", vec![left, right]);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<RawNode> {
        let mut left = self.parse_not()?;
        while self.match_token(&TokenType::And) {
            let right = self.parse_not()?;
            left = RawNode::tagged("And", vec![left, right]);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<RawNode> {
        if self.match_token(&TokenType::Not) {
            let operand = self.parse_not()?;
            Ok(RawNode::tagged("Not", vec![operand]))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<RawNode> {
        let mut left = self.parse_predicated()?;
        loop {
            let tag = match self.peek().token_type {
                TokenType::Eq => "Eq",
                TokenType::Ne => "Ne",
                TokenType::Lt => "Lt",
                TokenType::Le => "Le",
                TokenType::Gt => "Gt",
                TokenType::Ge => "Ge",
                _ => break,
            };
            self.advance();
            let right = self.parse_predicated()?;
            left = RawNode::tagged(tag, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_predicated(&mut self) -> Result<RawNode> {
        let mut left = self.parse_add_sub()?;
        loop {
            if self.match_token(&TokenType::In) {
                let right = self.parse_add_sub()?;
                left = RawNode::tagged("In", vec![left, right]);
            } else if self.match_token(&TokenType::RegexMatch) {
                let right = self.parse_add_sub()?;
                left = RawNode::tagged("RegexMatch", vec![left, right]);
            } else if self.match_token(&TokenType::Starts) {
                self.consume(&TokenType::With, "expected WITH after STARTS")?;
                let right = self.parse_add_sub()?;
                left = RawNode::tagged("StartsWith", vec![left, right]);
            } else if self.match_token(&TokenType::Ends) {
                self.consume(&TokenType::With, "expected WITH after ENDS")?;
                let right = self.parse_add_sub()?;
                left = RawNode::tagged("EndsWith", vec![left, right]);
            } else if self.match_token(&TokenType::Contains) {
                let right = self.parse_add_sub()?;
                left = RawNode::tagged("Contains", vec![left, right]);
            } else if self.match_token(&TokenType::Is) {
                let negated = self.match_token(&TokenType::Not);
                self.consume(&TokenType::Null, "expected NULL after IS")?;
                let tag = if negated { "IsNotNull" } else { "IsNull" };
                left = RawNode::tagged(tag, vec![left]);
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_add_sub(&mut self) -> Result<RawNode> {
        let mut left = self.parse_mul_div()?;
        loop {
            let tag = match self.peek().token_type {
                TokenType::Plus => "Add",
                TokenType::Dash => "Sub",
                _ => break,
            };
            self.advance();
            let right = self.parse_mul_div()?;
            left = RawNode::tagged(tag, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_mul_div(&mut self) -> Result<RawNode> {
        let mut left = self.parse_power()?;
        loop {
            let tag = match self.peek().token_type {
                TokenType::Asterisk => "Mul",
                TokenType::Slash => "Div",
                TokenType::Percent => "Mod",
                _ => break,
            };
            self.advance();
            let right = self.parse_power()?;
            left = RawNode::tagged(tag, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> Result<RawNode> {
        let base = self.parse_unary()?;
        if self.match_token(&TokenType::Caret) {
            // Right-associative.
            let exponent = self.parse_power()?;
            Ok(RawNode::tagged("Pow", vec![base, exponent]))
        } else {
            Ok(base)
        }
    }

    fn parse_unary(&mut self) -> Result<RawNode> {
        if self.match_token(&TokenType::Dash) {
            let operand = self.parse_unary()?;
            Ok(RawNode::tagged("Neg", vec![operand]))
        } else if self.match_token(&TokenType::Plus) {
            self.parse_unary()
        } else {
            self.parse_postfix()
        }
    }

    fn parse_postfix(&mut self) -> Result<RawNode> {
        let mut expr = self.parse_atom()?;
        while self.match_token(&TokenType::Dot) {
            let key = self.identifier("expected property name after '.'")?;
            expr = RawNode::tagged("Property", vec![expr, RawNode::Name(key)]);
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<RawNode> {
        match self.peek().token_type.clone() {
            TokenType::Integer(value) => {
                self.advance();
                Ok(RawNode::Int(value))
            }
            TokenType::Float(value) => {
                self.advance();
                Ok(RawNode::Float(value))
            }
            TokenType::String(value) => {
                self.advance();
                Ok(RawNode::Text(value))
            }
            TokenType::True => {
                self.advance();
                Ok(RawNode::Bool(true))
            }
            TokenType::False => {
                self.advance();
                Ok(RawNode::Bool(false))
            }
            TokenType::Null => {
                self.advance();
                Ok(RawNode::Null)
            }
            TokenType::Parameter(name) => {
                self.advance();
                Ok(RawNode::Param(name))
            }
            TokenType::Case => {
                self.advance();
                self.parse_case()
            }
            TokenType::LeftBracket => {
                self.advance();
                self.parse_list_or_comprehension()
            }
            TokenType::All | TokenType::Any | TokenType::NoneKw | TokenType::Single => {
                self.parse_quantified()
            }
            TokenType::Exists => {
                self.advance();
                self.consume(&TokenType::LeftParen, "expected '(' after EXISTS")?;
                let element = self.parse_pattern_element()?;
                self.consume(&TokenType::RightParen, "expected ')' after EXISTS pattern")?;
                Ok(RawNode::tagged("RelationshipsPattern", vec![element]))
            }
            TokenType::Identifier(name) => {
                if self.peek_at(1) == &TokenType::LeftParen {
                    self.parse_call(name)
                } else {
                    self.advance();
                    Ok(RawNode::tagged("Variable", vec![RawNode::Name(name)]))
                }
            }
            TokenType::LeftParen => self.parse_paren_or_pattern(),
            _ => Err(self.error_here("expected expression")),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<RawNode> {
        self.advance(); // function name
        self.advance(); // '('
        let distinct = self.match_token(&TokenType::Distinct);
        let mut star = false;
        let mut args = Vec::new();
        if self.match_token(&TokenType::Asterisk) {
            star = true;
        } else if !self.check(&TokenType::RightParen) {
            args.push(self.parse_expr()?);
            while self.match_token(&TokenType::Comma) {
                args.push(self.parse_expr()?);
            }
        }
        self.consume(&TokenType::RightParen, "expected ')' closing call")?;
        Ok(RawNode::tagged(
            "Call",
            vec![
                RawNode::Name(name),
                RawNode::Bool(distinct),
                RawNode::Bool(star),
                RawNode::List(args),
            ],
        ))
    }

    fn parse_case(&mut self) -> Result<RawNode> {
        let input = if self.check(&TokenType::When) {
            RawNode::Empty
        } else {
            self.parse_expr()?
        };
        let mut branches = Vec::new();
        while self.match_token(&TokenType::When) {
            let condition = self.parse_expr()?;
            self.consume(&TokenType::Then, "expected THEN after WHEN condition")?;
            let value = self.parse_expr()?;
            branches.push(RawNode::List(vec![condition, value]));
        }
        if branches.is_empty() {
            return Err(self.error_here("CASE requires at least one WHEN branch"));
        }
        let default = if self.match_token(&TokenType::Else) {
            self.parse_expr()?
        } else {
            RawNode::Empty
        };
        self.consume(&TokenType::End, "expected END closing CASE")?;
        Ok(RawNode::tagged(
            "Case",
            vec![input, RawNode::List(branches), default],
        ))
    }

    fn parse_list_or_comprehension(&mut self) -> Result<RawNode> {
        // `[x IN expr ...]` is a comprehension; anything else is a literal.
        if let TokenType::Identifier(var) = self.peek().token_type.clone() {
            if self.peek_at(1) == &TokenType::In {
                self.advance();
                self.advance();
                let source = self.parse_expr()?;
                let filter = if self.match_token(&TokenType::Where) {
                    self.parse_expr()?
                } else {
                    RawNode::Empty
                };
                let map = if self.match_token(&TokenType::Pipe) {
                    self.parse_expr()?
                } else {
                    RawNode::Empty
                };
                self.consume(
                    &TokenType::RightBracket,
                    "expected ']' closing list comprehension",
                )?;
                return Ok(RawNode::tagged(
                    "ListComprehension",
                    vec![RawNode::Name(var), source, filter, map],
                ));
            }
        }
        let mut items = Vec::new();
        if !self.check(&TokenType::RightBracket) {
            items.push(self.parse_expr()?);
            while self.match_token(&TokenType::Comma) {
                items.push(self.parse_expr()?);
            }
        }
        self.consume(&TokenType::RightBracket, "expected ']' closing list")?;
        Ok(RawNode::tagged("ListLiteral", items))
    }

    fn parse_quantified(&mut self) -> Result<RawNode> {
        let kind = match self.advance().token_type {
            TokenType::All => "all",
            TokenType::Any => "any",
            TokenType::NoneKw => "none",
            TokenType::Single => "single",
            _ => return Err(self.error_here("expected quantifier")),
        };
        self.consume(&TokenType::LeftParen, "expected '(' after quantifier")?;
        let var = self.identifier("expected variable in quantifier")?;
        self.consume(&TokenType::In, "expected IN in quantifier")?;
        let source = self.parse_expr()?;
        let filter = if self.match_token(&TokenType::Where) {
            self.parse_expr()?
        } else {
            RawNode::Empty
        };
        self.consume(&TokenType::RightParen, "expected ')' closing quantifier")?;
        Ok(RawNode::tagged(
            "Quantified",
            vec![
                RawNode::Symbol(kind.to_string()),
                RawNode::Name(var),
                source,
                filter,
            ],
        ))
    }

    /// Disambiguates `(expr)` from a pattern used as a predicate, e.g.
    /// `WHERE (a)-[:KNOWS]->(b)`. A pattern parse is attempted first and
    /// kept only when it is structurally a pattern (has a chain, label, or
    /// property map); a bare `(name)` stays a parenthesized variable.
    fn parse_paren_or_pattern(&mut self) -> Result<RawNode> {
        let saved = self.pos;
        if let Ok(element) = self.parse_pattern_element() {
            let is_pattern = match element.args() {
                [node, RawNode::List(chains)] => {
                    !chains.is_empty() || node.args().iter().skip(1).any(|a| !a.is_empty())
                }
                _ => false,
            };
            if is_pattern {
                // Pattern used in expression position: the 2-tuple shape
                // of the RelationshipsPattern grammar artifact.
                return Ok(RawNode::tagged("RelationshipsPattern", vec![element]));
            }
        }
        self.pos = saved;
        self.consume(&TokenType::LeftParen, "expected '('")?;
        let expr = self.parse_expr()?;
        self.consume(&TokenType::RightParen, "expected ')' closing expression")?;
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_node_match_parses() {
        let raw = parse("MATCH (n:Person {name: 'Bob'}) RETURN DISTINCT n").unwrap();
        assert_eq!(raw.tag(), Some("SingleQuery"));
        let clauses = raw.args();
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].tag(), Some("Match"));
        assert_eq!(clauses[1].tag(), Some("Return"));
        // RETURN DISTINCT flag
        assert_eq!(clauses[1].args()[0], RawNode::Bool(true));
    }

    #[test]
    fn chain_links_use_three_tuple_relationships_pattern() {
        let raw = parse("MATCH (a)-[r:KNOWS]->(b) RETURN a").unwrap();
        let match_clause = &raw.args()[0];
        let pattern = &match_clause.args()[1];
        let part = &pattern.args()[0];
        assert_eq!(part.tag(), Some("AnonymousPatternPart"));
        let element = &part.args()[0];
        let chains = match &element.args()[1] {
            RawNode::List(chains) => chains,
            other => panic!("expected chain list, got {other:?}"),
        };
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].tag(), Some("RelationshipsPattern"));
        assert_eq!(chains[0].len(), 3);
    }

    #[test]
    fn where_pattern_uses_two_tuple_relationships_pattern() {
        let raw = parse("MATCH (a), (b) WHERE (a)-[:KNOWS]->(b) RETURN a").unwrap();
        let match_clause = &raw.args()[0];
        let where_clause = &match_clause.args()[2];
        assert_eq!(where_clause.tag(), Some("Where"));
        let predicate = &where_clause.args()[0];
        assert_eq!(predicate.tag(), Some("RelationshipsPattern"));
        assert_eq!(predicate.len(), 2);
    }

    #[test]
    fn parenthesized_variable_is_not_a_pattern() {
        let raw = parse("MATCH (a) WHERE (a) = 'x' RETURN a").unwrap();
        let where_clause = &raw.args()[0].args()[2];
        let predicate = &where_clause.args()[0];
        assert_eq!(predicate.tag(), Some("Eq"));
        assert_eq!(predicate.args()[0].tag(), Some("Variable"));
    }

    #[test]
    fn graph_handle_wraps_pattern_part() {
        let raw = parse("MATCH g: (a)-[]->(b) RETURN a").unwrap();
        let part = &raw.args()[0].args()[1].args()[0];
        assert_eq!(part.tag(), Some("GraphPatternPart"));
        assert_eq!(part.args()[0].as_name(), Some("g"));
    }

    #[test]
    fn operator_precedence_nests_correctly() {
        let raw = parse("MATCH (a) WHERE 1 + 2 * 3 = 7 AND NOT a.x IS NULL RETURN a").unwrap();
        let predicate = &raw.args()[0].args()[2].args()[0];
        assert_eq!(predicate.tag(), Some("And"));
        let eq = &predicate.args()[0];
        assert_eq!(eq.tag(), Some("Eq"));
        let add = &eq.args()[0];
        assert_eq!(add.tag(), Some("Add"));
        assert_eq!(add.args()[1].tag(), Some("Mul"));
    }

    #[test]
    fn power_is_right_associative() {
        let raw = parse("MATCH (a) WHERE 2 ^ 3 ^ 2 = 512 RETURN a").unwrap();
        let eq = &raw.args()[0].args()[2].args()[0];
        let pow = &eq.args()[0];
        assert_eq!(pow.tag(), Some("Pow"));
        assert_eq!(pow.args()[1].tag(), Some("Pow"));
    }

    #[test]
    fn syntax_error_reports_position() {
        let err = parse("MATCH (n RETURN n").unwrap_err();
        match err {
            QuiverError::Syntax { line, column, .. } => {
                assert_eq!(line, 1);
                assert!(column > 1);
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn no_partial_results_on_failure() {
        assert!(parse("MATCH (a)-[r]->(b)").is_err()); // missing RETURN
        assert!(parse("RETURN").is_err());
    }

    #[test]
    fn case_and_comprehension_parse() {
        let raw = parse(
            "MATCH (a) RETURN CASE WHEN a.x > 1 THEN 'big' ELSE 'small' END, \
             [y IN [1, 2, 3] WHERE y > 1 | y * 2] AS doubled",
        )
        .unwrap();
        let items = &raw.args()[1].args()[1];
        assert_eq!(items.tag(), Some("ReturnItems"));
        let first = &items.args()[1];
        assert_eq!(first.args()[0].tag(), Some("Case"));
        let second = &items.args()[2];
        assert_eq!(second.args()[0].tag(), Some("ListComprehension"));
    }

    #[test]
    fn quantifier_parses() {
        let raw = parse("MATCH (a) WHERE any(x IN [1,2] WHERE x = 1) RETURN a").unwrap();
        let predicate = &raw.args()[0].args()[2].args()[0];
        assert_eq!(predicate.tag(), Some("Quantified"));
        assert_eq!(predicate.args()[0], RawNode::Symbol("any".to_string()));
    }

    #[test]
    fn order_skip_limit_parse() {
        let raw = parse("MATCH (a) RETURN a ORDER BY a DESC SKIP 5 LIMIT 10").unwrap();
        let ret = &raw.args()[1];
        assert_eq!(ret.args()[2].tag(), Some("Order"));
        let sort = &ret.args()[2].args()[0];
        assert_eq!(sort.args()[1], RawNode::Bool(false));
        assert_eq!(ret.args()[3].tag(), Some("Skip"));
        assert_eq!(ret.args()[4].tag(), Some("Limit"));
    }
}
