//! Character-level lexer for the graph-pattern query surface.
//!
//! Produces a flat token stream with line/column positions so the parser
//! can report the furthest point it matched. Keywords are recognized
//! case-insensitively; identifiers may be backquoted to escape reserved
//! words or unusual characters.

use std::iter::Peekable;
use std::str::Chars;

use crate::error::{QuiverError, Result};

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Keywords
    Match,
    Optional,
    Where,
    With,
    Return,
    Distinct,
    Order,
    By,
    Asc,
    Desc,
    Skip,
    Limit,
    And,
    Or,
    Xor,
    Not,
    In,
    Starts,
    Ends,
    Contains,
    Is,
    As,
    Case,
    When,
    Then,
    Else,
    End,
    All,
    Any,
    NoneKw,
    Single,
    Exists,
    Null,
    True,
    False,

    // Symbols
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Colon,
    Semicolon,
    Comma,
    Dot,
    Pipe,
    Asterisk,

    // Arrows and dashes for relationship patterns
    LeftArrow,
    RightArrow,
    Dash,

    // Operators
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Slash,
    Percent,
    Caret,
    RegexMatch,

    // Literals
    String(String),
    Integer(i64),
    Float(f64),

    // Names
    Identifier(String),
    Parameter(String),

    Eof,
}

/// A token with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The token kind and payload.
    pub token_type: TokenType,
    /// 1-based source line.
    pub line: usize,
    /// 1-based source column.
    pub column: usize,
}

/// Streaming lexer over a query string.
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer over the given input.
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    /// Consumes the input and returns the full token stream, terminated by
    /// an [`TokenType::Eof`] token.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        tokens.push(Token {
            token_type: TokenType::Eof,
            line: self.line,
            column: self.column,
        });
        Ok(tokens)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        match c {
            Some('\n') => {
                self.line += 1;
                self.column = 1;
            }
            Some(_) => self.column += 1,
            None => {}
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        loop {
            match self.advance() {
                Some('*') if self.chars.peek() == Some(&'/') => {
                    self.advance();
                    return Ok(());
                }
                Some(_) => {}
                None => {
                    return Err(QuiverError::syntax(
                        self.line,
                        self.column,
                        "unterminated block comment",
                    ))
                }
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_whitespace();

        let line = self.line;
        let column = self.column;
        let c = match self.advance() {
            Some(c) => c,
            None => return Ok(None),
        };

        if c == '/' {
            match self.chars.peek() {
                Some('/') => {
                    self.advance();
                    self.skip_line_comment();
                    return self.next_token();
                }
                Some('*') => {
                    self.advance();
                    self.skip_block_comment()?;
                    return self.next_token();
                }
                _ => return Ok(Some(self.token(TokenType::Slash, line, column))),
            }
        }

        if c == '\'' || c == '"' {
            return Ok(Some(self.read_string(c, line, column)?));
        }
        if c == '`' {
            return Ok(Some(self.read_backquoted(line, column)?));
        }
        if c.is_ascii_digit() {
            return Ok(Some(self.read_number(c, line, column)?));
        }
        if c == '$' {
            return Ok(Some(self.read_parameter(line, column)?));
        }
        if c.is_alphabetic() || c == '_' {
            return Ok(Some(self.read_word(c, line, column)));
        }

        let token_type = match c {
            '(' => TokenType::LeftParen,
            ')' => TokenType::RightParen,
            '[' => TokenType::LeftBracket,
            ']' => TokenType::RightBracket,
            '{' => TokenType::LeftBrace,
            '}' => TokenType::RightBrace,
            ':' => TokenType::Colon,
            ';' => TokenType::Semicolon,
            ',' => TokenType::Comma,
            '.' => TokenType::Dot,
            '|' => TokenType::Pipe,
            '*' => TokenType::Asterisk,
            '+' => TokenType::Plus,
            '%' => TokenType::Percent,
            '^' => TokenType::Caret,
            '-' => {
                if self.chars.peek() == Some(&'>') {
                    self.advance();
                    TokenType::RightArrow
                } else {
                    TokenType::Dash
                }
            }
            '<' => match self.chars.peek() {
                Some('-') => {
                    self.advance();
                    TokenType::LeftArrow
                }
                Some('>') => {
                    self.advance();
                    TokenType::Ne
                }
                Some('=') => {
                    self.advance();
                    TokenType::Le
                }
                _ => TokenType::Lt,
            },
            '>' => {
                if self.chars.peek() == Some(&'=') {
                    self.advance();
                    TokenType::Ge
                } else {
                    TokenType::Gt
                }
            }
            '=' => {
                if self.chars.peek() == Some(&'~') {
                    self.advance();
                    TokenType::RegexMatch
                } else {
                    TokenType::Eq
                }
            }
            '!' => {
                if self.chars.peek() == Some(&'=') {
                    self.advance();
                    TokenType::Ne
                } else {
                    return Err(QuiverError::syntax(line, column, "unexpected character '!'"));
                }
            }
            other => {
                return Err(QuiverError::syntax(
                    line,
                    column,
                    format!("unexpected character '{other}'"),
                ))
            }
        };

        Ok(Some(self.token(token_type, line, column)))
    }

    fn token(&self, token_type: TokenType, line: usize, column: usize) -> Token {
        Token {
            token_type,
            line,
            column,
        }
    }

    fn read_string(&mut self, quote: char, line: usize, column: usize) -> Result<Token> {
        let mut value = String::new();
        loop {
            match self.advance() {
                Some(c) if c == quote => {
                    // Doubled quote escapes itself inside the literal.
                    if self.chars.peek() == Some(&quote) {
                        self.advance();
                        value.push(quote);
                    } else {
                        return Ok(self.token(TokenType::String(value), line, column));
                    }
                }
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('\\') => value.push('\\'),
                    Some(c) => value.push(c),
                    None => {
                        return Err(QuiverError::syntax(
                            line,
                            column,
                            "unterminated string literal",
                        ))
                    }
                },
                Some(c) => value.push(c),
                None => {
                    return Err(QuiverError::syntax(
                        line,
                        column,
                        "unterminated string literal",
                    ))
                }
            }
        }
    }

    fn read_backquoted(&mut self, line: usize, column: usize) -> Result<Token> {
        let mut value = String::new();
        loop {
            match self.advance() {
                Some('`') => {
                    if self.chars.peek() == Some(&'`') {
                        self.advance();
                        value.push('`');
                    } else {
                        return Ok(self.token(TokenType::Identifier(value), line, column));
                    }
                }
                Some(c) => value.push(c),
                None => {
                    return Err(QuiverError::syntax(
                        line,
                        column,
                        "unterminated backquoted name",
                    ))
                }
            }
        }
    }

    fn read_number(&mut self, first: char, line: usize, column: usize) -> Result<Token> {
        let mut text = String::from(first);
        let mut is_float = false;
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else if c == '.' && !is_float {
                // Lookahead so `1.prop` and `1..2` are not consumed as floats.
                let mut clone = self.chars.clone();
                clone.next();
                match clone.peek() {
                    Some(d) if d.is_ascii_digit() => {
                        is_float = true;
                        text.push(c);
                        self.advance();
                    }
                    _ => break,
                }
            } else if (c == 'e' || c == 'E') && !text.ends_with(['e', 'E']) {
                let mut clone = self.chars.clone();
                clone.next();
                match clone.peek() {
                    Some(d) if d.is_ascii_digit() || *d == '+' || *d == '-' => {
                        is_float = true;
                        text.push(c);
                        self.advance();
                        if let Some(&sign @ ('+' | '-')) = self.chars.peek() {
                            text.push(sign);
                            self.advance();
                        }
                    }
                    _ => break,
                }
            } else {
                break;
            }
        }
        let token_type = if is_float {
            let value = text.parse::<f64>().map_err(|e| {
                QuiverError::syntax(line, column, format!("invalid float literal '{text}': {e}"))
            })?;
            TokenType::Float(value)
        } else {
            let value = text.parse::<i64>().map_err(|e| {
                QuiverError::syntax(line, column, format!("invalid integer literal '{text}': {e}"))
            })?;
            TokenType::Integer(value)
        };
        Ok(self.token(token_type, line, column))
    }

    fn read_parameter(&mut self, line: usize, column: usize) -> Result<Token> {
        let mut name = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(QuiverError::syntax(
                line,
                column,
                "expected parameter name after '$'",
            ));
        }
        Ok(self.token(TokenType::Parameter(name), line, column))
    }

    fn read_word(&mut self, first: char, line: usize, column: usize) -> Token {
        let mut word = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let token_type = match word.to_ascii_uppercase().as_str() {
            "MATCH" => TokenType::Match,
            "OPTIONAL" => TokenType::Optional,
            "WHERE" => TokenType::Where,
            "WITH" => TokenType::With,
            "RETURN" => TokenType::Return,
            "DISTINCT" => TokenType::Distinct,
            "ORDER" => TokenType::Order,
            "BY" => TokenType::By,
            "ASC" | "ASCENDING" => TokenType::Asc,
            "DESC" | "DESCENDING" => TokenType::Desc,
            "SKIP" => TokenType::Skip,
            "LIMIT" => TokenType::Limit,
            "AND" => TokenType::And,
            "OR" => TokenType::Or,
            "XOR" => TokenType::Xor,
            "NOT" => TokenType::Not,
            "IN" => TokenType::In,
            "STARTS" => TokenType::Starts,
            "ENDS" => TokenType::Ends,
            "CONTAINS" => TokenType::Contains,
            "IS" => TokenType::Is,
            "AS" => TokenType::As,
            "CASE" => TokenType::Case,
            "WHEN" => TokenType::When,
            "THEN" => TokenType::Then,
            "ELSE" => TokenType::Else,
            "END" => TokenType::End,
            "ALL" => TokenType::All,
            "ANY" => TokenType::Any,
            "NONE" => TokenType::NoneKw,
            "SINGLE" => TokenType::Single,
            "EXISTS" => TokenType::Exists,
            "NULL" => TokenType::Null,
            "TRUE" => TokenType::True,
            "FALSE" => TokenType::False,
            _ => TokenType::Identifier(word),
        };
        self.token(token_type, line, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenType> {
        Lexer::new(text)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.token_type)
            .collect()
    }

    #[test]
    fn arrows_lex_greedily() {
        assert_eq!(
            kinds("-[r]-> <-[s]- --> <-- --"),
            vec![
                TokenType::Dash,
                TokenType::LeftBracket,
                TokenType::Identifier("r".into()),
                TokenType::RightBracket,
                TokenType::RightArrow,
                TokenType::LeftArrow,
                TokenType::LeftBracket,
                TokenType::Identifier("s".into()),
                TokenType::RightBracket,
                TokenType::Dash,
                TokenType::Dash,
                TokenType::RightArrow,
                TokenType::LeftArrow,
                TokenType::Dash,
                TokenType::Dash,
                TokenType::Dash,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            kinds("match RETURN DiStInCt"),
            vec![
                TokenType::Match,
                TokenType::Return,
                TokenType::Distinct,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn string_escapes_and_doubling() {
        assert_eq!(
            kinds(r#"'it''s' "a\tb""#),
            vec![
                TokenType::String("it's".into()),
                TokenType::String("a\tb".into()),
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn backquoted_identifier() {
        assert_eq!(
            kinds("`an odd``name`"),
            vec![TokenType::Identifier("an odd`name".into()), TokenType::Eof]
        );
    }

    #[test]
    fn numbers_and_property_access() {
        assert_eq!(
            kinds("42 3.5 1e3 a.b"),
            vec![
                TokenType::Integer(42),
                TokenType::Float(3.5),
                TokenType::Float(1000.0),
                TokenType::Identifier("a".into()),
                TokenType::Dot,
                TokenType::Identifier("b".into()),
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn parameters() {
        assert_eq!(
            kinds("$NAME = 'Bob'"),
            vec![
                TokenType::Parameter("NAME".into()),
                TokenType::Eq,
                TokenType::String("Bob".into()),
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn positions_track_lines() {
        let tokens = Lexer::new("MATCH\n  (n)").tokenize().unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }

    #[test]
    fn unterminated_string_is_syntax_error() {
        assert!(Lexer::new("'abc").tokenize().is_err());
    }
}
