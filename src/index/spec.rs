//! Short-form index specification parser.
//!
//! Specs look like `text:node1,node2//tokenize=trigram//name=myidx`:
//! an optional type prefix, a comma-separated column list with optional
//! per-column `/option` suffixes, and `//option[=value]` global options.
//! Identifiers may be backquoted or double-quoted with doubling escapes.
//!
//! Macro modes (`mode:graph`, `mode:triple`, ...) expand to lists of
//! concrete specs via a lookup table. Destructive modes (`clear`,
//! `cleartext`) must be fully qualified with their target graph
//! (`mode:clear:mygraph`); anything less is a configuration error, a
//! deliberate guard against accidental data loss.

use crate::error::{QuiverError, Result};

/// Index families a spec can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFamily {
    /// Standard column index (the default when no prefix is given).
    Standard,
    /// Full-text virtual-table index.
    Text,
    /// Raw passthrough `CREATE INDEX` definition.
    Sql,
    /// Embedding-column vector index.
    Vector,
}

impl SpecFamily {
    /// The spec-string prefix for this family.
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecFamily::Standard => "index",
            SpecFamily::Text => "text",
            SpecFamily::Sql => "sql",
            SpecFamily::Vector => "vector",
        }
    }
}

/// One column with its per-column options, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Ordered `option -> value` pairs; valueless options map to "true".
    pub options: Vec<(String, String)>,
}

/// A parsed index specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index family.
    pub family: SpecFamily,
    /// Ordered column list (empty for `sql` specs).
    pub columns: Vec<ColumnSpec>,
    /// Ordered global options.
    pub options: Vec<(String, String)>,
    /// Verbatim definition text for `sql` specs.
    pub definition: Option<String>,
}

impl IndexSpec {
    /// Looks up a global option value.
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Operational index modes consumed from configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexMode {
    /// Create no indexes.
    None,
    /// Create standard indexes for whatever the current query joins on.
    Auto,
    /// Like `Auto`, plus text indexes where text-match functions occur.
    AutoText,
    /// Only user-declared indexes; never create implicitly.
    Expert,
    /// Drop all indexes on the named graph.
    Clear {
        /// Target graph the indexes are dropped from.
        graph: String,
    },
    /// Drop all text indexes on the named graph.
    ClearText {
        /// Target graph the text indexes are dropped from.
        graph: String,
    },
    /// Concrete index specs to apply, from a macro mode or literal spec.
    Specs(Vec<IndexSpec>),
}

// ---- tokenizer ---------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum SpecToken {
    Text(String),
    Comma,
    LParen,
    RParen,
    Slash,
    DoubleSlash,
    Colon,
    Equals,
}

fn spec_error(message: impl Into<String>) -> QuiverError {
    QuiverError::syntax(1, 1, message.into())
}

fn tokenize_spec(text: &str) -> Result<Vec<SpecToken>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            ',' => {
                chars.next();
                tokens.push(SpecToken::Comma);
            }
            '(' => {
                chars.next();
                tokens.push(SpecToken::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(SpecToken::RParen);
            }
            ':' => {
                chars.next();
                tokens.push(SpecToken::Colon);
            }
            '=' => {
                chars.next();
                tokens.push(SpecToken::Equals);
            }
            '/' => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    tokens.push(SpecToken::DoubleSlash);
                } else {
                    tokens.push(SpecToken::Slash);
                }
            }
            quote @ ('`' | '"') => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => {
                            if chars.peek() == Some(&quote) {
                                chars.next();
                                value.push(quote);
                            } else {
                                break;
                            }
                        }
                        Some(c) => value.push(c),
                        None => {
                            return Err(spec_error("unterminated quoted name in index spec"))
                        }
                    }
                }
                tokens.push(SpecToken::Text(value));
            }
            _ => {
                let mut value = String::new();
                while let Some(&c) = chars.peek() {
                    if matches!(c, ',' | '(' | ')' | ':' | '=' | '/' | '`' | '"')
                        || c.is_whitespace()
                    {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                tokens.push(SpecToken::Text(value));
            }
        }
    }
    Ok(tokens)
}

// ---- parser ------------------------------------------------------------

/// Parses one short-form index spec string.
pub fn parse_index_spec(text: &str) -> Result<IndexSpec> {
    // `sql:` takes the remainder verbatim; tokenizing SQL would mangle it.
    if let Some(rest) = strip_family_prefix(text, "sql") {
        let definition = rest.trim().to_string();
        if definition.is_empty() {
            return Err(spec_error("sql index spec requires a definition"));
        }
        return Ok(IndexSpec {
            family: SpecFamily::Sql,
            columns: Vec::new(),
            options: Vec::new(),
            definition: Some(definition),
        });
    }

    let (family, rest) = if let Some(rest) = strip_family_prefix(text, "index") {
        (SpecFamily::Standard, rest)
    } else if let Some(rest) = strip_family_prefix(text, "text") {
        (SpecFamily::Text, rest)
    } else if let Some(rest) = strip_family_prefix(text, "vector") {
        (SpecFamily::Vector, rest)
    } else {
        (SpecFamily::Standard, text)
    };

    let tokens = tokenize_spec(rest)?;
    let mut parser = SpecParser { tokens, pos: 0 };
    let spec = parser.parse_body(family)?;
    if parser.pos != parser.tokens.len() {
        return Err(spec_error("trailing input after index spec"));
    }
    Ok(spec)
}

fn strip_family_prefix<'a>(text: &'a str, family: &str) -> Option<&'a str> {
    let trimmed = text.trim_start();
    let head = trimmed.get(..family.len())?;
    if head.eq_ignore_ascii_case(family) {
        let rest = &trimmed[family.len()..];
        rest.strip_prefix(':')
    } else {
        None
    }
}

struct SpecParser {
    tokens: Vec<SpecToken>,
    pos: usize,
}

impl SpecParser {
    fn peek(&self) -> Option<&SpecToken> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<SpecToken> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn text(&mut self, what: &str) -> Result<String> {
        match self.next() {
            Some(SpecToken::Text(value)) => Ok(value),
            other => Err(spec_error(format!(
                "expected {what} in index spec, found {other:?}"
            ))),
        }
    }

    fn parse_body(&mut self, family: SpecFamily) -> Result<IndexSpec> {
        let mut columns = vec![self.parse_column()?];
        while self.peek() == Some(&SpecToken::Comma) {
            self.next();
            columns.push(self.parse_column()?);
        }
        let mut options = Vec::new();
        while self.peek() == Some(&SpecToken::DoubleSlash) {
            self.next();
            options.push(self.parse_option()?);
        }
        Ok(IndexSpec {
            family,
            columns,
            options,
            definition: None,
        })
    }

    fn parse_column(&mut self) -> Result<ColumnSpec> {
        let name = self.text("column name")?;
        let mut options = Vec::new();
        if self.peek() == Some(&SpecToken::LParen) {
            self.next();
            options.push(self.parse_option()?);
            while self.peek() == Some(&SpecToken::Comma) {
                self.next();
                options.push(self.parse_option()?);
            }
            match self.next() {
                Some(SpecToken::RParen) => {}
                other => {
                    return Err(spec_error(format!(
                        "expected ')' closing column options, found {other:?}"
                    )))
                }
            }
        }
        while self.peek() == Some(&SpecToken::Slash) {
            self.next();
            options.push(self.parse_option()?);
        }
        Ok(ColumnSpec { name, options })
    }

    fn parse_option(&mut self) -> Result<(String, String)> {
        let name = self.text("option name")?;
        if self.peek() == Some(&SpecToken::Equals) {
            self.next();
            let value = self.text("option value")?;
            Ok((name, value))
        } else {
            Ok((name, "true".to_string()))
        }
    }
}

// ---- macro modes -------------------------------------------------------

/// Expands a macro mode name into its list of concrete spec strings.
/// Returns `None` for operational modes (`auto`, `none`, ...) that do
/// not expand to spec lists.
pub fn expand_index_mode(name: &str) -> Option<Vec<String>> {
    let specs: &[&str] = match name.to_ascii_lowercase().as_str() {
        "graph" => &["index:node1", "index:label", "index:node2"],
        "monograph" => &["index:node1", "index:node2"],
        "valuegraph" => &["index:node2"],
        "textgraph" => &["index:node1", "text:node2//tokenize=trigram"],
        "node1+label" => &["index:node1", "index:label"],
        "triple" => &["index:node1", "index:label", "index:node2"],
        "quad" => &["index:node1", "index:label", "index:node2", "index:id"],
        _ => return None,
    };
    Some(specs.iter().map(|s| s.to_string()).collect())
}

const DESTRUCTIVE_MODES: &[&str] = &["clear", "cleartext"];

/// Parses a `mode:...` string or a literal index spec into an
/// [`IndexMode`].
pub fn parse_index_mode(text: &str) -> Result<IndexMode> {
    let trimmed = text.trim();
    let lowered = trimmed.to_ascii_lowercase();

    if let Some(mode) = lowered.strip_prefix("mode:") {
        let (mode, qualifier) = match mode.split_once(':') {
            Some((mode, qualifier)) => (mode, Some(qualifier)),
            None => (mode, None),
        };
        return match mode {
            "none" => Ok(IndexMode::None),
            "auto" => Ok(IndexMode::Auto),
            "autotext" => Ok(IndexMode::AutoText),
            "expert" => Ok(IndexMode::Expert),
            "clear" => match qualifier {
                Some(graph) if !graph.is_empty() => Ok(IndexMode::Clear {
                    graph: graph.to_string(),
                }),
                _ => Err(QuiverError::Configuration(
                    "destructive index mode 'clear' must be qualified with its \
                     target graph, e.g. 'mode:clear:mygraph'"
                        .into(),
                )),
            },
            "cleartext" => match qualifier {
                Some(graph) if !graph.is_empty() => Ok(IndexMode::ClearText {
                    graph: graph.to_string(),
                }),
                _ => Err(QuiverError::Configuration(
                    "destructive index mode 'cleartext' must be qualified with its \
                     target graph, e.g. 'mode:cleartext:mygraph'"
                        .into(),
                )),
            },
            other => match expand_index_mode(other) {
                Some(specs) => Ok(IndexMode::Specs(
                    specs
                        .iter()
                        .map(|s| parse_index_spec(s))
                        .collect::<Result<Vec<_>>>()?,
                )),
                None => Err(QuiverError::Configuration(format!(
                    "unknown index mode '{other}'"
                ))),
            },
        };
    }

    // Bare mode names are accepted for the non-destructive modes only.
    if DESTRUCTIVE_MODES.contains(&lowered.as_str()) {
        return Err(QuiverError::Configuration(format!(
            "destructive index mode '{lowered}' must be fully qualified, \
             e.g. 'mode:{lowered}:mygraph'"
        )));
    }
    match lowered.as_str() {
        "none" => return Ok(IndexMode::None),
        "auto" => return Ok(IndexMode::Auto),
        "autotext" => return Ok(IndexMode::AutoText),
        "expert" => return Ok(IndexMode::Expert),
        _ => {}
    }
    if let Some(specs) = expand_index_mode(&lowered) {
        return Ok(IndexMode::Specs(
            specs
                .iter()
                .map(|s| parse_index_spec(s))
                .collect::<Result<Vec<_>>>()?,
        ));
    }

    // Anything else is a literal index spec.
    Ok(IndexMode::Specs(vec![parse_index_spec(trimmed)?]))
}
