pub mod error;
pub mod expression;
pub mod lexer;
mod statement;

pub use error::ParseError;
pub use lexer::{Spanned, Token, TokenKind};

use std::collections::HashSet;
use std::ops::Range;

use tracing::debug;

use crate::Template;
use crate::ast::Node;
use crate::ext::Extensions;

/// Lexer options shared by every template of an environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyntaxConfig {
    /// Remove the first newline after a block or comment tag.
    pub trim_blocks: bool,
    /// Keep a single trailing newline at the end of the source.
    pub keep_trailing_newline: bool,
}

/// Parse a template source into a [`Template`].
pub fn parse(
    source: &str,
    file_id: usize,
    extensions: &Extensions,
    config: &SyntaxConfig,
) -> Result<Template, ParseError> {
    Parser::new(source, file_id, extensions, config)?.parse()
}

/// Recursive-descent template parser.
///
/// Extensions receive `&mut Parser` with the current token positioned on
/// their tag name and drive it through the public methods below.
pub struct Parser<'a> {
    tokens: Vec<Spanned>,
    pos: usize,
    file_id: usize,
    extensions: &'a Extensions,
    /// End tags of the statements currently being parsed, innermost last.
    end_token_stack: Vec<Vec<&'static str>>,
    free_ids: usize,
}

impl<'a> Parser<'a> {
    pub fn new(
        source: &str,
        file_id: usize,
        extensions: &'a Extensions,
        config: &SyntaxConfig,
    ) -> Result<Self, ParseError> {
        let tokens = lexer::tokenize(source, file_id, config)?;
        Ok(Parser {
            tokens,
            pos: 0,
            file_id,
            extensions,
            end_token_stack: Vec::new(),
            free_ids: 0,
        })
    }

    /// Parse the whole token stream into a Template.
    pub fn parse(mut self) -> Result<Template, ParseError> {
        let body = self.subparse(None)?;

        // Checked on the finished tree: blocks an extension discarded while
        // parsing do not count.
        let mut seen = HashSet::new();
        if let Some((name, span)) = find_duplicate_block(&body, &mut seen) {
            let lineno = self
                .tokens
                .iter()
                .find(|t| t.span.start >= span.start)
                .map_or(1, |t| t.lineno);
            return Err(ParseError::syntax(
                format!("block '{}' defined twice", name),
                span.clone(),
                lineno,
                self.file_id,
            ));
        }

        debug!(
            file_id = self.file_id,
            nodes = body.len(),
            blocks = seen.len(),
            "parsed template"
        );
        Ok(Template {
            body,
            source_id: self.file_id,
        })
    }

    // ------------------------------------------------------------------
    // Token stream
    // ------------------------------------------------------------------

    /// The current token. The stream always ends with `Token::Eof`.
    pub fn current(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    /// The token after the current one.
    pub fn look(&self) -> &Spanned {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    /// Return the current token and advance. Stays on `Eof`.
    pub fn next_token(&mut self) -> Spanned {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    /// End offset of the most recently consumed token.
    pub fn previous_end(&self) -> usize {
        match self.pos.checked_sub(1) {
            Some(prev) => self.tokens[prev].span.end,
            None => 0,
        }
    }

    pub fn current_is(&self, kind: TokenKind) -> bool {
        self.current().token.kind() == kind
    }

    /// True if the current token is the name `name`.
    pub fn current_is_name(&self, name: &str) -> bool {
        matches!(&self.current().token, Token::Name(n) if n == name)
    }

    pub fn skip_if(&mut self, kind: TokenKind) -> bool {
        if self.current_is(kind) {
            self.next_token();
            true
        } else {
            false
        }
    }

    pub fn skip_if_name(&mut self, name: &str) -> bool {
        if self.current_is_name(name) {
            self.next_token();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, kind: TokenKind) -> Result<Spanned, ParseError> {
        if self.current_is(kind) {
            return Ok(self.next_token());
        }
        if self.current_is(TokenKind::Eof) {
            return Err(self.error(format!(
                "unexpected end of template, expected {}",
                kind.describe()
            )));
        }
        Err(self.error(format!(
            "expected token {}, got {}",
            kind.describe(),
            self.current().token.describe()
        )))
    }

    pub fn expect_name(&mut self) -> Result<String, ParseError> {
        match &self.current().token {
            Token::Name(name) => {
                let name = name.clone();
                self.next_token();
                Ok(name)
            }
            other => Err(self.error(format!("expected name, got {}", other.describe()))),
        }
    }

    /// A syntax error located at the current token.
    pub fn error(&self, msg: impl Into<String>) -> ParseError {
        let current = self.current();
        ParseError::syntax(msg, current.span.clone(), current.lineno, self.file_id)
    }

    /// A loop/assignment variable name that template source can never spell.
    pub fn free_identifier(&mut self) -> String {
        let name = format!("$fi{}", self.free_ids);
        self.free_ids += 1;
        name
    }

    pub fn file_id(&self) -> usize {
        self.file_id
    }
}

/// The first block, in declaration order, whose name was already declared.
fn find_duplicate_block<'n>(
    nodes: &'n [Node],
    seen: &mut HashSet<&'n str>,
) -> Option<(&'n str, &'n Range<usize>)> {
    for node in nodes {
        let found = match node {
            Node::Block { name, body, span } => {
                if !seen.insert(name.as_str()) {
                    return Some((name.as_str(), span));
                }
                find_duplicate_block(body, seen)
            }
            Node::If { body, else_, .. } | Node::For { body, else_, .. } => {
                find_duplicate_block(body, seen).or_else(|| find_duplicate_block(else_, seen))
            }
            Node::Text(_) | Node::Output { .. } | Node::Extends { .. } | Node::Set { .. } => None,
        };
        if found.is_some() {
            return found;
        }
    }
    None
}
