pub mod ast;
pub mod ext;
pub mod parser;

pub use ext::{Extension, Extensions};
pub use parser::{ParseError, Parser, SyntaxConfig, parse};

use crate::ast::{Expr, Node};

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Top-level nodes in source order.
    pub body: Vec<Node>,
    /// The source file ID (for error reporting with codespan-reporting).
    pub source_id: usize,
}

impl Template {
    /// Every block declared in the template, in declaration order.
    pub fn blocks(&self) -> Vec<(&str, &[Node])> {
        let mut blocks = Vec::new();
        ast::collect_blocks(&self.body, &mut blocks);
        blocks
    }

    /// The parent template expression of a top-level `{% extends %}`.
    pub fn parent(&self) -> Option<(&Expr, &std::ops::Range<usize>)> {
        self.body.iter().find_map(|node| match node {
            Node::Extends { template, span } => Some((template, span)),
            _ => None,
        })
    }
}
