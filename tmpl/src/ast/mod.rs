pub mod expr;

use std::ops::Range;

pub use expr::{BinaryOperator, CompareOperator, Const, Expr, Operand, UnaryOperator};

/// Assignment target of a `for` loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    /// `for key, value in ...`
    Tuple(Vec<String>),
}

/// A statement-level template node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal template data.
    Text(String),
    /// `{{ expr }}`
    Output { expr: Expr, span: Range<usize> },
    /// `{% if %}`. An `elif` chain is nested inside `else_`.
    If {
        test: Expr,
        body: Vec<Node>,
        else_: Vec<Node>,
        span: Range<usize>,
    },
    /// `{% for target in iter %}`; `else_` renders when the iterable is empty.
    For {
        target: Target,
        iter: Expr,
        body: Vec<Node>,
        else_: Vec<Node>,
        /// Whether the body sees a `loop` variable for this loop. Generated
        /// loops leave it unset so an enclosing `loop` stays visible.
        bind_loop: bool,
        span: Range<usize>,
    },
    /// A named, overridable fragment.
    Block {
        name: String,
        body: Vec<Node>,
        span: Range<usize>,
    },
    /// `{% extends expr %}`
    Extends { template: Expr, span: Range<usize> },
    /// `{% set name = expr %}`
    Set {
        target: String,
        value: Expr,
        span: Range<usize>,
    },
}

impl Node {
    pub fn span(&self) -> Option<&Range<usize>> {
        match self {
            Node::Text(_) => None,
            Node::Output { span, .. }
            | Node::If { span, .. }
            | Node::For { span, .. }
            | Node::Block { span, .. }
            | Node::Extends { span, .. }
            | Node::Set { span, .. } => Some(span),
        }
    }
}

/// Collect every block declared in `nodes`, outer blocks before the blocks they contain.
pub fn collect_blocks<'a>(nodes: &'a [Node], out: &mut Vec<(&'a str, &'a [Node])>) {
    for node in nodes {
        match node {
            Node::Block { name, body, .. } => {
                out.push((name.as_str(), body.as_slice()));
                collect_blocks(body, out);
            }
            Node::If { body, else_, .. } | Node::For { body, else_, .. } => {
                collect_blocks(body, out);
                collect_blocks(else_, out);
            }
            Node::Text(_) | Node::Output { .. } | Node::Extends { .. } | Node::Set { .. } => {}
        }
    }
}
