pub mod orderblocks;

pub use orderblocks::OrderBlocks;

use crate::ast::Node;
use crate::parser::{ParseError, Parser};

/// A custom tag handler plugged into the parser.
pub trait Extension {
    /// Identifier used in configuration files.
    fn name(&self) -> &'static str;

    /// Tag keywords this extension handles.
    fn tags(&self) -> &'static [&'static str];

    /// Parse one occurrence of a tag.
    ///
    /// Called with the current token on the tag name. Must leave the stream
    /// on the `%}` that closes the tag (or its end tag).
    fn parse(&self, parser: &mut Parser<'_>) -> Result<Node, ParseError>;
}

/// The extensions active for an environment.
#[derive(Default)]
pub struct Extensions {
    extensions: Vec<Box<dyn Extension>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extension: impl Extension + 'static) {
        self.extensions.push(Box::new(extension));
    }

    pub fn register_boxed(&mut self, extension: Box<dyn Extension>) {
        self.extensions.push(extension);
    }

    /// Find the extension handling `tag`. Later registrations win.
    pub fn lookup(&self, tag: &str) -> Option<&dyn Extension> {
        self.extensions
            .iter()
            .rev()
            .find(|ext| ext.tags().iter().any(|t| *t == tag))
            .map(|ext| &**ext)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.extensions.iter().map(|ext| ext.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Instantiate a built-in extension by its configuration name.
pub fn builtin(name: &str) -> Option<Box<dyn Extension>> {
    match name {
        "orderblocks" => Some(Box::new(OrderBlocks)),
        _ => None,
    }
}
