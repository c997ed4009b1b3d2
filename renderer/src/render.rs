use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use tmpl::Template;
use tmpl::ast::{Node, Target};
use tracing::trace;

use crate::context::Context;
use crate::error::{DiagnosticError, RenderError};
use crate::evaluator::evaluate;
use crate::value::Value;

/// The effective definition of every block across an inheritance chain.
pub struct BlockRegistry {
    blocks: HashMap<String, BlockEntry>,
}

struct BlockEntry {
    body: Vec<Node>,
    source_id: usize,
}

impl BlockRegistry {
    /// Build from an inheritance chain ordered child first: the most derived
    /// template defining a block wins.
    pub fn from_chain<'t>(chain: impl IntoIterator<Item = &'t Template>) -> Self {
        let mut blocks = HashMap::new();
        for template in chain {
            for (name, body) in template.blocks() {
                blocks.entry(name.to_string()).or_insert_with(|| BlockEntry {
                    body: body.to_vec(),
                    source_id: template.source_id,
                });
            }
        }
        BlockRegistry { blocks }
    }

    pub fn get(&self, name: &str) -> Option<(&[Node], usize)> {
        self.blocks
            .get(name)
            .map(|entry| (entry.body.as_slice(), entry.source_id))
    }

    pub fn block_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.blocks.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Walks template nodes and writes their output.
pub struct Renderer<'a> {
    registry: &'a BlockRegistry,
    ctx: Context,
    output: &'a mut dyn Write,
    source_id: usize,
}

impl<'a> Renderer<'a> {
    pub fn new(
        registry: &'a BlockRegistry,
        ctx: Context,
        output: &'a mut dyn Write,
        source_id: usize,
    ) -> Self {
        Renderer {
            registry,
            ctx,
            output,
            source_id,
        }
    }

    pub fn render(&mut self, nodes: &[Node]) -> Result<(), DiagnosticError> {
        for node in nodes {
            self.render_node(node)
                .map_err(|e| e.or_at(node.span(), self.source_id))?;
        }
        Ok(())
    }

    fn render_node(&mut self, node: &Node) -> Result<(), DiagnosticError> {
        match node {
            Node::Text(text) => self.write(text),
            Node::Output { expr, .. } => {
                let value = evaluate(expr, &self.ctx, self.source_id)?;
                self.write(&value.to_string())
            }
            Node::If {
                test, body, else_, ..
            } => {
                if evaluate(test, &self.ctx, self.source_id)?.is_truthy() {
                    self.render(body)
                } else {
                    self.render(else_)
                }
            }
            Node::For {
                target,
                iter,
                body,
                else_,
                bind_loop,
                ..
            } => {
                let items = evaluate(iter, &self.ctx, self.source_id)?
                    .iter_items()
                    .map_err(|e| self.locate(e, iter.span()))?;
                if items.is_empty() {
                    return self.render(else_);
                }
                self.ctx.push_frame();
                let result = self.render_loop(target, items, body, *bind_loop);
                self.ctx.pop_frame();
                result
            }
            Node::Block { name, body, .. } => self.render_block(name, body),
            Node::Set { target, value, .. } => {
                let value = evaluate(value, &self.ctx, self.source_id)?;
                self.ctx.set(target, value);
                Ok(())
            }
            // Resolved by the environment before rendering starts
            Node::Extends { .. } => Ok(()),
        }
    }

    fn render_loop(
        &mut self,
        target: &Target,
        items: Vec<Value>,
        body: &[Node],
        bind_loop: bool,
    ) -> Result<(), DiagnosticError> {
        let length = items.len();
        for (index, item) in items.into_iter().enumerate() {
            self.bind_target(target, item)?;
            if bind_loop {
                self.ctx.set("loop", loop_info(index, length));
            }
            self.render(body)?;
        }
        Ok(())
    }

    fn bind_target(&mut self, target: &Target, item: Value) -> Result<(), DiagnosticError> {
        match target {
            Target::Name(name) => {
                self.ctx.set(name, item);
                Ok(())
            }
            Target::Tuple(names) => {
                let values = item.iter_items()?;
                if values.len() != names.len() {
                    return Err(RenderError::UnpackMismatch {
                        expected: names.len(),
                        got: values.len(),
                    }
                    .into());
                }
                for (name, value) in names.iter().zip(values) {
                    self.ctx.set(name, value);
                }
                Ok(())
            }
        }
    }

    /// Render the most derived definition of block `name`.
    fn render_block(&mut self, name: &str, own_body: &[Node]) -> Result<(), DiagnosticError> {
        let registry = self.registry;
        let Some((body, source_id)) = registry.get(name) else {
            return self.render(own_body);
        };
        trace!(block = name, source_id, "render block");

        let outer = std::mem::replace(&mut self.source_id, source_id);
        let result = self.render(body);
        self.source_id = outer;
        result
    }

    fn write(&mut self, s: &str) -> Result<(), DiagnosticError> {
        self.output
            .write_all(s.as_bytes())
            .map_err(|e| DiagnosticError::from(RenderError::IoError(e.to_string())))
    }

    fn locate(&self, error: RenderError, span: Option<std::ops::Range<usize>>) -> DiagnosticError {
        let err = DiagnosticError::from(error);
        err.or_at(span.as_ref(), self.source_id)
    }
}

/// The `loop` variable available inside `for` bodies.
fn loop_info(index: usize, length: usize) -> Value {
    let mut info = BTreeMap::new();
    info.insert("index".to_string(), Value::Int(index as i64 + 1));
    info.insert("index0".to_string(), Value::Int(index as i64));
    info.insert("first".to_string(), Value::Bool(index == 0));
    info.insert("last".to_string(), Value::Bool(index + 1 == length));
    info.insert("length".to_string(), Value::Int(length as i64));
    Value::Map(info)
}
