use tracing::debug;

use crate::ast::{CompareOperator, Expr, Node, Operand, Target};
use crate::ext::Extension;
use crate::parser::{ParseError, Parser};

/// Reorders the blocks it contains.
///
/// Adds `{% orderblocks selection %} ... {% endorderblocks %}`. The argument
/// is a sequence (or any other iterable) of block names giving the order in
/// which the enclosed blocks are rendered. Names left out of the selection
/// are not rendered; names matching no block render nothing. When the
/// selection is undefined or none the blocks render in declaration order.
/// Anything other than a block inside the region is discarded.
///
/// ```text
/// {% orderblocks block_order %}
/// {% block one %}1{% endblock %}
/// {% block two %}2{% endblock %}
/// {% endorderblocks %}
/// ```
///
/// rendered with `block_order = ["two", "one"]` produces `21`.
///
/// The tag compiles to a plain `for` loop, so the enclosed blocks stay
/// regular blocks that child templates can override:
///
/// ```text
/// {% for $fi0 in (selection if selection is defined and not selection is none
///                 else ("one", "two")) %}
///   {% if $fi0 == "one" %}{% block one %}1{% endblock %}{% endif %}
///   {% if $fi0 == "two" %}{% block two %}2{% endblock %}{% endif %}
/// {% endfor %}
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderBlocks;

impl Extension for OrderBlocks {
    fn name(&self) -> &'static str {
        "orderblocks"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["orderblocks"]
    }

    fn parse(&self, parser: &mut Parser<'_>) -> Result<Node, ParseError> {
        let tag = parser.next_token();
        let start = tag.span.start;

        let selection = parser.parse_expression()?;
        let selection_span = selection.span().unwrap_or_else(|| tag.span.clone());

        let loop_var = parser.free_identifier();
        let loop_ref = Expr::Name(loop_var.clone(), tag.span.clone());

        let mut dispatch = Vec::new();
        let mut declared_names = Vec::new();
        for node in parser.parse_statements(&["endorderblocks"], true)? {
            let (name, span) = match &node {
                Node::Block { name, span, .. } => (name.clone(), span.clone()),
                _ => continue,
            };
            let test = Expr::Compare {
                expr: Box::new(loop_ref.clone()),
                ops: vec![Operand {
                    op: CompareOperator::Eq,
                    expr: Expr::str(name.clone()),
                }],
            };
            declared_names.push(Expr::str(name));
            dispatch.push(Node::If {
                test,
                body: vec![node],
                else_: Vec::new(),
                span,
            });
        }

        debug!(
            blocks = declared_names.len(),
            line = tag.lineno,
            "expanded orderblocks"
        );

        let guard = Expr::And(
            Box::new(Expr::test(
                selection.clone(),
                "defined",
                selection_span.clone(),
            )),
            Box::new(Expr::Not(Box::new(Expr::test(
                selection.clone(),
                "none",
                selection_span,
            )))),
        );

        Ok(Node::For {
            target: Target::Name(loop_var),
            iter: Expr::CondExpr {
                test: Box::new(guard),
                expr1: Box::new(selection),
                expr2: Some(Box::new(Expr::Tuple(declared_names))),
            },
            body: dispatch,
            else_: Vec::new(),
            bind_loop: false,
            span: start..parser.previous_end(),
        })
    }
}
