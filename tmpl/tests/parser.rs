use tmpl::ast::{CompareOperator, Const, Expr, Node, Target};
use tmpl::ext::OrderBlocks;
use tmpl::parser::lexer::tokenize;
use tmpl::parser::Token;
use tmpl::{Extension, Extensions, ParseError, Parser, SyntaxConfig, Template};

fn with_orderblocks() -> Extensions {
    let mut extensions = Extensions::new();
    extensions.register(OrderBlocks);
    extensions
}

fn parse(source: &str) -> Template {
    tmpl::parse(source, 0, &with_orderblocks(), &SyntaxConfig::default()).expect("parse failed")
}

fn parse_err(source: &str) -> ParseError {
    tmpl::parse(source, 0, &with_orderblocks(), &SyntaxConfig::default())
        .expect_err("expected a syntax error")
}

fn str_const(expr: &Expr) -> &str {
    match expr {
        Expr::Const(Const::Str(s)) => s,
        other => panic!("expected string constant, got {:?}", other),
    }
}

#[test]
fn orderblocks_expands_to_guarded_loop() {
    let template = parse(
        "{% orderblocks sel %}{% block x %}b{% endblock %}{% block y %}c{% endblock %}{% endorderblocks %}",
    );
    assert_eq!(template.body.len(), 1);

    let Node::For {
        target,
        iter,
        body,
        else_,
        bind_loop,
        ..
    } = &template.body[0]
    else {
        panic!("expected a for loop, got {:?}", template.body[0]);
    };
    assert!(else_.is_empty());
    assert!(!bind_loop);
    let Target::Name(loop_var) = target else {
        panic!("expected a single loop target");
    };

    let Expr::CondExpr { test, expr1, expr2 } = iter else {
        panic!("expected a conditional iterable, got {:?}", iter);
    };
    assert!(matches!(&**expr1, Expr::Name(name, _) if name == "sel"));
    match &**test {
        Expr::And(defined, not_none) => {
            assert!(matches!(&**defined, Expr::Test { name, .. } if name == "defined"));
            assert!(matches!(
                &**not_none,
                Expr::Not(inner) if matches!(&**inner, Expr::Test { name, .. } if name == "none")
            ));
        }
        other => panic!("expected guard conjunction, got {:?}", other),
    }
    match expr2.as_deref() {
        Some(Expr::Tuple(names)) => {
            let names: Vec<&str> = names.iter().map(str_const).collect();
            assert_eq!(names, ["x", "y"]);
        }
        other => panic!("expected declaration-order fallback, got {:?}", other),
    }

    let dispatched: Vec<&str> = body
        .iter()
        .map(|node| match node {
            Node::If {
                test: Expr::Compare { expr, ops },
                body,
                else_,
                ..
            } => {
                assert!(matches!(&**expr, Expr::Name(name, _) if name == loop_var));
                assert_eq!(ops.len(), 1);
                assert_eq!(ops[0].op, CompareOperator::Eq);
                assert!(else_.is_empty());
                match body.as_slice() {
                    [Node::Block { name, .. }] => {
                        assert_eq!(str_const(&ops[0].expr), name);
                        name.as_str()
                    }
                    other => panic!("expected a single block, got {:?}", other),
                }
            }
            other => panic!("expected a dispatch branch, got {:?}", other),
        })
        .collect();
    assert_eq!(dispatched, ["x", "y"]);
}

#[test]
fn loop_variable_cannot_clash_with_template_names() {
    let template = parse(
        "{% orderblocks a %}{% block p %}{% endblock %}{% endorderblocks %}\
         {% orderblocks b %}{% block q %}{% endblock %}{% endorderblocks %}",
    );
    let targets: Vec<&str> = template
        .body
        .iter()
        .map(|node| match node {
            Node::For {
                target: Target::Name(name),
                ..
            } => name.as_str(),
            other => panic!("unexpected node {:?}", other),
        })
        .collect();
    assert_eq!(targets.len(), 2);
    assert_ne!(targets[0], targets[1]);
    assert!(targets.iter().all(|name| name.starts_with('$')));

    // `$` never lexes as part of a name
    let err = parse_err("{{ $fi0 }}");
    assert_eq!(err.message, "unexpected char '$'");
}

#[test]
fn parsing_is_idempotent() {
    let source = "a{% orderblocks order %}{% block x %}{{ x }}{% endblock %}{% endorderblocks %}e";
    assert_eq!(parse(source), parse(source));
}

#[test]
fn non_block_content_is_dropped_at_parse_time() {
    let template = parse(
        "{% orderblocks o %}text{{ value }}{% block only %}{% endblock %}{% set v = 1 %}{% endorderblocks %}",
    );
    let Node::For { body, .. } = &template.body[0] else {
        panic!("expected a for loop");
    };
    assert_eq!(body.len(), 1);
}

#[test]
fn blocks_inside_region_are_registered() {
    let template = parse(
        "{% orderblocks o %}{% block a %}{% endblock %}{% block b %}{% endblock %}{% endorderblocks %}",
    );
    let names: Vec<&str> = template.blocks().iter().map(|(name, _)| *name).collect();
    assert_eq!(names, ["a", "b"]);
}

#[test]
fn missing_end_tag() {
    let err = parse_err("a\n{% orderblocks s %}\n{% block x %}{% endblock %}");
    assert_eq!(err.message, "unexpected end of template, expected 'endorderblocks'");
    assert_eq!(err.lineno, 3);
}

#[test]
fn missing_selection_expression() {
    let err = parse_err("{% orderblocks %}{% endorderblocks %}");
    assert_eq!(err.message, "unexpected end of statement block");
    assert_eq!(err.lineno, 1);

    let err = parse_err("\n\n{% orderblocks a + %}{% endorderblocks %}");
    assert_eq!(err.message, "unexpected end of statement block");
    assert_eq!(err.lineno, 3);
}

#[test]
fn trailing_tokens_after_selection() {
    let err = parse_err("{% orderblocks a b %}{% endorderblocks %}");
    assert_eq!(err.message, "expected token end of statement block, got 'b'");
}

#[test]
fn unknown_tag_without_extension() {
    let err = tmpl::parse(
        "{% orderblocks s %}{% endorderblocks %}",
        0,
        &Extensions::new(),
        &SyntaxConfig::default(),
    )
    .unwrap_err();
    assert_eq!(err.message, "encountered unknown tag 'orderblocks'");
}

#[test]
fn stray_end_tag_mentions_innermost_block() {
    let err = parse_err("{% if x %}{% endorderblocks %}{% endif %}");
    assert_eq!(err.message, "encountered unknown tag 'endorderblocks'");
    assert_eq!(
        err.notes,
        ["the parser was looking for 'elif' or 'else' or 'endif'"]
    );

    let err = parse_err("{% orderblocks s %}{% block a %}{% endorderblocks %}");
    assert_eq!(
        err.notes,
        ["you probably made a nesting mistake; the innermost block that needs to be closed expects 'endblock'"]
    );
}

#[test]
fn duplicate_block_names() {
    let err = parse_err(
        "{% orderblocks s %}\n{% block x %}{% endblock %}\n{% block x %}{% endblock %}{% endorderblocks %}",
    );
    assert_eq!(err.message, "block 'x' defined twice");
    assert_eq!(err.lineno, 3);
}

#[test]
fn blocks_discarded_by_a_region_are_not_duplicates() {
    let template = parse(
        "{% orderblocks s %}{% if x %}{% block a %}1{% endblock %}{% endif %}{% endorderblocks %}\n\
         {% block a %}2{% endblock %}",
    );
    let names: Vec<&str> = template.blocks().iter().map(|(name, _)| *name).collect();
    assert_eq!(names, ["a"]);

    // A nested duplicate is still reported, at the second declaration
    let err = parse_err("{% block a %}\n{% if x %}{% block a %}{% endblock %}{% endif %}{% endblock %}");
    assert_eq!(err.message, "block 'a' defined twice");
    assert_eq!(err.lineno, 2);
}

#[test]
fn regular_loops_bind_loop_variable() {
    let template = parse("{% for x in y %}{{ loop.index }}{% endfor %}");
    assert!(matches!(template.body[0], Node::For { bind_loop: true, .. }));
}

#[test]
fn endblock_may_repeat_the_name() {
    let template = parse("{% block title %}t{% endblock title %}");
    assert_eq!(template.blocks().len(), 1);
}

#[test]
fn expression_precedence() {
    let template = parse("{{ not a == b or c and d }}");
    let Node::Output { expr, .. } = &template.body[0] else {
        panic!("expected output");
    };
    // (not (a == b)) or (c and d)
    match expr {
        Expr::Or(left, right) => {
            assert!(matches!(&**left, Expr::Not(inner) if matches!(&**inner, Expr::Compare { .. })));
            assert!(matches!(&**right, Expr::And(..)));
        }
        other => panic!("unexpected expression {:?}", other),
    }
}

#[test]
fn whitespace_control() {
    let tokens = tokenize("a  {%- if x -%}  b {{- y }}\n", 0, &SyntaxConfig::default()).unwrap();
    let data: Vec<&str> = tokens
        .iter()
        .filter_map(|t| match &t.token {
            Token::Data(text) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(data, ["a", "b"]);
    assert_eq!(tokens.last().map(|t| &t.token), Some(&Token::Eof));
}

#[test]
fn trim_blocks_and_trailing_newline() {
    let config = SyntaxConfig {
        trim_blocks: true,
        keep_trailing_newline: true,
    };
    let tokens = tokenize("{% if x %}\nyes\n{# c #}\nno\n", 0, &config).unwrap();
    let data: Vec<&str> = tokens
        .iter()
        .filter_map(|t| match &t.token {
            Token::Data(text) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(data, ["yes\n", "no\n"]);
}

#[test]
fn unterminated_tags() {
    let err = parse_err("a {% if x ");
    assert_eq!(err.message, "unexpected end of template, expected '%}'");
    let err = parse_err("{# never closed");
    assert_eq!(err.message, "missing end of comment tag");
}

/// Swallows everything up to `{% endignore %}`.
struct Ignore;

impl Extension for Ignore {
    fn name(&self) -> &'static str {
        "ignore"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["ignore"]
    }

    fn parse(&self, parser: &mut Parser<'_>) -> Result<Node, ParseError> {
        parser.next_token();
        parser.parse_statements(&["endignore"], true)?;
        Ok(Node::Text(String::new()))
    }
}

#[test]
fn custom_extensions_share_the_parser_api() {
    let mut extensions = with_orderblocks();
    extensions.register(Ignore);
    assert_eq!(extensions.names(), ["orderblocks", "ignore"]);

    let template = tmpl::parse(
        "{% ignore %}{% block hidden %}{% endblock %}{% endignore %}{% orderblocks o %}{% endorderblocks %}",
        0,
        &extensions,
        &SyntaxConfig::default(),
    )
    .unwrap();
    assert_eq!(template.body.len(), 2);
    assert_eq!(template.body[0], Node::Text(String::new()));
}

#[test]
fn builtin_lookup() {
    assert_eq!(tmpl::ext::builtin("orderblocks").map(|e| e.name()), Some("orderblocks"));
    assert!(tmpl::ext::builtin("i18n").is_none());
}
