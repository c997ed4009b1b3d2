use std::collections::BTreeMap;

use renderer::{
    Environment, EnvironmentConfig, Error, FileSystemLoader, MapLoader, RenderError, Value,
};
use tmpl::ext::OrderBlocks;

const ORDERED: &str = "a\
    {% orderblocks blocks %}\
    {% block x %}b{% endblock %}\
    {% block y %}c{% endblock %}\
    {% block z %}d{% endblock %}\
    {% endorderblocks %}\
    e";

fn env() -> Environment {
    let mut env = Environment::new();
    env.add_extension(OrderBlocks);
    env
}

fn vars(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn render(source: &str, pairs: &[(&str, Value)]) -> String {
    env()
        .render_str(source, vars(pairs))
        .expect("render failed")
}

fn render_blocks(selection: Value) -> String {
    render(ORDERED, &[("blocks", selection)])
}

fn names(list: &[&str]) -> Value {
    Value::from(list.to_vec())
}

#[test]
fn undefined_selection_uses_declaration_order() {
    assert_eq!(render(ORDERED, &[]), "abcde");
}

#[test]
fn none_selection_uses_declaration_order() {
    assert_eq!(render_blocks(Value::None), "abcde");
}

#[test]
fn full_permutations() {
    assert_eq!(render_blocks(names(&["x", "y", "z"])), "abcde");
    assert_eq!(render_blocks(names(&["z", "y", "x"])), "adcbe");
    assert_eq!(render_blocks(names(&["z", "x", "y"])), "adbce");
    assert_eq!(render_blocks(names(&["x", "z", "y"])), "abdce");
}

#[test]
fn subsets_skip_omitted_blocks() {
    assert_eq!(render_blocks(names(&["x", "y"])), "abce");
    assert_eq!(render_blocks(names(&["x", "z"])), "abde");
    assert_eq!(render_blocks(names(&["y", "z"])), "acde");
    assert_eq!(render_blocks(names(&["z", "y"])), "adce");
    assert_eq!(render_blocks(names(&["z", "x"])), "adbe");
}

#[test]
fn string_selection_iterates_characters() {
    assert_eq!(render_blocks(Value::from("x")), "abe");
    assert_eq!(render_blocks(Value::from("y")), "ace");
    assert_eq!(render_blocks(Value::from("z")), "ade");
    assert_eq!(render_blocks(Value::from("zx")), "adbe");
}

#[test]
fn empty_selection_renders_no_blocks() {
    assert_eq!(render_blocks(names(&[])), "ae");
    assert_eq!(render_blocks(Value::from("")), "ae");
}

#[test]
fn unmatched_names_render_nothing() {
    assert_eq!(render_blocks(names(&["w", "y", "nope"])), "ace");
    assert_eq!(render_blocks(Value::from(vec![Value::Int(1), Value::None])), "ae");
}

#[test]
fn repeated_names_render_once_per_occurrence() {
    assert_eq!(render_blocks(names(&["x", "x", "y", "x"])), "abbcbe");
}

#[test]
fn every_selection_renders_exactly_the_listed_blocks() {
    let bodies: BTreeMap<&str, &str> = [("x", "b"), ("y", "c"), ("z", "d")].into_iter().collect();
    let alphabet = ["x", "y", "z"];

    let mut selections: Vec<Vec<&str>> = vec![Vec::new()];
    let mut frontier = selections.clone();
    for _ in 0..3 {
        frontier = frontier
            .iter()
            .flat_map(|prefix| {
                alphabet.iter().map(move |name| {
                    let mut next = prefix.clone();
                    next.push(*name);
                    next
                })
            })
            .collect();
        selections.extend(frontier.iter().cloned());
    }
    assert_eq!(selections.len(), 1 + 3 + 9 + 27);

    for selection in selections {
        let expected: String = std::iter::once("a")
            .chain(selection.iter().map(|name| bodies[name]))
            .chain(std::iter::once("e"))
            .collect();
        assert_eq!(render_blocks(names(&selection)), expected, "selection {:?}", selection);
    }
}

#[test]
fn non_iterable_selection_is_an_error() {
    let err = env()
        .render_str(ORDERED, vars(&[("blocks", Value::Int(5))]))
        .unwrap_err();
    match err {
        Error::Render(diag) => {
            assert_eq!(diag.error, RenderError::NotIterable("int".to_string()));
            assert!(diag.span.is_some());
        }
        other => panic!("expected render error, got {:?}", other),
    }
}

#[test]
fn non_block_content_is_dropped() {
    let source = "<{% orderblocks order %}\
        skipped {{ 1 + 1 }}\
        {% block one %}1{% endblock %}\
        {% if true %}also skipped{% endif %}\
        {% block two %}2{% endblock %}\
        {% endorderblocks %}>";
    assert_eq!(render(source, &[]), "<12>");
    assert_eq!(render(source, &[("order", names(&["two", "one"]))]), "<21>");
}

#[test]
fn empty_region_renders_nothing() {
    let source = "[{% orderblocks names %}{% endorderblocks %}]";
    assert_eq!(render(source, &[]), "[]");
    assert_eq!(render(source, &[("names", names(&["a"]))]), "[]");
}

#[test]
fn selection_is_an_arbitrary_expression() {
    let source = "{% orderblocks cfg.order or ['b', 'a'] %}\
        {% block a %}A{% endblock %}\
        {% block b %}B{% endblock %}\
        {% endorderblocks %}";
    assert_eq!(render(source, &[("cfg", Value::Map(BTreeMap::new()))]), "BA");

    let cfg: BTreeMap<String, Value> = [("order".to_string(), names(&["a"]))].into_iter().collect();
    assert_eq!(render(source, &[("cfg", Value::from(cfg))]), "A");
}

#[test]
fn block_bodies_see_the_render_context() {
    let source = "{% orderblocks order %}\
        {% block greet %}hello {{ name }}{% endblock %}\
        {% block count %}{% for i in [1, 2, 3] %}{{ i }}{% endfor %}{% endblock %}\
        {% endorderblocks %}";
    assert_eq!(
        render(source, &[("name", Value::from("sam")), ("order", names(&["count", "greet"]))]),
        "123hello sam"
    );
}

#[test]
fn nested_regions() {
    let source = "{% orderblocks outer %}\
        {% block first %}\
        {% orderblocks inner %}{% block p %}P{% endblock %}{% block q %}Q{% endblock %}{% endorderblocks %}\
        {% endblock %}\
        {% block second %}S{% endblock %}\
        {% endorderblocks %}";
    assert_eq!(render(source, &[]), "PQS");
    assert_eq!(
        render(
            source,
            &[("outer", names(&["second", "first"])), ("inner", names(&["q"]))]
        ),
        "SQ"
    );
}

#[test]
fn region_keeps_enclosing_loop_variable() {
    let source = "{% for row in ['r1', 'r2', 'r3'] %}\
                  {% orderblocks o %}{% block cell %}{{ row }}#{{ loop.index }};{% endblock %}{% endorderblocks %}\
                  {% endfor %}";
    assert_eq!(render(source, &[]), "r1#1;r2#2;r3#3;");

    let source = "{% orderblocks order %}{% block a %}[{{ loop }}]{% endblock %}{% endorderblocks %}";
    assert_eq!(render(source, &[]), "[]");
}

#[test]
fn loop_variables_do_not_leak() {
    assert_eq!(render("{% for x in [1] %}{% endfor %}{{ x }}{{ loop }}", &[]), "");
}

#[test]
fn child_template_overrides_ordered_blocks() {
    let loader = MapLoader::new()
        .with(
            "base.html",
            "<{% orderblocks sections %}\
             {% block head %}H{% endblock %}\
             {% block body %}B{% endblock %}\
             {% endorderblocks %}>",
        )
        .with(
            "page.html",
            "{% extends 'base.html' %}ignored{% block body %}custom{% endblock %}",
        );
    let mut env = env();
    env.set_loader(loader);

    assert_eq!(env.render("page.html", BTreeMap::new()).unwrap(), "<Hcustom>");
    assert_eq!(
        env.render("page.html", vars(&[("sections", names(&["body", "head"]))]))
            .unwrap(),
        "<customH>"
    );
    assert_eq!(env.render("base.html", BTreeMap::new()).unwrap(), "<HB>");
}

#[test]
fn multi_level_inheritance() {
    let loader = MapLoader::new()
        .with("a", "[{% block one %}a1{% endblock %}|{% block two %}a2{% endblock %}]")
        .with("b", "{% extends 'a' %}{% block one %}b1{% endblock %}")
        .with("c", "{% extends 'b' %}{% block two %}c2{% endblock %}");
    let mut env = env();
    env.set_loader(loader);
    assert_eq!(env.render("c", BTreeMap::new()).unwrap(), "[b1|c2]");
    assert_eq!(env.render("b", BTreeMap::new()).unwrap(), "[b1|a2]");
}

#[test]
fn dynamic_extends_target() {
    let loader = MapLoader::new()
        .with("light", "L:{% block c %}{% endblock %}")
        .with("dark", "D:{% block c %}{% endblock %}");
    let mut env = env();
    env.set_loader(loader);
    let source = "{% extends theme %}{% block c %}x{% endblock %}";
    assert_eq!(
        env.render_str(source, vars(&[("theme", Value::from("dark"))])).unwrap(),
        "D:x"
    );
}

#[test]
fn circular_extends_is_an_error() {
    let loader = MapLoader::new()
        .with("a", "{% extends 'b' %}")
        .with("b", "{% extends 'a' %}");
    let mut env = env();
    env.set_loader(loader);
    let err = env.render("a", BTreeMap::new()).unwrap_err();
    assert!(matches!(
        err,
        Error::Render(ref diag) if matches!(diag.error, RenderError::InheritanceTooDeep(_))
    ));
}

#[test]
fn missing_parent_is_located_at_extends() {
    let mut env = env();
    env.set_loader(MapLoader::new());
    let err = env
        .render_str("{% extends 'nowhere' %}", BTreeMap::new())
        .unwrap_err();
    match err {
        Error::Render(diag) => {
            assert_eq!(diag.error, RenderError::TemplateNotFound("nowhere".to_string()));
            assert!(diag.span.is_some());
        }
        other => panic!("expected render error, got {:?}", other),
    }
}

#[test]
fn orderblocks_requires_the_extension() {
    let err = Environment::new()
        .render_str(ORDERED, BTreeMap::new())
        .unwrap_err();
    match err {
        Error::Parse(parse) => {
            assert!(parse.message.contains("unknown tag 'orderblocks'"), "{}", parse.message);
            assert_eq!(parse.lineno, 1);
        }
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn config_enables_extensions() {
    let config: EnvironmentConfig = toml::from_str("trim_blocks = true").unwrap();
    assert_eq!(config.extensions, vec!["orderblocks".to_string()]);
    let mut env = Environment::with_config(config).unwrap();
    let source = "{% orderblocks o %}\n{% block a %}A{% endblock %}\n{% endorderblocks %}\n";
    assert_eq!(env.render_str(source, BTreeMap::new()).unwrap(), "A");

    let config: EnvironmentConfig = toml::from_str("extensions = [\"i18n\"]").unwrap();
    assert!(matches!(
        Environment::with_config(config),
        Err(Error::UnknownExtension(name)) if name == "i18n"
    ));

    assert!(toml::from_str::<EnvironmentConfig>("bogus = 1").is_err());
}

#[test]
fn filesystem_loader() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("base.tmpl"),
        "{% orderblocks order %}{% block a %}1{% endblock %}{% block b %}2{% endblock %}{% endorderblocks %}\n",
    )
    .unwrap();
    std::fs::create_dir(dir.path().join("pages")).unwrap();
    std::fs::write(
        dir.path().join("pages/child.tmpl"),
        "{% extends 'base.tmpl' %}{% block a %}one{% endblock %}",
    )
    .unwrap();

    let config = EnvironmentConfig {
        template_dir: Some(dir.path().to_path_buf()),
        ..EnvironmentConfig::default()
    };
    let mut env = Environment::with_config(config).unwrap();
    assert_eq!(
        env.render("pages/child.tmpl", vars(&[("order", names(&["b", "a"]))]))
            .unwrap(),
        "2one"
    );

    let err = env.render("../secret", BTreeMap::new()).unwrap_err();
    assert_eq!(
        err,
        Error::Render(RenderError::TemplateNotFound("../secret".to_string()).into())
    );
    assert_eq!(
        FileSystemLoader::new(dir.path()).base_dir(),
        dir.path()
    );
}

#[test]
fn templates_are_cached() {
    let mut env = env();
    env.set_loader(MapLoader::new().with("t", "{{ 1 }}"));
    let first = env.get_template("t").unwrap();
    let second = env.get_template("t").unwrap();
    assert!(std::rc::Rc::ptr_eq(&first, &second));
    assert_eq!(env.files().get(first.source_id).unwrap().name(), "t");
}

#[test]
fn repeated_string_renders_reuse_one_source() {
    let mut env = env();
    for _ in 0..1000 {
        assert_eq!(env.render_str("x{{ 1 }}", BTreeMap::new()).unwrap(), "x1");
    }
    assert_eq!(env.from_string("x{{ 1 }}").unwrap().source_id, 0);
    assert!(env.files().get(1).is_err());

    let other = env.from_string("y").unwrap();
    assert_eq!(other.source_id, 1);
    assert_eq!(env.files().get(1).unwrap().name(), "<string>");
}

#[test]
fn trailing_newline_handling() {
    assert_eq!(render("hi\n", &[]), "hi");
    let config = EnvironmentConfig {
        keep_trailing_newline: true,
        ..EnvironmentConfig::default()
    };
    let mut env = Environment::with_config(config).unwrap();
    assert_eq!(env.render_str("hi\n", BTreeMap::new()).unwrap(), "hi\n");
}

#[test]
fn expressions_and_filters() {
    assert_eq!(render("{{ 2 + 3 * 4 }}", &[]), "14");
    assert_eq!(render("{{ (2 + 3) * 4 }}", &[]), "20");
    assert_eq!(render("{{ 7 // 2 }} {{ 7 % 3 }} {{ 1 / 2 }}", &[]), "3 1 0.5");
    assert_eq!(render("{{ 'a' ~ 1 ~ none }}", &[]), "a1None");
    assert_eq!(render("{{ [1, 'b'] }}", &[]), "[1, 'b']");
    assert_eq!(render("{{ 'x' if 1 > 2 else 'y' }}", &[]), "y");
    assert_eq!(render("{{ 2 in [1, 2] and 'ab' not in 'abc' }}", &[]), "False");
    assert_eq!(render("{{ name | default('anon') | upper }}", &[]), "ANON");
    assert_eq!(render("{{ ['c', 'b'] | reverse | join('-') }}", &[]), "b-c");
    assert_eq!(render("{{ 'abc' | length }} {{ [4, 5] | first }}", &[]), "3 4");
    assert_eq!(render("{{ x is defined }} {{ x is not none }}", &[]), "False True");
}

#[test]
fn statements() {
    let source = "{% set n = 3 %}{% if n is even %}even{% elif n > 2 %}big{% else %}small{% endif %}";
    assert_eq!(render(source, &[]), "big");

    let source = "{% for k, v in pairs %}{{ loop.index }}{{ k }}={{ v }}{% if not loop.last %},{% endif %}{% endfor %}";
    let pairs = Value::from(vec![names(&["a", "1"]), names(&["b", "2"])]);
    assert_eq!(render(source, &[("pairs", pairs)]), "1a=1,2b=2");

    assert_eq!(render("{% for x in [] %}x{% else %}empty{% endfor %}", &[]), "empty");
    assert_eq!(render("a {#- note -#} b", &[]), "ab");
}

#[test]
fn render_errors_carry_locations() {
    let err = env().render_str("ok\n{{ 1 // 0 }}", BTreeMap::new()).unwrap_err();
    match err {
        Error::Render(diag) => {
            assert_eq!(diag.error, RenderError::DivisionByZero);
            assert!(diag.span.is_some());
        }
        other => panic!("expected render error, got {:?}", other),
    }

    let err = env().render_str("{{ a.b }}", BTreeMap::new()).unwrap_err();
    assert_eq!(err.to_string(), "render error: 'a' has no attribute 'b'");

    let err = env().render_str("{{ 1 | shout }}", BTreeMap::new()).unwrap_err();
    assert_eq!(err.to_string(), "render error: no filter named 'shout'");

    let err = env()
        .render_str("{% for a, b in [[1]] %}{% endfor %}", BTreeMap::new())
        .unwrap_err();
    assert_eq!(err.to_string(), "render error: cannot unpack 1 values into 2 names");
}

#[test]
fn arithmetic_overflow_is_an_error() {
    let min = "(-9223372036854775807 - 1)";
    for source in [
        format!("{{{{ {} // -1 }}}}", min),
        format!("{{{{ {} % -1 }}}}", min),
        format!("{{{{ -{} }}}}", min),
        "{{ 9223372036854775807 + 1 }}".to_string(),
    ] {
        match env().render_str(&source, BTreeMap::new()) {
            Err(Error::Render(diag)) => {
                assert_eq!(diag.error, RenderError::IntegerOverflow, "{}", source);
                assert!(diag.span.is_some(), "{}", source);
            }
            other => panic!("expected overflow for {}, got {:?}", source, other),
        }
    }

    let err = env()
        .render_str("{{ 'ab' * 9223372036854775807 }}", BTreeMap::new())
        .unwrap_err();
    assert_eq!(err.to_string(), "render error: result too large");
    assert_eq!(render("{{ 'ab' * 3 }}{{ 'x' * -2 }}", &[]), "ababab");

    // Overflow inside a selection is reported, not rendered
    let err = env()
        .render_str(
            "{% orderblocks -x %}{% block a %}{% endblock %}{% endorderblocks %}",
            vars(&[("x", Value::Int(i64::MIN))]),
        )
        .unwrap_err();
    assert_eq!(err.to_string(), "render error: integer overflow");
}
