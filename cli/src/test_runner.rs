use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use codespan_reporting::files::Files;
use serde::Deserialize;
use tracing::debug;

use renderer::{Environment, EnvironmentConfig, Error, MapLoader};

use crate::values;

const TEST_SUFFIX: &str = ".test.tmpl";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Render variables.
    #[serde(default)]
    pub context: toml::Table,

    /// Extra templates reachable through `extends`, keyed by name.
    #[serde(default)]
    pub templates: BTreeMap<String, String>,

    /// Extensions to enable. Defaults to the environment default.
    #[serde(default)]
    pub extensions: Option<Vec<String>>,

    #[serde(default)]
    pub trim_blocks: bool,

    #[serde(default)]
    pub keep_trailing_newline: bool,

    /// Expected exact output (trimmed comparison).
    #[serde(default)]
    pub expect_output: Option<String>,

    /// Expected error. Its Display string must contain this substring.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// 1-based line the expected error must point at.
    #[serde(default)]
    pub expect_error_line: Option<usize>,

    /// If true, the test expects a syntax error.
    #[serde(default)]
    pub expect_parse_error: bool,
}

impl TestConfig {
    fn environment(&self) -> Result<Environment, Error> {
        let defaults = EnvironmentConfig::default();
        let config = EnvironmentConfig {
            trim_blocks: self.trim_blocks,
            keep_trailing_newline: self.keep_trailing_newline,
            extensions: self.extensions.clone().unwrap_or(defaults.extensions),
            template_dir: None,
        };
        let mut env = Environment::with_config(config)?;

        let mut loader = MapLoader::new();
        for (name, source) in &self.templates {
            loader.add(name.clone(), source.clone());
        }
        env.set_loader(loader);
        Ok(env)
    }
}

/// Split a `.test.tmpl` file into its TOML config and template source.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');

    let after_open = content
        .strip_prefix("---")
        .ok_or("missing opening --- frontmatter delimiter")?;
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;

    let toml_str = after_open[..close_pos].trim_end_matches('\r');
    let rest = &after_open[close_pos + 4..];
    let source = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    let config: TestConfig =
        toml::from_str(toml_str).map_err(|e| format!("TOML parse error: {}", e))?;

    Ok((config, source))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

impl TestResult {
    fn label(&self) -> &str {
        self.description.as_deref().unwrap_or_else(|| {
            self.path
                .file_name()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_suffix(TEST_SUFFIX))
                .unwrap_or("?")
        })
    }
}

fn run_single_test(path: &Path) -> TestResult {
    let (description, outcome) = match std::fs::read_to_string(path) {
        Ok(content) => match parse_test_file(&content) {
            Ok((config, source)) => {
                let outcome = match check(&config, source) {
                    None => TestOutcome::Pass,
                    Some(reason) => TestOutcome::Fail(reason),
                };
                (config.description, outcome)
            }
            Err(e) => (None, TestOutcome::Fail(format!("frontmatter error: {}", e))),
        },
        Err(e) => (None, TestOutcome::Fail(format!("cannot read file: {}", e))),
    };
    debug!(path = %path.display(), passed = matches!(outcome, TestOutcome::Pass), "ran test");

    TestResult {
        path: path.to_path_buf(),
        description,
        outcome,
    }
}

/// Render `source` under `config`. Returns `Some(reason)` when an
/// expectation does not hold.
fn check(config: &TestConfig, source: &str) -> Option<String> {
    let mut env = match config.environment() {
        Ok(env) => env,
        Err(e) => return Some(format!("invalid test environment: {}", e)),
    };

    let vars = values::table_to_vars(&config.context);
    let result = env
        .from_string(source)
        .and_then(|template| env.render_template(&template, vars));

    match result {
        // A syntax error in an inherited template also counts
        Err(Error::Parse(err)) if config.expect_parse_error => {
            check_error(config, &err.to_string(), Some(err.lineno))
        }
        Ok(_) if config.expect_parse_error => {
            Some("expected parse error, but parsing succeeded".to_string())
        }
        Err(Error::Parse(err)) => Some(format!("unexpected parse error: {}", err)),
        Err(err) if config.expect_parse_error => {
            Some(format!("expected parse error, got: {}", err))
        }

        Err(err) if config.expect_error.is_some() => {
            let line = error_line(&env, &err);
            check_error(config, &err.to_string(), line)
        }
        Ok(_) if config.expect_error.is_some() => Some(format!(
            "expected error containing \"{}\", but rendering succeeded",
            config.expect_error.as_deref().unwrap_or_default()
        )),
        Err(err) => Some(format!("unexpected error: {}", err)),

        Ok(actual) => {
            let expected = config.expect_output.as_deref()?;
            let actual = actual.trim();
            let expected = expected.trim();
            (actual != expected).then(|| {
                format!(
                    "output mismatch\n  expected: {}\n  actual:   {}",
                    expected, actual
                )
            })
        }
    }
}

fn check_error(config: &TestConfig, message: &str, line: Option<usize>) -> Option<String> {
    if let Some(expected) = &config.expect_error {
        if !message.contains(expected.as_str()) {
            return Some(format!(
                "expected error containing \"{}\", got: {}",
                expected, message
            ));
        }
    }
    match (config.expect_error_line, line) {
        (Some(expected), Some(actual)) if expected != actual => Some(format!(
            "expected error on line {}, but it is on line {}",
            expected, actual
        )),
        (Some(expected), None) => Some(format!(
            "expected error on line {}, but the error has no location",
            expected
        )),
        _ => None,
    }
}

/// 1-based line of a render error's span, within whichever template it points at.
fn error_line(env: &Environment, error: &Error) -> Option<usize> {
    let Error::Render(err) = error else {
        return None;
    };
    let span = err.span.as_ref()?;
    env.files()
        .line_index(err.source_id, span.start)
        .ok()
        .map(|index| index + 1)
}

/// Discover `.test.tmpl` files grouped by category (subfolder relative to root).
/// Files directly in `root` get category "" (uncategorized).
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tests(&path, root, out);
            continue;
        }
        let is_test = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(TEST_SUFFIX));
        if is_test {
            let category = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

fn category_label(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

/// List available categories for the given test path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return;
    }

    eprintln!("available categories:");
    for (category, files) in &categories {
        eprintln!("  {} ({} tests)", category_label(category), files.len());
    }
}

/// Terminal styling for the report.
struct Style {
    color: bool,
}

impl Style {
    fn paint(&self, code: &str, s: &str) -> String {
        if self.color {
            format!("\x1b[{}m{}\x1b[0m", code, s)
        } else {
            s.to_string()
        }
    }

    fn pass(&self) -> String {
        self.paint("32", "PASS")
    }

    fn fail(&self) -> String {
        self.paint("31", "FAIL")
    }

    fn bold(&self, s: &str) -> String {
        self.paint("1", s)
    }
}

/// Keep the categories the user asked for. A request matches a category and
/// its sub-categories.
fn select_categories<'a>(
    all: &'a BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<&'a str, &'a [PathBuf]> {
    if requested.is_empty() {
        return all.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
    }

    let mut selected = BTreeMap::new();
    for request in requested {
        let request = request.trim_matches('/');
        let prefix = format!("{}/", request);
        let before = selected.len();
        for (category, files) in all {
            if category == request || category.starts_with(&prefix) {
                selected.insert(category.as_str(), files.as_slice());
            }
        }
        if selected.len() == before {
            let available: Vec<&str> = all.keys().map(|k| category_label(k)).collect();
            eprintln!(
                "warning: category '{}' not found (available: {})",
                request,
                available.join(", ")
            );
        }
    }
    selected
}

/// Run all `.test.tmpl` files under `path` (or a single file).
/// If `categories` is non-empty, only run tests in those categories.
/// Returns exit code: 0 = all pass, 1 = any failure.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let style = Style { color: !no_color };

    let all_categories = if path.is_file() {
        // Single file mode ignores categories
        BTreeMap::from([(String::new(), vec![path.to_path_buf()])])
    } else {
        discover_categorized(path)
    };
    if all_categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return 1;
    }

    let requested = if path.is_file() { &[][..] } else { categories };
    let run_categories = select_categories(&all_categories, requested);
    if run_categories.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (category, files) in &run_categories {
        if !path.is_file() {
            eprintln!();
            eprintln!("{}", style.bold(category_label(category)));
        }

        for file in *files {
            let result = run_single_test(file);
            match &result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", style.pass(), result.label());
                }
                TestOutcome::Fail(_) => {
                    eprintln!("  {}  {}", style.fail(), result.label());
                    failures.push(result);
                }
            }
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for failure in &failures {
            eprintln!();
            eprintln!("  --- {} ---", failure.path.display());
            if let TestOutcome::Fail(reason) = &failure.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    eprintln!();
    let failed = failures.len();
    if failed == 0 {
        eprintln!("test result: {}. {} passed, 0 failed", style.paint("32", "ok"), passed);
        0
    } else {
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            style.paint("31", "FAILED"),
            passed,
            failed,
            passed + failed
        );
        1
    }
}
