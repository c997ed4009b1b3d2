mod logging;
mod test_runner;
mod values;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing::debug;

use renderer::{Environment, EnvironmentConfig, Error, Value};

const SUBCOMMANDS: &[&str] = &["render", "test", "help"];

/// Looked up in the working directory when `--config` is not given.
const DEFAULT_CONFIG: &str = "tmpl.toml";

#[derive(Parser)]
#[command(name = "tmpl", version, about = "Template renderer with reorderable blocks")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a template to stdout
    Render(RenderArgs),

    /// Run .test.tmpl test files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct RenderArgs {
    /// Template to render. Relative to --dir when given, otherwise a file path.
    template: String,

    /// Directory templates (and their parents) are loaded from
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// TOML file with render variables
    #[arg(short, long)]
    context: Option<PathBuf>,

    /// Set a render variable. Repeatable; overrides --context.
    #[arg(short, long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Environment configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Parse only, don't render (exit 0 if valid)
    #[arg(long)]
    check: bool,

    /// Dump the parsed template
    #[arg(long)]
    ast: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.tmpl file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    // `tmpl page.html` is shorthand for `tmpl render page.html`
    let mut args: Vec<String> = std::env::args().collect();
    let first_positional = args
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, a)| !a.starts_with('-'))
        .map(|(pos, a)| (pos, a.clone()));
    if let Some((pos, first)) = first_positional {
        if !SUBCOMMANDS.contains(&first.as_str()) {
            args.insert(pos, "render".to_string());
        }
    }

    let cli = Cli::parse_from(&args);
    logging::init(cli.verbose);

    match cli.command {
        Command::Render(render_args) => do_render(render_args, cli.no_color),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

fn do_render(args: RenderArgs, no_color: bool) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    let mut config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(message) => fail(&message),
    };

    // Without --dir the template's own directory becomes the search path so
    // that `extends` finds its siblings.
    let name = match &args.dir {
        Some(dir) => {
            config.template_dir = Some(dir.clone());
            args.template.clone()
        }
        None => {
            let path = Path::new(&args.template);
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                fail(&format!("not a template file: '{}'", args.template));
            };
            let parent = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            config.template_dir = Some(parent);
            file_name.to_string()
        }
    };
    debug!(template = %name, config = ?config, "render");

    let mut env = match Environment::with_config(config) {
        Ok(env) => env,
        Err(e) => fail(&e.to_string()),
    };

    let writer = StandardStream::stderr(color_choice);
    let term_config = term::Config::default();

    let template = match env.get_template(&name) {
        Ok(t) => t,
        Err(error) => {
            emit_error(&writer, &term_config, env.files(), &error);
            process::exit(1);
        }
    };

    // --check: parse succeeded, exit
    if args.check {
        eprintln!(
            "ok: {} parsed successfully ({})",
            args.template,
            describe_environment(&env)
        );
        return;
    }

    // --ast: dump AST
    if args.ast {
        println!("{:#?}", template.body);
        return;
    }

    let vars = match collect_vars(args.context.as_deref(), &args.set) {
        Ok(vars) => vars,
        Err(message) => fail(&message),
    };

    let stdout = std::io::stdout();
    let result = env.render_to(&template, vars, &mut stdout.lock());
    if let Err(error) = result {
        emit_error(&writer, &term_config, env.files(), &error);
        process::exit(1);
    }
}

fn describe_environment(env: &Environment) -> String {
    let extensions = env.extensions();
    let enabled = if extensions.is_empty() {
        "none".to_string()
    } else {
        extensions.names().join(", ")
    };
    format!(
        "extensions: {}, trim_blocks: {}",
        enabled,
        env.config().trim_blocks
    )
}

fn load_config(path: Option<&Path>) -> Result<EnvironmentConfig, String> {
    let path = match path {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG).is_file() => Path::new(DEFAULT_CONFIG),
        None => return Ok(EnvironmentConfig::default()),
    };
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    toml::from_str(&content).map_err(|e| format!("invalid config '{}': {}", path.display(), e))
}

fn collect_vars(
    context: Option<&Path>,
    assignments: &[String],
) -> Result<BTreeMap<String, Value>, String> {
    let mut vars = match context {
        Some(path) => values::load_context(path)?,
        None => BTreeMap::new(),
    };
    for assignment in assignments {
        let (key, value) = values::parse_assignment(assignment)?;
        vars.insert(key, value);
    }
    Ok(vars)
}

fn emit_error(
    writer: &StandardStream,
    config: &term::Config,
    files: &SimpleFiles<String, String>,
    error: &Error,
) {
    let diagnostic = match error {
        Error::Parse(err) => err.to_diagnostic(),
        Error::Render(err) => match &err.span {
            Some(span) => Diagnostic::error()
                .with_message(err.to_string())
                .with_labels(vec![Label::primary(err.source_id, span.clone())]),
            None => {
                eprintln!("render error: {}", err);
                return;
            }
        },
        Error::UnknownExtension(_) => {
            eprintln!("error: {}", error);
            return;
        }
    };
    let _ = term::emit_to_write_style(&mut writer.lock(), config, files, &diagnostic);
}

fn fail(message: &str) -> ! {
    eprintln!("error: {}", message);
    process::exit(1);
}
