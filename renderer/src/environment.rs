use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::ops::Range;
use std::rc::Rc;

use codespan_reporting::files::SimpleFiles;
use tmpl::{Extension, Extensions, Template};
use tracing::debug;

use crate::config::EnvironmentConfig;
use crate::context::Context;
use crate::error::{DiagnosticError, Error, RenderError};
use crate::evaluator::evaluate;
use crate::loader::{FileSystemLoader, Loader};
use crate::render::{BlockRegistry, Renderer};
use crate::value::Value;

/// Maximum length of an `extends` chain.
pub const MAX_INHERITANCE_DEPTH: usize = 32;

/// Name given to templates parsed from strings.
const STRING_TEMPLATE_NAME: &str = "<string>";

/// Owns the configuration, extensions, loader and parsed-template cache.
///
/// Every template source passed through the environment is kept in
/// [`files`](Environment::files) so diagnostics can point into it.
pub struct Environment {
    config: EnvironmentConfig,
    extensions: Extensions,
    loader: Option<Box<dyn Loader>>,
    files: SimpleFiles<String, String>,
    cache: HashMap<String, Rc<Template>>,
    /// `source_id` of every source parsed through `from_string`.
    string_ids: HashMap<String, usize>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// An environment with default syntax, no extensions and no loader.
    pub fn new() -> Self {
        Environment {
            config: EnvironmentConfig {
                extensions: Vec::new(),
                ..EnvironmentConfig::default()
            },
            extensions: Extensions::new(),
            loader: None,
            files: SimpleFiles::new(),
            cache: HashMap::new(),
            string_ids: HashMap::new(),
        }
    }

    /// Build from configuration, enabling the named built-in extensions and
    /// a filesystem loader when `template_dir` is set.
    pub fn with_config(config: EnvironmentConfig) -> Result<Self, Error> {
        let mut extensions = Extensions::new();
        for name in &config.extensions {
            let extension =
                tmpl::ext::builtin(name).ok_or_else(|| Error::UnknownExtension(name.clone()))?;
            extensions.register_boxed(extension);
        }

        let loader = config
            .template_dir
            .as_ref()
            .map(|dir| Box::new(FileSystemLoader::new(dir)) as Box<dyn Loader>);

        debug!(extensions = ?extensions, "created environment");
        Ok(Environment {
            config,
            extensions,
            loader,
            files: SimpleFiles::new(),
            cache: HashMap::new(),
            string_ids: HashMap::new(),
        })
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn set_loader(&mut self, loader: impl Loader + 'static) {
        self.loader = Some(Box::new(loader));
        self.cache.clear();
    }

    /// Register an extension. Templates parsed earlier are not re-parsed.
    pub fn add_extension(&mut self, extension: impl Extension + 'static) {
        self.extensions.register(extension);
        self.cache.clear();
    }

    /// Sources of every template seen so far, indexed by `source_id`.
    pub fn files(&self) -> &SimpleFiles<String, String> {
        &self.files
    }

    /// Parse a template from source text.
    ///
    /// Identical sources share one entry in [`files`](Environment::files), so
    /// rendering the same string repeatedly does not grow the environment.
    pub fn from_string(&mut self, source: &str) -> Result<Template, Error> {
        let source_id = match self.string_ids.get(source) {
            Some(&id) => id,
            None => {
                let id = self
                    .files
                    .add(STRING_TEMPLATE_NAME.to_string(), source.to_string());
                self.string_ids.insert(source.to_string(), id);
                id
            }
        };
        self.parse_file(source_id)
    }

    /// Load and parse a template through the loader, caching the result.
    pub fn get_template(&mut self, name: &str) -> Result<Rc<Template>, Error> {
        if let Some(template) = self.cache.get(name) {
            return Ok(Rc::clone(template));
        }

        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| RenderError::TemplateNotFound(name.to_string()))?;
        let source = loader.get_source(name)?;
        let template = Rc::new(self.parse(name, source)?);
        debug!(template = name, source_id = template.source_id, "loaded template");

        self.cache.insert(name.to_string(), Rc::clone(&template));
        Ok(template)
    }

    /// Render a template, following its `extends` chain.
    pub fn render_template(
        &mut self,
        template: &Template,
        vars: BTreeMap<String, Value>,
    ) -> Result<String, Error> {
        let mut output = Vec::new();
        self.render_to(template, vars, &mut output)?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    pub fn render_to(
        &mut self,
        template: &Template,
        vars: BTreeMap<String, Value>,
        output: &mut dyn Write,
    ) -> Result<(), Error> {
        let ctx = Context::new(vars);
        let parents = self.resolve_parents(template, &ctx)?;

        let chain = std::iter::once(template).chain(parents.iter().map(|t| &**t));
        let registry = BlockRegistry::from_chain(chain);
        let root = parents.last().map(|t| &**t).unwrap_or(template);
        debug!(
            depth = parents.len(),
            blocks = ?registry.block_names(),
            "rendering template"
        );

        let mut renderer = Renderer::new(&registry, ctx, output, root.source_id);
        renderer.render(&root.body)?;
        Ok(())
    }

    /// Parse and render source text in one step.
    pub fn render_str(
        &mut self,
        source: &str,
        vars: BTreeMap<String, Value>,
    ) -> Result<String, Error> {
        let template = self.from_string(source)?;
        self.render_template(&template, vars)
    }

    /// Load and render a named template.
    pub fn render(&mut self, name: &str, vars: BTreeMap<String, Value>) -> Result<String, Error> {
        let template = self.get_template(name)?;
        self.render_template(&template, vars)
    }

    fn parse(&mut self, name: &str, source: String) -> Result<Template, Error> {
        let source_id = self.files.add(name.to_string(), source);
        self.parse_file(source_id)
    }

    fn parse_file(&self, source_id: usize) -> Result<Template, Error> {
        let source = self
            .files
            .get(source_id)
            .map(|file| file.source().as_str())
            .map_err(|e| RenderError::IoError(e.to_string()))?;
        Ok(tmpl::parse(
            source,
            source_id,
            &self.extensions,
            &self.config.syntax(),
        )?)
    }

    /// Load every ancestor of `template`, nearest parent first.
    fn resolve_parents(
        &mut self,
        template: &Template,
        ctx: &Context,
    ) -> Result<Vec<Rc<Template>>, Error> {
        let mut parents: Vec<Rc<Template>> = Vec::new();
        let mut next = parent_name(template, ctx)?;

        while let Some((name, span, source_id)) = next {
            if parents.len() >= MAX_INHERITANCE_DEPTH {
                return Err(RenderError::InheritanceTooDeep(name).into());
            }
            let parent = self
                .get_template(&name)
                .map_err(|e| locate(e, &span, source_id))?;
            next = parent_name(&parent, ctx)?;
            parents.push(parent);
        }
        Ok(parents)
    }
}

/// Evaluate the `extends` target of `template`, if it has one.
fn parent_name(
    template: &Template,
    ctx: &Context,
) -> Result<Option<(String, Range<usize>, usize)>, Error> {
    let Some((expr, span)) = template.parent() else {
        return Ok(None);
    };
    let source_id = template.source_id;
    match evaluate(expr, ctx, source_id).map_err(|e| e.or_at(Some(span), source_id))? {
        Value::String(name) => Ok(Some((name, span.clone(), source_id))),
        other => {
            let error = RenderError::TypeError {
                expected: "template name".to_string(),
                got: other.type_name().to_string(),
            };
            Err(DiagnosticError::at(error, span.clone(), source_id).into())
        }
    }
}

fn locate(error: Error, span: &Range<usize>, source_id: usize) -> Error {
    match error {
        Error::Render(err) => Error::Render(err.or_at(Some(span), source_id)),
        other => other,
    }
}
