use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use crate::error::RenderError;

/// Source of named templates, used by `Environment::get_template` and `extends`.
pub trait Loader {
    fn get_source(&self, name: &str) -> Result<String, RenderError>;
}

/// Templates held in memory, keyed by name.
#[derive(Debug, Default, Clone)]
pub struct MapLoader {
    templates: HashMap<String, String>,
}

impl MapLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }

    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.add(name, source);
        self
    }
}

impl Loader for MapLoader {
    fn get_source(&self, name: &str) -> Result<String, RenderError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::TemplateNotFound(name.to_string()))
    }
}

/// Templates read from a directory. Names are `/`-separated paths relative
/// to the base directory; names escaping it are not found.
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    base_dir: PathBuf,
}

impl FileSystemLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FileSystemLoader {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl Loader for FileSystemLoader {
    fn get_source(&self, name: &str) -> Result<String, RenderError> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(RenderError::TemplateNotFound(name.to_string()));
        }

        let resolved = self.base_dir.join(relative);
        if !resolved.is_file() {
            return Err(RenderError::TemplateNotFound(name.to_string()));
        }
        std::fs::read_to_string(&resolved)
            .map_err(|e| RenderError::IoError(format!("cannot read '{}': {}", name, e)))
    }
}
