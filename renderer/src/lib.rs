//! Rendering for `tmpl` templates: values, contexts, loaders, inheritance
//! and the [`Environment`] that ties parsing and rendering together.

pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod loader;
pub mod render;
pub mod value;

pub use config::EnvironmentConfig;
pub use context::Context;
pub use environment::Environment;
pub use error::{DiagnosticError, Error, RenderError};
pub use loader::{FileSystemLoader, Loader, MapLoader};
pub use value::Value;
