use std::path::PathBuf;

use serde::Deserialize;
use tmpl::SyntaxConfig;

/// Environment settings, usually read from a `tmpl.toml` file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentConfig {
    /// Remove the first newline after a block tag.
    pub trim_blocks: bool,
    /// Keep a single trailing newline at the end of each template.
    pub keep_trailing_newline: bool,
    /// Extensions to enable, by name.
    pub extensions: Vec<String>,
    /// Directory templates are loaded from.
    pub template_dir: Option<PathBuf>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        EnvironmentConfig {
            trim_blocks: false,
            keep_trailing_newline: false,
            extensions: vec!["orderblocks".to_string()],
            template_dir: None,
        }
    }
}

impl EnvironmentConfig {
    pub fn syntax(&self) -> SyntaxConfig {
        SyntaxConfig {
            trim_blocks: self.trim_blocks,
            keep_trailing_newline: self.keep_trailing_newline,
        }
    }
}
