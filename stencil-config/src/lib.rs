//! Layered configuration for stencil template sets.
//!
//! `defaults/stencil.default.toml` is embedded into the crate so the documented
//! defaults and the runtime ones can't drift apart. Applications layer their
//! own files and overrides on top through [`Loader`], deserialize into
//! [`StencilConfig`], and turn that into an empty [`TemplateSet`] ready for
//! parsing:
//!
//!     let set = Loader::new()
//!         .with_optional_file("stencil.toml")
//!         .set_override("exec.missing_key", "error")?
//!         .build()?
//!         .template_set()?;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use serde::Deserialize;
use std::path::Path;
use stencil::{ExecOptions, MissingKey, Mode, RegistryError, TemplateSet};
use thiserror::Error;
use tracing::debug;

const DEFAULT_TOML: &str = include_str!("../defaults/stencil.default.toml");

/// Top-level configuration for a template set.
#[derive(Debug, Clone, Deserialize)]
pub struct StencilConfig {
    pub parse: ParseConfig,
    pub exec: ExecConfig,
    pub escape: EscapeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParseConfig {
    pub left_delim: String,
    pub right_delim: String,
}

/// Mirrors [`ExecOptions`].
#[derive(Debug, Clone, Deserialize)]
pub struct ExecConfig {
    pub max_depth: usize,
    pub missing_key: MissingKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EscapeConfig {
    pub mode: Mode,
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl StencilConfig {
    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            max_depth: self.exec.max_depth,
            missing_key: self.exec.missing_key,
        }
    }

    /// An empty set with this configuration's mode, delimiters and options.
    pub fn template_set(&self) -> Result<TemplateSet, RegistryError> {
        let mut set = TemplateSet::with_options(self.escape.mode, self.exec_options());
        set.set_delimiters(self.parse.left_delim.as_str(), self.parse.right_delim.as_str())?;
        debug!(
            mode = ?self.escape.mode,
            left = %self.parse.left_delim,
            right = %self.parse.right_delim,
            "configured template set"
        );
        Ok(set)
    }
}

/// Layers user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// Start a loader seeded with the embedded defaults.
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a configuration file. A missing file fails the build.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer a configuration file if it exists.
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Override a single dotted key, e.g. `exec.max_depth`.
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    pub fn build(self) -> Result<StencilConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }

    /// Build the configuration and create a template set from it.
    pub fn template_set(self) -> Result<TemplateSet, SetupError> {
        Ok(self.build()?.template_set()?)
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

pub fn load_defaults() -> Result<StencilConfig, ConfigError> {
    Loader::new().build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;
    use std::path::PathBuf;
    use stencil::{FuncMap, Value};

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("stencil-config-{}-{}", std::process::id(), name));
        fs::write(&path, contents).expect("scratch file to be written");
        path
    }

    #[test]
    fn loads_default_config() {
        let config = load_defaults().expect("defaults to deserialize");
        assert_eq!(config.parse.left_delim, "{{");
        assert_eq!(config.parse.right_delim, "}}");
        assert_eq!(config.exec.max_depth, 200);
        assert_eq!(config.exec.missing_key, MissingKey::Default);
        assert_eq!(config.escape.mode, Mode::Html);
        assert_eq!(config.exec_options(), ExecOptions::default());
    }

    #[rstest]
    #[case("text", Mode::Text)]
    #[case("html", Mode::Html)]
    fn supports_mode_override(#[case] value: &str, #[case] expected: Mode) {
        let config = Loader::new()
            .set_override("escape.mode", value)
            .expect("override to apply")
            .build()
            .expect("config to build");
        assert_eq!(config.escape.mode, expected);
    }

    #[test]
    fn supports_numeric_and_enum_overrides() {
        let config = Loader::new()
            .set_override("exec.max_depth", 12i64)
            .expect("override to apply")
            .set_override("exec.missing_key", "error")
            .expect("override to apply")
            .build()
            .expect("config to build");
        assert_eq!(config.exec.max_depth, 12);
        assert_eq!(config.exec.missing_key, MissingKey::Error);
    }

    #[test]
    fn rejects_unknown_mode() {
        let result = Loader::new()
            .set_override("escape.mode", "markdown")
            .expect("override to apply")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn layers_file_over_defaults() {
        let path = scratch_file(
            "layer.toml",
            "[parse]\nleft_delim = \"<%\"\nright_delim = \"%>\"\n",
        );
        let config = Loader::new().with_file(&path).build().expect("config to build");
        fs::remove_file(&path).ok();
        assert_eq!(config.parse.left_delim, "<%");
        assert_eq!(config.parse.right_delim, "%>");
        // Keys the file doesn't name keep their defaults
        assert_eq!(config.exec.max_depth, 200);
    }

    #[test]
    fn missing_required_file_fails() {
        let path = std::env::temp_dir().join("stencil-config-does-not-exist.toml");
        assert!(Loader::new().with_file(path).build().is_err());
    }

    #[test]
    fn missing_optional_file_is_ignored() {
        let path = std::env::temp_dir().join("stencil-config-does-not-exist.toml");
        let config = Loader::new()
            .with_optional_file(path)
            .build()
            .expect("config to build");
        assert_eq!(config.escape.mode, Mode::Html);
    }

    #[test]
    fn builds_a_set_with_configured_delimiters() {
        let mut set = Loader::new()
            .set_override("escape.mode", "text")
            .expect("override to apply")
            .set_override("parse.left_delim", "[[")
            .expect("override to apply")
            .set_override("parse.right_delim", "]]")
            .expect("override to apply")
            .template_set()
            .expect("set to build");
        assert_eq!(set.mode(), Mode::Text);
        let funcs = FuncMap::new();
        set.parse("greeting", "Hello, [[.]]! {{kept}}", &funcs)
            .expect("template to parse");
        let out = set
            .render("greeting", &funcs, &Value::from("world"))
            .expect("template to render");
        assert_eq!(out, "Hello, world! {{kept}}");
    }

    #[test]
    fn empty_delimiter_is_rejected() {
        let result = Loader::new()
            .set_override("parse.left_delim", "")
            .expect("override to apply")
            .template_set();
        assert!(matches!(
            result,
            Err(SetupError::Registry(RegistryError::EmptyDelimiter))
        ));
    }

    #[test]
    fn configured_options_reach_the_set() {
        let set = Loader::new()
            .set_override("exec.max_depth", 3i64)
            .expect("override to apply")
            .template_set()
            .expect("set to build");
        assert_eq!(set.options().max_depth, 3);
    }
}
