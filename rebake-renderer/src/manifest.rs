//! Template variable manifest (`cookiecutter.json`).

use std::io::ErrorKind;
use std::path::Path;

use serde_json::Value;

use rebake_core::Variables;

use crate::error::{io_err, RenderError};

/// File name of the manifest at the template root.
pub const MANIFEST_FILE: &str = "cookiecutter.json";

/// Leading marker of template-internal settings (`_extensions`, `_copy_without_render`, ...).
pub const PRIVATE_MARKER: char = '_';

/// Private prefix whose defaults are still rendered.
pub const RENDERED_PRIVATE_PREFIX: &str = "__";

/// Manifest key listing paths that are copied without rendering.
pub const COPY_WITHOUT_RENDER: &str = "_copy_without_render";

/// Declared template variables with their defaults, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Manifest {
    variables: Variables,
}

impl Manifest {
    /// Read `<template_dir>/cookiecutter.json`.
    pub fn load(template_dir: &Path) -> Result<Self, RenderError> {
        let path = template_dir.join(MANIFEST_FILE);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(RenderError::ManifestNotFound { path })
            }
            Err(err) => return Err(io_err(&path, err)),
        };
        let variables = serde_json::from_str::<Variables>(&contents)
            .map_err(|source| RenderError::Manifest { path, source })?;
        Ok(Self { variables })
    }

    pub fn from_variables(variables: Variables) -> Self {
        Self { variables }
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Whether `name` denotes a template-internal setting.
    pub fn is_private(name: &str) -> bool {
        name.starts_with(PRIVATE_MARKER)
    }

    /// Whether an unanswered `name` gets its default rendered.
    ///
    /// `_name` defaults stay raw; `__name` defaults are rendered but never asked for.
    pub fn renders_default(name: &str) -> bool {
        !Self::is_private(name) || name.starts_with(RENDERED_PRIVATE_PREFIX)
    }

    /// `_copy_without_render` globs: paths copied byte for byte.
    pub fn copy_without_render(&self) -> Vec<String> {
        self.variables
            .get(COPY_WITHOUT_RENDER)
            .and_then(Value::as_array)
            .map(|patterns| {
                patterns
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Declared variables a user is expected to answer for.
    pub fn public(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.variables
            .iter()
            .filter(|(name, _)| !Self::is_private(name))
    }
}
