//! Template context: resolves declared variables into the rendering payload.

use serde_json::Value;
use tera::Tera;

use rebake_core::Variables;

use crate::error::RenderError;
use crate::manifest::Manifest;

/// Namespace templates address variables through (`{{ cookiecutter.name }}`).
pub const NAMESPACE: &str = "cookiecutter";

/// Fully resolved variables for one render.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TemplateContext {
    pub variables: Variables,
}

impl TemplateContext {
    /// Resolve every variable `manifest` declares.
    ///
    /// A value in `supplied` wins. Otherwise the declared default is used:
    /// strings are rendered against the variables resolved before them,
    /// choice lists take their first entry, anything else is used as-is.
    /// Single-underscore variables keep their raw default; `__` variables are
    /// rendered like public ones. Keys in `supplied` the manifest does not
    /// declare are dropped.
    pub fn resolve(manifest: &Manifest, supplied: &Variables) -> Result<Self, RenderError> {
        let mut ctx = TemplateContext::default();
        for (name, default) in manifest.variables() {
            let value = match supplied.get(name) {
                Some(value) => value.clone(),
                None if !Manifest::renders_default(name) => default.clone(),
                None => ctx.render_default(name, default)?,
            };
            ctx.variables.insert(name.clone(), value);
        }
        Ok(ctx)
    }

    fn render_default(&self, name: &str, default: &Value) -> Result<Value, RenderError> {
        let value = match default {
            Value::Array(choices) => choices.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };
        match value {
            Value::String(raw) => {
                let rendered = Tera::one_off(&raw, &self.to_tera_context(), false).map_err(|e| {
                    RenderError::Template {
                        path: format!("{}:{name}", crate::manifest::MANIFEST_FILE).into(),
                        source: e,
                    }
                })?;
                Ok(Value::String(rendered))
            }
            other => Ok(other),
        }
    }

    /// Convert to a [`tera::Context`] with variables under [`NAMESPACE`].
    pub fn to_tera_context(&self) -> tera::Context {
        let mut ctx = tera::Context::new();
        ctx.insert(NAMESPACE, &self.variables);
        ctx
    }
}
