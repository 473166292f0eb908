//! # rebake-renderer
//!
//! Tera-based render gateway for cookiecutter-layout templates: reads the
//! variable manifest, resolves a context against it, and renders the project
//! directory into an output root.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use rebake_renderer::{TemplateRenderer, TeraRenderer};
//!
//! fn render(template: &Path, out: &Path) {
//!     let renderer = TeraRenderer::new();
//!     let context = serde_json::Map::new();
//!     if let Ok(root) = renderer.render(template, &context, out) {
//!         println!("rendered into {}", root.display());
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod manifest;

pub use context::TemplateContext;
pub use engine::{TemplateRenderer, TeraRenderer};
#[cfg(any(test, feature = "test-export-mocks"))]
pub use engine::MockTemplateRenderer;
pub use error::RenderError;
pub use manifest::Manifest;
