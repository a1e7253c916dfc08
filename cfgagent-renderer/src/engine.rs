//! Template rendering: the [`Renderer`] boundary and its Tera implementation.
//!
//! Templates use Tera syntax, which covers plain `{{ key }}` substitution and
//! dotted access into nested metadata (`{{ auto.ADMIN_IP }}`). Referencing a
//! key that is not present in the metadata is a render error, so a manifest is
//! never installed with silently missing values.

use tera::{Context, Tera};

use cfgagent_core::Metadata;

use crate::error::RenderError;

/// Renders one template source against merged metadata.
pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, metadata: &Metadata) -> Result<String, RenderError>;
}

/// Tera-backed [`Renderer`].
///
/// Templates are compiled per call; each manifest is rendered once per pass.
/// Autoescaping is off; the output is a configuration file, not HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct TeraRenderer;

impl TeraRenderer {
    pub fn new() -> Self {
        TeraRenderer
    }
}

impl Renderer for TeraRenderer {
    fn render(&self, template: &str, metadata: &Metadata) -> Result<String, RenderError> {
        let ctx = Context::from_serialize(metadata)?;
        Ok(Tera::one_off(template, &ctx, false)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
