//! Template text rendering
//!
//! The walker only needs `source + bindings → string`. The default
//! [`HandlebarsRenderer`] runs handlebars with HTML escaping off, no
//! partials or template directory, and a fixed set of pure helpers
//! (`json`, `lowercase`, `uppercase`). Strict mode rejects unresolved
//! variables.

use handlebars::{no_escape, Handlebars, RenderErrorReason};
use once_cell::sync::Lazy;

use crate::error::RenderError;

pub trait TemplateRenderer: Send + Sync {
    /// Render `source` against a JSON object of bindings
    fn render(&self, source: &str, bindings: &serde_json::Value) -> Result<String, RenderError>;
}

pub struct HandlebarsRenderer {
    handlebars: Handlebars<'static>,
}

impl HandlebarsRenderer {
    pub fn new(strict: bool) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(strict);
        handlebars.register_escape_fn(no_escape);

        handlebars.register_helper("json", Box::new(json_helper));
        handlebars.register_helper("uppercase", Box::new(uppercase_helper));
        handlebars.register_helper("lowercase", Box::new(lowercase_helper));

        Self { handlebars }
    }

    pub fn is_strict(&self) -> bool {
        self.handlebars.strict_mode()
    }
}

impl Default for HandlebarsRenderer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TemplateRenderer for HandlebarsRenderer {
    fn render(&self, source: &str, bindings: &serde_json::Value) -> Result<String, RenderError> {
        self.handlebars
            .render_template(source, bindings)
            .map_err(|e| match e.reason() {
                RenderErrorReason::TemplateError(inner) => RenderError::Syntax(inner.to_string()),
                RenderErrorReason::MissingVariable(name) => {
                    RenderError::Unresolved(name.clone().unwrap_or_else(|| "<unknown>".to_string()))
                }
                _ => RenderError::Other(e.to_string()),
            })
    }
}

static STRICT: Lazy<HandlebarsRenderer> = Lazy::new(|| HandlebarsRenderer::new(true));
static LENIENT: Lazy<HandlebarsRenderer> = Lazy::new(|| HandlebarsRenderer::new(false));

/// Shared default renderer for the given strictness
pub(crate) fn default_renderer(strict: bool) -> &'static HandlebarsRenderer {
    if strict {
        &STRICT
    } else {
        &LENIENT
    }
}

// Handlebars helpers

fn json_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    if let Some(v) = h.param(0) {
        out.write(&serde_json::to_string(v.value()).unwrap_or_default())?;
    }
    Ok(())
}

fn uppercase_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let param = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&param.to_uppercase())?;
    Ok(())
}

fn lowercase_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let param = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&param.to_lowercase())?;
    Ok(())
}
