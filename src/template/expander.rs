//! Recursive expansion of template nodes.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::renderer::{default_renderer, TemplateRenderer};
use super::{split, BindingGroups, TemplateKind, TemplateNode};
use crate::context::{Budget, Context};
use crate::error::{Result, TemplateError};
use crate::pattern;
use crate::value::{Mapping, Value};

/// Walks a tree and replaces template nodes with their rendered output.
///
/// Without an explicit renderer the shared handlebars renderer matching the
/// context's `strict` setting is used.
#[derive(Clone, Default)]
pub struct TemplateExpander {
    renderer: Option<Arc<dyn TemplateRenderer>>,
}

impl fmt::Debug for TemplateExpander {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateExpander")
            .field("custom_renderer", &self.renderer.is_some())
            .finish()
    }
}

impl TemplateExpander {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_renderer(renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self {
            renderer: Some(renderer),
        }
    }

    /// Expand `tree` with the live configuration
    pub fn expand(&self, tree: &Value, bindings: &BindingGroups) -> Result<Value> {
        self.expand_with(&Context::current(), tree, bindings)
    }

    pub fn expand_with(&self, ctx: &Context, tree: &Value, bindings: &BindingGroups) -> Result<Value> {
        self.walk(ctx, tree, bindings, Budget::start())
    }

    /// Render, parse and pipe one node (its output is not expanded further)
    pub fn render_node(&self, ctx: &Context, node: &TemplateNode, bindings: &BindingGroups) -> Result<Value> {
        self.render(ctx, node, bindings, Budget::start())
    }

    fn renderer<'a>(&'a self, ctx: &Context) -> &'a dyn TemplateRenderer {
        match &self.renderer {
            Some(renderer) => renderer.as_ref(),
            None => default_renderer(ctx.templates.strict),
        }
    }

    // -------------------------------------------------------------------------
    // Rendering
    // -------------------------------------------------------------------------

    fn render(&self, ctx: &Context, node: &TemplateNode, bindings: &BindingGroups, budget: Budget) -> Result<Value> {
        ctx.guard(budget)?;
        let group = node.group.as_deref().unwrap_or(&ctx.templates.default_group);
        let variables = match bindings.get(group) {
            Some(group_bindings) => json_bindings(group_bindings)?,
            None => {
                debug!(group, "Binding group not found, rendering without variables");
                serde_json::Value::Object(serde_json::Map::new())
            }
        };

        let text = self
            .renderer(ctx)
            .render(&node.source, &variables)
            .map_err(TemplateError::Render)?;

        let value = match node.kind {
            TemplateKind::Raw => Value::String(text),
            TemplateKind::Yaml => Value::from_yaml_str(&text).map_err(|e| TemplateError::Parse {
                format: "yaml",
                message: e.to_string(),
            })?,
            TemplateKind::Json => Value::from_json_str(&text).map_err(|e| TemplateError::Parse {
                format: "json",
                message: e.to_string(),
            })?,
        };

        if node.pipe.is_empty() {
            return Ok(value);
        }
        pattern::apply_pipeline(ctx, &node.pipe, value, budget)
    }

    // -------------------------------------------------------------------------
    // Walking
    // -------------------------------------------------------------------------

    fn walk(&self, ctx: &Context, value: &Value, bindings: &BindingGroups, budget: Budget) -> Result<Value> {
        match value {
            Value::Mapping(map) => Ok(Value::Mapping(self.expand_mapping(ctx, map, bindings, budget)?)),
            Value::Sequence(items) => Ok(Value::Sequence(self.expand_sequence(ctx, items, bindings, budget)?)),
            other => Ok(other.clone()),
        }
    }

    fn expand_entries(&self, ctx: &Context, map: &Mapping, bindings: &BindingGroups, budget: Budget) -> Result<Mapping> {
        let mut out = Mapping::with_capacity(map.len());
        for (key, value) in map {
            out.insert(key.clone(), self.walk(ctx, value, bindings, budget)?);
        }
        Ok(out)
    }

    fn expand_mapping(&self, ctx: &Context, map: &Mapping, bindings: &BindingGroups, budget: Budget) -> Result<Mapping> {
        ctx.guard(budget)?;
        let nested = budget.descend();
        let Some(node) = split(map, &ctx.patterns)? else {
            return self.expand_entries(ctx, map, bindings, nested);
        };

        // static siblings first
        let before = self.expand_entries(ctx, &node.before, bindings, nested)?;
        let after = self.expand_entries(ctx, &node.after, bindings, nested)?;

        let rendered = match self.render(ctx, &node.node, bindings, budget)? {
            Value::Mapping(rendered) => rendered,
            other => return Err(TemplateError::ExpectedMapping { found: other.shape() }.into()),
        };
        let rendered = self.expand_mapping(ctx, &rendered, bindings, nested)?;

        if let Some(key) = rendered
            .keys()
            .find(|key| before.contains_key(*key) || after.contains_key(*key))
        {
            return Err(TemplateError::KeyCollision { key: key.clone() }.into());
        }
        debug!(kind = ?node.node.kind, keys = rendered.len(), "Merging template output");

        let mut out = before;
        out.extend(rendered);
        out.extend(after);
        Ok(out)
    }

    fn expand_sequence(&self, ctx: &Context, items: &[Value], bindings: &BindingGroups, budget: Budget) -> Result<Vec<Value>> {
        ctx.guard(budget)?;
        let nested = budget.descend();
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let node = match item {
                Value::Mapping(map) => split(map, &ctx.patterns)?,
                _ => None,
            };
            let Some(node) = node else {
                out.push(self.walk(ctx, item, bindings, nested)?);
                continue;
            };

            if !node.before.is_empty() || !node.after.is_empty() {
                return Err(TemplateError::StrayKeys {
                    keys: node.static_keys(),
                }
                .into());
            }
            let rendered = match self.render(ctx, &node.node, bindings, nested)? {
                Value::Sequence(rendered) => rendered,
                other => return Err(TemplateError::ExpectedSequence { found: other.shape() }.into()),
            };
            debug!(kind = ?node.node.kind, items = rendered.len(), "Splicing template output");
            out.extend(self.expand_sequence(ctx, &rendered, bindings, nested.descend())?);
        }
        Ok(out)
    }
}

/// Bindings as a JSON object; runtime objects cannot be rendered
fn json_bindings(bindings: &Mapping) -> Result<serde_json::Value, TemplateError> {
    let mut out = serde_json::Map::with_capacity(bindings.len());
    for (name, value) in bindings {
        let json = value.to_json().map_err(|e| TemplateError::Binding {
            name: name.clone(),
            message: e.to_string(),
        })?;
        out.insert(name.clone(), json);
    }
    Ok(serde_json::Value::Object(out))
}
