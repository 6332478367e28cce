//! Template Expansion Walker
//!
//! Template nodes are mappings carrying exactly one template key:
//!
//! | key                | rendered text is...     |
//! |--------------------|-------------------------|
//! | `_template_`       | kept as a string        |
//! | `_template_yaml_`  | parsed as YAML          |
//! | `_template_json_`  | parsed as JSON          |
//!
//! plus the optional control keys `_template_group_` (which binding group
//! to render with) and `_template_pipe_` (patterns applied to the parsed
//! result).
//!
//! ## Expansion
//!
//! * In a mapping, the template output must itself be a mapping and is
//!   merged at the template key's position. Output keys that collide with
//!   static siblings are rejected.
//! * In a sequence, an element that is a template node (with no static
//!   keys) must render to a sequence, which is spliced in place.
//! * Static children are expanded before sibling templates render, and
//!   rendered output is expanded again one level deeper.

mod expander;
mod renderer;

pub use expander::TemplateExpander;
pub use renderer::{HandlebarsRenderer, TemplateRenderer};

use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::info;

use crate::context::{Context, Shared};
use crate::error::{Result, TemplateError};
use crate::pattern::{parse_pipeline, Pattern, PatternRegistry};
use crate::value::{Mapping, Value};

pub const TEMPLATE_KEY: &str = "_template_";
pub const TEMPLATE_YAML_KEY: &str = "_template_yaml_";
pub const TEMPLATE_JSON_KEY: &str = "_template_json_";
pub const TEMPLATE_GROUP_KEY: &str = "_template_group_";
pub const TEMPLATE_PIPE_KEY: &str = "_template_pipe_";

pub const DEFAULT_GROUP: &str = "default";

// =============================================================================
// SETTINGS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSettings {
    /// Unresolved variables are render errors
    pub strict: bool,
    /// Group used by nodes without `_template_group_`
    pub default_group: String,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            strict: true,
            default_group: DEFAULT_GROUP.to_string(),
        }
    }
}

/// Partial update over the defaults; an all-`None` value resets
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateOverrides {
    pub strict: Option<bool>,
    pub default_group: Option<String>,
}

impl TemplateOverrides {
    pub fn into_settings(self) -> TemplateSettings {
        let defaults = TemplateSettings::default();
        TemplateSettings {
            strict: self.strict.unwrap_or(defaults.strict),
            default_group: self.default_group.unwrap_or(defaults.default_group),
        }
    }
}

static SETTINGS: Lazy<Shared<TemplateSettings>> = Lazy::new(|| Shared::new(TemplateSettings::default()));

pub fn template_settings() -> Arc<TemplateSettings> {
    SETTINGS.snapshot()
}

pub fn configure_templates(overrides: TemplateOverrides) {
    let settings = overrides.into_settings();
    info!(
        strict = settings.strict,
        default_group = %settings.default_group,
        "Template settings configured"
    );
    SETTINGS.replace(settings);
}

// =============================================================================
// BINDINGS
// =============================================================================

/// Named groups of template variables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingGroups {
    groups: IndexMap<String, Mapping>,
}

impl BindingGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, name: impl Into<String>, bindings: Mapping) -> Self {
        self.insert(name, bindings);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, bindings: Mapping) -> Option<Mapping> {
        self.groups.insert(name.into(), bindings)
    }

    pub fn get(&self, name: &str) -> Option<&Mapping> {
        self.groups.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }
}

/// Single group stored under [`DEFAULT_GROUP`]
impl From<Mapping> for BindingGroups {
    fn from(bindings: Mapping) -> Self {
        Self::new().with_group(DEFAULT_GROUP, bindings)
    }
}

// =============================================================================
// TEMPLATE NODE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Raw,
    Yaml,
    Json,
}

impl TemplateKind {
    pub fn key(&self) -> &'static str {
        match self {
            TemplateKind::Raw => TEMPLATE_KEY,
            TemplateKind::Yaml => TEMPLATE_YAML_KEY,
            TemplateKind::Json => TEMPLATE_JSON_KEY,
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key {
            TEMPLATE_KEY => Some(TemplateKind::Raw),
            TEMPLATE_YAML_KEY => Some(TemplateKind::Yaml),
            TEMPLATE_JSON_KEY => Some(TemplateKind::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateNode {
    pub kind: TemplateKind,
    pub source: String,
    pub group: Option<String>,
    pub pipe: Vec<Pattern>,
}

impl TemplateNode {
    pub fn new(kind: TemplateKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            group: None,
            pipe: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_pipe(mut self, pipe: Vec<Pattern>) -> Self {
        self.pipe = pipe;
        self
    }

    /// Parse a template node from a mapping holding only template/control keys
    pub fn from_mapping(map: &Mapping, patterns: &PatternRegistry) -> Result<Self> {
        match split(map, patterns)? {
            Some(split) if split.before.is_empty() && split.after.is_empty() => Ok(split.node),
            Some(split) => Err(TemplateError::StrayKeys {
                keys: split.static_keys(),
            }
            .into()),
            None => Err(TemplateError::InvalidNode {
                message: "mapping has no template key".to_string(),
            }
            .into()),
        }
    }
}

/// A mapping split around its template key
#[derive(Debug)]
pub(crate) struct SplitNode {
    pub node: TemplateNode,
    /// Static entries preceding the template key
    pub before: Mapping,
    /// Static entries following it
    pub after: Mapping,
}

impl SplitNode {
    pub fn static_keys(&self) -> Vec<String> {
        self.before.keys().chain(self.after.keys()).cloned().collect()
    }
}

/// `Ok(None)` when `map` is plain data
pub(crate) fn split(map: &Mapping, patterns: &PatternRegistry) -> Result<Option<SplitNode>> {
    let template_keys: Vec<&String> = map.keys().filter(|k| TemplateKind::from_key(k).is_some()).collect();
    let kind = match template_keys.as_slice() {
        [] => {
            if let Some(key) = map.keys().find(|k| is_control_key(k)) {
                return Err(TemplateError::InvalidNode {
                    message: format!("{key} without a template key"),
                }
                .into());
            }
            return Ok(None);
        }
        [key] => TemplateKind::from_key(key).unwrap_or(TemplateKind::Raw),
        keys => {
            return Err(TemplateError::MultipleTemplates {
                keys: keys.iter().map(|k| k.to_string()).collect(),
            }
            .into())
        }
    };

    let source = match &map[kind.key()] {
        Value::String(source) => source.clone(),
        other => {
            return Err(TemplateError::InvalidNode {
                message: format!("{} must be a string, got {}", kind.key(), other.shape()),
            }
            .into())
        }
    };

    let group = match map.get(TEMPLATE_GROUP_KEY) {
        None | Some(Value::Null) => None,
        Some(Value::String(group)) => Some(group.clone()),
        Some(other) => {
            return Err(TemplateError::InvalidNode {
                message: format!("{TEMPLATE_GROUP_KEY} must be a string, got {}", other.shape()),
            }
            .into())
        }
    };

    let pipe = match map.get(TEMPLATE_PIPE_KEY) {
        Some(value) => parse_pipeline(value, patterns)?,
        None => Vec::new(),
    };

    let mut before = Mapping::new();
    let mut after = Mapping::new();
    let mut seen_template = false;
    for (key, value) in map {
        if key == kind.key() {
            seen_template = true;
        } else if !is_control_key(key) {
            let side = if seen_template { &mut after } else { &mut before };
            side.insert(key.clone(), value.clone());
        }
    }

    Ok(Some(SplitNode {
        node: TemplateNode {
            kind,
            source,
            group,
            pipe,
        },
        before,
        after,
    }))
}

fn is_control_key(key: &str) -> bool {
    key == TEMPLATE_GROUP_KEY || key == TEMPLATE_PIPE_KEY
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Expand every template node in `tree` with the live configuration
pub fn expand_structure(tree: &Value, bindings: &BindingGroups) -> Result<Value> {
    Context::current().expand_structure(tree, bindings)
}

/// Render, parse and pipe a single node
pub fn render_node(node: &TemplateNode, bindings: &BindingGroups) -> Result<Value> {
    TemplateExpander::new().render_node(&Context::current(), node, bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping(value: serde_json::Value) -> Mapping {
        match Value::from(value) {
            Value::Mapping(map) => map,
            other => panic!("expected mapping, got {other:?}"),
        }
    }

    #[test]
    fn test_split_keeps_positions() {
        let map = mapping(json!({
            "a": 1,
            "_template_yaml_": "x: 1",
            "_template_group_": "g",
            "b": 2,
        }));
        let split = split(&map, &PatternRegistry::default()).unwrap().unwrap();
        assert_eq!(split.node.kind, TemplateKind::Yaml);
        assert_eq!(split.node.group.as_deref(), Some("g"));
        assert_eq!(split.before.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(split.after.keys().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_plain_mapping_is_not_a_node() {
        let map = mapping(json!({"a": 1}));
        assert!(split(&map, &PatternRegistry::default()).unwrap().is_none());
    }

    #[test]
    fn test_malformed_nodes_rejected() {
        let registry = PatternRegistry::default();
        for bad in [
            json!({"_template_": "a", "_template_json_": "[]"}),
            json!({"_template_group_": "g", "a": 1}),
            json!({"_template_": 5}),
            json!({"_template_": "a", "_template_group_": ["g"]}),
        ] {
            let err = split(&mapping(bad), &registry).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Template);
        }
    }

    #[test]
    fn test_node_from_mapping() {
        let registry = PatternRegistry::default();
        let node = TemplateNode::from_mapping(
            &mapping(json!({"_template_json_": "[1]", "_template_pipe_": [["_addr_", "sorted"]]})),
            &registry,
        )
        .unwrap();
        assert_eq!(node.kind, TemplateKind::Json);
        assert_eq!(node.pipe.len(), 1);

        let err = TemplateNode::from_mapping(&mapping(json!({"_template_": "a", "k": 1})), &registry).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Template(TemplateError::StrayKeys { ref keys }) if keys == &["k"]
        ));
    }

    #[test]
    fn test_overrides_fill_defaults() {
        let parsed: TemplateOverrides = serde_yaml::from_str("strict: false").unwrap();
        let settings = parsed.into_settings();
        assert!(!settings.strict);
        assert_eq!(settings.default_group, DEFAULT_GROUP);
    }

    #[test]
    fn test_binding_groups_from_mapping() {
        let groups = BindingGroups::from(mapping(json!({"x": 1})));
        assert_eq!(groups.names().collect::<Vec<_>>(), vec![DEFAULT_GROUP]);
        assert!(groups.get("other").is_none());
    }
}
