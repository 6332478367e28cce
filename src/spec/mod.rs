//! Spec Engine
//!
//! Builds new data trees out of existing ones. A spec tree mirrors the
//! output shape; its leaves say where each value comes from:
//!
//! ```yaml
//! name: user.profile.name          # source path
//! first_tag: "tags[0]"             # bracket index
//! kind: "constant: account"        # literal string
//! secret: "skip:"                  # key omitted from the output
//! parser:                          # object built by the pattern engine
//!   _obj_: [{_addr_: int}, {_bind_: {base: 16}}]
//! port:                            # explicit node with a pipeline
//!   _spec_: server.port
//!   _pipe_: [{_addr_: int}]
//! ```
//!
//! ## Dispatch
//!
//! | Node                                   | Spec                         |
//! |----------------------------------------|------------------------------|
//! | string / number / bool                 | spec string (path by default)|
//! | `null`                                 | constant `null`              |
//! | mapping with `_obj_`, `["_obj_", ...]` | object                       |
//! | mapping with `_spec_`                  | explicit node with options   |
//! | other mapping / sequence               | recurse                      |

mod access;
mod construct;
mod path;
mod resolvers;

use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer};
use tracing::info;

use crate::context::{Context, Shared};
use crate::error::{Result, SpecError};
use crate::pattern::{self, Pattern, PatternRegistry};
use crate::value::{format_float, Value};

pub use access::AccessOptions;
pub(crate) use access::access_with;
pub(crate) use construct::construct_with;
pub use path::{format_path, parse_path, PathSegment, ResolverKind, SpecIntermediate};
pub use resolvers::{
    accessor_registry, register_accessor, register_resolver, resolver_registry, Accessor, AccessorRegistry,
    ResolverFn, ResolverRegistry, BUILTIN_RESOLVERS,
};

pub const SPEC_KEY: &str = "_spec_";
pub const KIND_KEY: &str = "_kind_";
pub const PIPE_KEY: &str = "_pipe_";
pub const RETURN_TYPE_KEY: &str = "_return_type_";
pub const RAISE_ERROR_KEY: &str = "_raise_error_";
pub const SUPPORT_ATTRIBUTE_KEY: &str = "_support_attribute_";

// =============================================================================
// SETTINGS
// =============================================================================

/// Copy semantics of values taken from the source data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnType {
    /// Share runtime objects with the source
    #[default]
    Reference,
    /// Fresh containers, shared runtime objects
    ShallowCopy,
    /// Fresh containers, runtime objects deep-cloned where they support it
    DeepCopy,
}

impl ReturnType {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "reference" => Some(ReturnType::Reference),
            "shallow_copy" => Some(ReturnType::ShallowCopy),
            "deep_copy" => Some(ReturnType::DeepCopy),
            _ => None,
        }
    }

    pub(crate) fn apply(self, value: &Value) -> Value {
        match self {
            ReturnType::Reference | ReturnType::ShallowCopy => value.clone(),
            ReturnType::DeepCopy => value.deep_clone(),
        }
    }
}

/// Process-wide access defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSettings {
    pub return_type: ReturnType,
    /// Fail on missing keys / indices instead of yielding `null`
    pub raise_error: bool,
    /// Fall back to (gated) attribute lookup on runtime objects
    pub support_attribute: bool,
}

impl Default for SpecSettings {
    fn default() -> Self {
        Self {
            return_type: ReturnType::Reference,
            raise_error: true,
            support_attribute: true,
        }
    }
}

/// Partial update over the defaults; an all-`None` value resets
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpecOverrides {
    pub return_type: Option<ReturnType>,
    pub raise_error: Option<bool>,
    pub support_attribute: Option<bool>,
}

impl SpecOverrides {
    pub fn into_settings(self) -> SpecSettings {
        let defaults = SpecSettings::default();
        SpecSettings {
            return_type: self.return_type.unwrap_or(defaults.return_type),
            raise_error: self.raise_error.unwrap_or(defaults.raise_error),
            support_attribute: self.support_attribute.unwrap_or(defaults.support_attribute),
        }
    }
}

static SETTINGS: Lazy<Shared<SpecSettings>> = Lazy::new(|| Shared::new(SpecSettings::default()));

pub fn spec_settings() -> Arc<SpecSettings> {
    SETTINGS.snapshot()
}

pub fn configure_spec(overrides: SpecOverrides) {
    let settings = overrides.into_settings();
    info!(
        return_type = ?settings.return_type,
        raise_error = settings.raise_error,
        support_attribute = settings.support_attribute,
        "Spec settings configured"
    );
    SETTINGS.replace(settings);
}

// =============================================================================
// SPEC TREE
// =============================================================================

/// Per-node pipeline and access overrides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecOptions {
    /// Applied in order to the node's value
    pub pipe: Vec<Pattern>,
    pub return_type: Option<ReturnType>,
    pub raise_error: Option<bool>,
    pub support_attribute: Option<bool>,
}

/// Shape-dispatched node of a flexible spec
#[derive(Debug, Clone, PartialEq)]
pub enum FlexNode {
    Null,
    Raw(SpecIntermediate),
    Object(Vec<Pattern>),
    Mapping(IndexMap<String, Spec>),
    Sequence(Vec<Spec>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Spec {
    /// One spec string
    Raw {
        intermediate: SpecIntermediate,
        options: SpecOptions,
    },
    /// Object construction via the pattern engine
    Object {
        steps: Vec<Pattern>,
        options: SpecOptions,
    },
    /// Shape-dispatched tree
    Flex { node: FlexNode, options: SpecOptions },
}

impl Spec {
    pub fn options(&self) -> &SpecOptions {
        match self {
            Spec::Raw { options, .. } | Spec::Object { options, .. } | Spec::Flex { options, .. } => options,
        }
    }

    pub fn options_mut(&mut self) -> &mut SpecOptions {
        match self {
            Spec::Raw { options, .. } | Spec::Object { options, .. } | Spec::Flex { options, .. } => options,
        }
    }

    /// Append a pipeline step
    pub fn with_pipe(mut self, step: Pattern) -> Self {
        self.options_mut().pipe.push(step);
        self
    }

    pub fn with_return_type(mut self, return_type: ReturnType) -> Self {
        self.options_mut().return_type = Some(return_type);
        self
    }

    pub fn with_raise_error(mut self, raise_error: bool) -> Self {
        self.options_mut().raise_error = Some(raise_error);
        self
    }

    pub fn with_support_attribute(mut self, support_attribute: bool) -> Self {
        self.options_mut().support_attribute = Some(support_attribute);
        self
    }
}

// =============================================================================
// PARSING
// =============================================================================

impl Spec {
    /// Raw spec from one spec string, against the live resolver registry
    pub fn raw(raw: &str) -> Result<Self> {
        Ok(Spec::Raw {
            intermediate: SpecIntermediate::parse(raw, &resolver_registry())?,
            options: SpecOptions::default(),
        })
    }

    /// Object spec from an object pattern config
    pub fn object(config: &Value) -> Result<Self> {
        Ok(Spec::Object {
            steps: object_steps(config, &pattern::pattern_registry())?,
            options: SpecOptions::default(),
        })
    }

    /// Flexible spec, against the live registries
    pub fn flex(config: &Value) -> Result<Self> {
        SpecParser::new(&pattern::pattern_registry(), &resolver_registry()).flex(config)
    }

    /// Flexible spec, against the registries of `ctx`
    pub fn flex_in(ctx: &Context, config: &Value) -> Result<Self> {
        SpecParser::new(&ctx.patterns, &ctx.resolvers).flex(config)
    }
}

impl<'de> Deserialize<'de> for Spec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Spec::flex(&value).map_err(serde::de::Error::custom)
    }
}

/// Object steps from either an object-form config or any single pattern
fn object_steps(config: &Value, patterns: &PatternRegistry) -> Result<Vec<Pattern>> {
    match Pattern::parse(config, patterns)? {
        Pattern::Object { steps } => Ok(steps),
        other => Ok(vec![other]),
    }
}

struct SpecParser<'a> {
    patterns: &'a PatternRegistry,
    resolvers: &'a ResolverRegistry,
}

impl<'a> SpecParser<'a> {
    fn new(patterns: &'a PatternRegistry, resolvers: &'a ResolverRegistry) -> Self {
        Self { patterns, resolvers }
    }

    fn flex(&self, config: &Value) -> Result<Spec> {
        let node = match config {
            Value::Null => FlexNode::Null,
            Value::String(s) => FlexNode::Raw(SpecIntermediate::parse(s, self.resolvers)?),
            Value::Int(i) => FlexNode::Raw(SpecIntermediate::parse(&i.to_string(), self.resolvers)?),
            Value::Float(f) => FlexNode::Raw(SpecIntermediate::parse(&format_float(*f), self.resolvers)?),
            Value::Bool(b) => FlexNode::Raw(SpecIntermediate::parse(&b.to_string(), self.resolvers)?),
            Value::Mapping(map) if map.contains_key(SPEC_KEY) => return self.explicit(map),
            value if pattern::is_object_form(value) => FlexNode::Object(object_steps(value, self.patterns)?),
            Value::Mapping(map) => {
                let mut children = IndexMap::with_capacity(map.len());
                for (key, child) in map {
                    children.insert(key.clone(), self.flex(child)?);
                }
                FlexNode::Mapping(children)
            }
            Value::Sequence(items) => FlexNode::Sequence(
                items
                    .iter()
                    .map(|item| self.flex(item))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(obj) => {
                return Err(SpecError::Unsupported {
                    message: format!("runtime object of type {} in a spec", obj.type_name()),
                }
                .into())
            }
        };
        Ok(Spec::Flex {
            node,
            options: SpecOptions::default(),
        })
    }

    /// `{"_spec_": body, "_kind_": ..., "_pipe_": ..., ...}`
    fn explicit(&self, map: &crate::value::Mapping) -> Result<Spec> {
        const ALLOWED: &[&str] = &[
            SPEC_KEY,
            KIND_KEY,
            PIPE_KEY,
            RETURN_TYPE_KEY,
            RAISE_ERROR_KEY,
            SUPPORT_ATTRIBUTE_KEY,
        ];
        let stray: Vec<&str> = map
            .keys()
            .map(String::as_str)
            .filter(|k| !ALLOWED.contains(k))
            .collect();
        if !stray.is_empty() {
            return Err(unsupported(format!("unexpected keys beside {SPEC_KEY}: {stray:?}")));
        }

        let body = &map[SPEC_KEY];
        let kind = match map.get(KIND_KEY) {
            None | Some(Value::Null) => "flex",
            Some(Value::String(kind)) => kind.as_str(),
            Some(other) => return Err(unsupported(format!("{KIND_KEY} must be a string, found a {}", other.shape()))),
        };

        let mut spec = match kind {
            "raw" => {
                let raw = match body {
                    Value::String(s) => s.clone(),
                    Value::Int(i) => i.to_string(),
                    Value::Float(f) => format_float(*f),
                    Value::Bool(b) => b.to_string(),
                    other => return Err(unsupported(format!("raw spec must be a scalar, found a {}", other.shape()))),
                };
                Spec::Raw {
                    intermediate: SpecIntermediate::parse(&raw, self.resolvers)?,
                    options: SpecOptions::default(),
                }
            }
            "object" => Spec::Object {
                steps: object_steps(body, self.patterns)?,
                options: SpecOptions::default(),
            },
            "flex" => self.flex(body)?,
            other => return Err(unsupported(format!("unknown {KIND_KEY} {other:?}"))),
        };

        let options = spec.options_mut();
        if let Some(pipe) = map.get(PIPE_KEY) {
            options.pipe = pattern::parse_pipeline(pipe, self.patterns)?;
        }
        if let Some(value) = map.get(RETURN_TYPE_KEY).filter(|v| !v.is_null()) {
            let return_type = value
                .as_str()
                .and_then(ReturnType::parse)
                .ok_or_else(|| unsupported(format!("invalid {RETURN_TYPE_KEY}: {value}")))?;
            options.return_type = Some(return_type);
        }
        options.raise_error = flag(map, RAISE_ERROR_KEY)?;
        options.support_attribute = flag(map, SUPPORT_ATTRIBUTE_KEY)?;
        Ok(spec)
    }
}

fn unsupported(message: String) -> crate::error::Error {
    SpecError::Unsupported { message }.into()
}

fn flag(map: &crate::value::Mapping, key: &str) -> Result<Option<bool>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(unsupported(format!("{key} must be a boolean, found a {}", other.shape()))),
    }
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Construct against the live process-wide state
pub fn construct(data: &Value, spec: &Spec) -> Result<Value> {
    Context::current().construct(data, spec)
}

/// Navigate `path` in `data` with the live defaults
pub fn access(data: &Value, path: &[PathSegment]) -> Result<Value> {
    let ctx = Context::current();
    let options = AccessOptions::from_settings(&ctx.spec);
    access_with(&ctx, data, path, &options)
}

/// Parse one spec string against the live resolver registry
pub fn parse_spec(raw: &str) -> Result<SpecIntermediate> {
    Ok(SpecIntermediate::parse(raw, &resolver_registry())?)
}
