//! Pattern Engine
//!
//! A small interpreter over a value stack. Each [`Pattern`] is one step:
//!
//! | Pattern     | Stack effect                                         |
//! |-------------|------------------------------------------------------|
//! | `Address`   | push the resolved name                               |
//! | `Attribute` | pop, read the (gated) attribute, push                |
//! | `Call`      | pop a callable, invoke with resolved arguments, push |
//! | `Bind`      | pop a callable, push a partial application           |
//! | `Object`    | run nested steps on a fresh stack, push the result   |
//!
//! ## Config forms
//!
//! ```yaml
//! # mapping form
//! _obj_:
//!   - _addr_: collections.namedtuple
//!   - _call_: {typename: Point, field_names: [x, y]}
//!
//! # list form
//! ["_obj_", ["_addr_", "math.pow"], ["_bind_", 2]]
//! ```
//!
//! In list form every element after the tag is one positional argument.
//! In mapping form a `Call`/`Bind` body that is a sequence supplies
//! positional arguments, a mapping supplies named arguments, any other value
//! is a single positional argument. The bare string `"_call_"` calls with no
//! arguments.

mod engine;
mod registry;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::InstantiationError;
use crate::value::{Mapping, Value};

pub use engine::{evaluate, instantiate, PatternResult};
pub(crate) use engine::{apply_pipeline, evaluate_object, instantiate_with};
pub use registry::{pattern_registry, register_pattern, PatternExtension, PatternRegistry};

pub const ADDRESS_KEY: &str = "_addr_";
pub const FILE_KEY: &str = "_file_";
pub const ATTRIBUTE_KEY: &str = "_attr_";
pub const CALL_KEY: &str = "_call_";
pub const BIND_KEY: &str = "_bind_";
pub const OBJECT_KEY: &str = "_obj_";

/// Keys that can never be claimed by an extension
pub const RESERVED_KEYS: &[&str] = &[ADDRESS_KEY, FILE_KEY, ATTRIBUTE_KEY, CALL_KEY, BIND_KEY, OBJECT_KEY];

// =============================================================================
// TYPES
// =============================================================================

/// Arguments of a `Call` / `Bind`
#[derive(Debug, Clone, PartialEq)]
pub enum Arguments {
    Positional(Vec<Value>),
    Named(Mapping),
}

impl Arguments {
    pub fn none() -> Self {
        Arguments::Positional(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Arguments::Positional(values) => values.is_empty(),
            Arguments::Named(map) => map.is_empty(),
        }
    }

    /// Sequence → positional, mapping → named, `null` → none, else one
    /// positional argument
    fn from_body(body: &Value) -> Self {
        match body {
            Value::Sequence(values) => Arguments::Positional(values.clone()),
            Value::Mapping(map) => Arguments::Named(map.clone()),
            Value::Null => Arguments::none(),
            other => Arguments::Positional(vec![other.clone()]),
        }
    }
}

/// Handle to a registered extension; compares equal to any other handle so
/// patterns compare by tag and body
#[derive(Clone)]
pub struct ExtensionHandler(pub Arc<dyn PatternExtension>);

impl std::fmt::Debug for ExtensionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ExtensionHandler")
    }
}

impl PartialEq for ExtensionHandler {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

/// One construction step
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Address {
        address: String,
        file: Option<PathBuf>,
    },
    Attribute {
        attribute: String,
    },
    Call {
        args: Arguments,
    },
    Bind {
        args: Arguments,
    },
    Object {
        steps: Vec<Pattern>,
    },
    Extension {
        tag: String,
        body: Value,
        handler: ExtensionHandler,
    },
}

impl Pattern {
    pub fn address(address: impl Into<String>) -> Self {
        Pattern::Address {
            address: address.into(),
            file: None,
        }
    }

    pub fn attribute(attribute: impl Into<String>) -> Self {
        Pattern::Attribute {
            attribute: attribute.into(),
        }
    }

    pub fn call(args: Arguments) -> Self {
        Pattern::Call { args }
    }

    pub fn bind(args: Arguments) -> Self {
        Pattern::Bind { args }
    }

    pub fn object(steps: Vec<Pattern>) -> Self {
        Pattern::Object { steps }
    }

    /// Short kind name used in errors and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Pattern::Address { .. } => "address",
            Pattern::Attribute { .. } => "attribute",
            Pattern::Call { .. } => "call",
            Pattern::Bind { .. } => "bind",
            Pattern::Object { .. } => "object",
            Pattern::Extension { .. } => "extension",
        }
    }
}

// =============================================================================
// PARSING
// =============================================================================

fn invalid(message: impl Into<String>) -> InstantiationError {
    InstantiationError::InvalidPattern {
        message: message.into(),
    }
}

/// Whether `value` is written in `Object` form (mapping with `_obj_` or a
/// list headed by `"_obj_"`)
pub fn is_object_form(value: &Value) -> bool {
    match value {
        Value::Mapping(map) => map.contains_key(OBJECT_KEY),
        Value::Sequence(items) => items.first().and_then(Value::as_str) == Some(OBJECT_KEY),
        _ => false,
    }
}

impl Pattern {
    /// Parse against the process-wide extension registry
    pub fn from_value(value: &Value) -> Result<Self, InstantiationError> {
        Self::parse(value, &pattern_registry())
    }

    /// Discriminated-union parse: the designated key (mapping form) or
    /// leading tag (list form) selects the variant
    pub fn parse(value: &Value, registry: &PatternRegistry) -> Result<Self, InstantiationError> {
        match value {
            Value::String(s) if s == CALL_KEY => Ok(Pattern::call(Arguments::none())),
            Value::Sequence(items) => Self::parse_list(items, registry),
            Value::Mapping(map) => Self::parse_mapping(map, registry),
            other => Err(invalid(format!("a {} is not a pattern", other.shape()))),
        }
    }

    fn parse_list(items: &[Value], registry: &PatternRegistry) -> Result<Self, InstantiationError> {
        let Some((tag, rest)) = items.split_first() else {
            return Err(invalid("empty list is not a pattern"));
        };
        match tag.as_str() {
            Some(ADDRESS_KEY) => match rest {
                [address] => parse_address(address, None),
                [address, file] => parse_address(address, Some(file)),
                _ => Err(invalid("address pattern takes an address and an optional file")),
            },
            Some(ATTRIBUTE_KEY) => match rest {
                [attribute] => parse_attribute(attribute),
                _ => Err(invalid("attribute pattern takes exactly one name")),
            },
            Some(CALL_KEY) => Ok(Pattern::call(Arguments::Positional(rest.to_vec()))),
            Some(BIND_KEY) if rest.is_empty() => Err(invalid("bind pattern needs arguments")),
            Some(BIND_KEY) => Ok(Pattern::bind(Arguments::Positional(rest.to_vec()))),
            Some(OBJECT_KEY) => parse_steps(rest, registry),
            Some(other) => Err(invalid(format!("unknown pattern tag {other:?}"))),
            None => Err(invalid("list pattern must start with a tag")),
        }
    }

    fn parse_mapping(map: &Mapping, registry: &PatternRegistry) -> Result<Self, InstantiationError> {
        let only_key = |key: &str| -> Result<(), InstantiationError> {
            let extra: Vec<&str> = map
                .keys()
                .map(String::as_str)
                .filter(|k| *k != key)
                .collect();
            if extra.is_empty() {
                Ok(())
            } else {
                Err(invalid(format!("unexpected keys beside {key}: {extra:?}")))
            }
        };

        if let Some(address) = map.get(ADDRESS_KEY) {
            let extra: Vec<&str> = map
                .keys()
                .map(String::as_str)
                .filter(|k| *k != ADDRESS_KEY && *k != FILE_KEY)
                .collect();
            if !extra.is_empty() {
                return Err(invalid(format!("unexpected keys beside {ADDRESS_KEY}: {extra:?}")));
            }
            return parse_address(address, map.get(FILE_KEY));
        }
        if let Some(attribute) = map.get(ATTRIBUTE_KEY) {
            only_key(ATTRIBUTE_KEY)?;
            return parse_attribute(attribute);
        }
        if let Some(body) = map.get(CALL_KEY) {
            only_key(CALL_KEY)?;
            return Ok(Pattern::call(Arguments::from_body(body)));
        }
        if let Some(body) = map.get(BIND_KEY) {
            only_key(BIND_KEY)?;
            let args = Arguments::from_body(body);
            if args.is_empty() {
                return Err(invalid("bind pattern needs arguments"));
            }
            return Ok(Pattern::bind(args));
        }
        if let Some(body) = map.get(OBJECT_KEY) {
            only_key(OBJECT_KEY)?;
            return match body {
                Value::Sequence(steps) => parse_steps(steps, registry),
                other => Err(invalid(format!(
                    "{OBJECT_KEY} must hold a list of steps, found a {}",
                    other.shape()
                ))),
            };
        }

        let mut keys = map.keys();
        match (keys.next(), keys.next()) {
            (Some(tag), None) => match registry.get(tag) {
                Some(handler) => {
                    let body = &map[tag.as_str()];
                    handler.validate(body).map_err(|message| InstantiationError::Extension {
                        tag: tag.clone(),
                        message,
                    })?;
                    Ok(Pattern::Extension {
                        tag: tag.clone(),
                        body: body.clone(),
                        handler: ExtensionHandler(Arc::clone(handler)),
                    })
                }
                None => Err(invalid(format!("unknown pattern key {tag:?}"))),
            },
            (None, _) => Err(invalid("empty mapping is not a pattern")),
            _ => Err(invalid(format!(
                "mapping has no pattern key: {:?}",
                map.keys().collect::<Vec<_>>()
            ))),
        }
    }
}

fn parse_address(address: &Value, file: Option<&Value>) -> Result<Pattern, InstantiationError> {
    let address = match address.as_str() {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => return Err(invalid("address must be a non-empty string")),
    };
    let file = match file {
        None | Some(Value::Null) => None,
        Some(Value::String(path)) if !path.is_empty() => Some(PathBuf::from(path)),
        Some(_) => return Err(invalid("file must be a non-empty path string")),
    };
    Ok(Pattern::Address { address, file })
}

fn parse_attribute(attribute: &Value) -> Result<Pattern, InstantiationError> {
    match attribute.as_str() {
        Some(s) if !s.is_empty() => Ok(Pattern::attribute(s)),
        _ => Err(invalid("attribute must be a non-empty string")),
    }
}

fn parse_steps(steps: &[Value], registry: &PatternRegistry) -> Result<Pattern, InstantiationError> {
    if steps.is_empty() {
        return Err(invalid("object pattern needs at least one step"));
    }
    let steps = steps
        .iter()
        .map(|step| Pattern::parse(step, registry))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Pattern::Object { steps })
}

/// Parse a pipeline: one pattern or a list of patterns
pub fn parse_pipeline(value: &Value, registry: &PatternRegistry) -> Result<Vec<Pattern>, InstantiationError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) if starts_with_tag(items) => Ok(vec![Pattern::parse(value, registry)?]),
        Value::Sequence(items) => items.iter().map(|item| Pattern::parse(item, registry)).collect(),
        Value::Mapping(_) => Ok(vec![Pattern::parse(value, registry)?]),
        other => Err(invalid(format!("a pipeline cannot be a {}", other.shape()))),
    }
}

fn starts_with_tag(items: &[Value]) -> bool {
    matches!(
        items.first().and_then(Value::as_str),
        Some(ADDRESS_KEY | ATTRIBUTE_KEY | CALL_KEY | BIND_KEY | OBJECT_KEY)
    )
}

// =============================================================================
// SERIALIZATION
// =============================================================================

impl Pattern {
    /// Canonical config form (list form where one exists)
    pub fn to_value(&self) -> Value {
        let tagged = |tag: &str, rest: Vec<Value>| {
            let mut items = vec![Value::from(tag)];
            items.extend(rest);
            Value::Sequence(items)
        };
        let keyed = |tag: &str, body: Value| {
            let mut map = Mapping::new();
            map.insert(tag.to_string(), body);
            Value::Mapping(map)
        };
        match self {
            Pattern::Address { address, file: None } => tagged(ADDRESS_KEY, vec![address.as_str().into()]),
            Pattern::Address {
                address,
                file: Some(file),
            } => tagged(
                ADDRESS_KEY,
                vec![address.as_str().into(), file.to_string_lossy().into_owned().into()],
            ),
            Pattern::Attribute { attribute } => tagged(ATTRIBUTE_KEY, vec![attribute.as_str().into()]),
            Pattern::Call { args } if args.is_empty() => Value::from(CALL_KEY),
            Pattern::Call {
                args: Arguments::Positional(values),
            } => tagged(CALL_KEY, values.clone()),
            Pattern::Call {
                args: Arguments::Named(map),
            } => keyed(CALL_KEY, Value::Mapping(map.clone())),
            Pattern::Bind {
                args: Arguments::Positional(values),
            } => tagged(BIND_KEY, values.clone()),
            Pattern::Bind {
                args: Arguments::Named(map),
            } => keyed(BIND_KEY, Value::Mapping(map.clone())),
            Pattern::Object { steps } => tagged(OBJECT_KEY, steps.iter().map(Pattern::to_value).collect()),
            Pattern::Extension { tag, body, .. } => keyed(tag, body.clone()),
        }
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Pattern::from_value(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse(json: serde_json::Value) -> Result<Pattern, InstantiationError> {
        Pattern::parse(&Value::from(json), &PatternRegistry::default())
    }

    #[test]
    fn test_bind_body_shape_depends_on_form() {
        let from_map = parse(json!({"_obj_": [
            {"_addr_": "int"},
            {"_bind_": {"base": 16}},
        ]}))
        .unwrap();
        let from_list = parse(json!(["_obj_", ["_addr_", "int"], ["_bind_", {"base": 16}]])).unwrap();
        assert_ne!(from_map, from_list);
        // list-form bind with a mapping element is one positional argument
        assert_eq!(
            from_list,
            Pattern::object(vec![
                Pattern::address("int"),
                Pattern::bind(Arguments::Positional(vec![Value::from(json!({"base": 16}))])),
            ])
        );
        assert_eq!(
            from_map,
            Pattern::object(vec![
                Pattern::address("int"),
                Pattern::bind(Arguments::Named(
                    Value::from(json!({"base": 16})).as_mapping().unwrap().clone()
                )),
            ])
        );
    }

    #[test]
    fn test_call_body_shapes() {
        assert_eq!(parse(json!("_call_")).unwrap(), Pattern::call(Arguments::none()));
        assert_eq!(
            parse(json!({"_call_": 5})).unwrap(),
            Pattern::call(Arguments::Positional(vec![Value::Int(5)]))
        );
        assert_eq!(
            parse(json!({"_call_": [1, 2]})).unwrap(),
            Pattern::call(Arguments::Positional(vec![Value::Int(1), Value::Int(2)]))
        );
        assert_eq!(parse(json!({"_call_": null})).unwrap(), Pattern::call(Arguments::none()));
    }

    #[test]
    fn test_address_with_file() {
        assert_eq!(
            parse(json!({"_addr_": "parser", "_file_": "mods/helpers.yaml"})).unwrap(),
            Pattern::Address {
                address: "parser".into(),
                file: Some(PathBuf::from("mods/helpers.yaml"))
            }
        );
        assert!(parse(json!(["_addr_", "x", "f.yaml", "extra"])).is_err());
    }

    #[test]
    fn test_malformed_patterns_rejected() {
        for bad in [
            json!({"_attr_": "x", "other": 1}),
            json!({"_obj_": []}),
            json!({"_obj_": "int"}),
            json!(["_bind_"]),
            json!({"_addr_": ""}),
            json!(["_nope_", 1]),
            json!({"mystery": 1}),
            json!("call"),
            json!(42),
        ] {
            assert!(parse(bad.clone()).is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn test_to_value_reparses() {
        let pattern = parse(json!({"_obj_": [
            {"_addr_": "math.pow"},
            {"_call_": {"x": 2, "y": 3}},
            "_call_",
            ["_attr_", "real"],
        ]}))
        .unwrap();
        let serialized = pattern.to_value();
        assert_eq!(
            serialized,
            Value::from(json!(["_obj_", ["_addr_", "math.pow"], {"_call_": {"x": 2, "y": 3}}, "_call_", ["_attr_", "real"]]))
        );
        assert_eq!(parse(serialized.to_json().unwrap()).unwrap(), pattern);
    }

    #[test]
    fn test_pipeline_forms() {
        let registry = PatternRegistry::default();
        let single = parse_pipeline(&Value::from(json!(["_addr_", "int"])), &registry).unwrap();
        assert_eq!(single, vec![Pattern::address("int")]);
        let many = parse_pipeline(&Value::from(json!([["_addr_", "int"], {"_addr_": "str"}])), &registry).unwrap();
        assert_eq!(many, vec![Pattern::address("int"), Pattern::address("str")]);
        assert!(parse_pipeline(&Value::Null, &registry).unwrap().is_empty());
        assert!(parse_pipeline(&Value::from("int"), &registry).is_err());
    }

    #[test]
    fn test_object_form_detection() {
        assert!(is_object_form(&Value::from(json!({"_obj_": []}))));
        assert!(is_object_form(&Value::from(json!(["_obj_"]))));
        assert!(!is_object_form(&Value::from(json!(["_addr_", "x"]))));
        assert!(!is_object_form(&Value::from("_obj_")));
    }
}
