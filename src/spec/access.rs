//! Path navigation over data and runtime objects.

use std::borrow::Cow;

use tracing::{debug, warn};

use super::path::{format_path, PathSegment};
use super::{ReturnType, SpecOptions, SpecSettings};
use crate::context::Context;
use crate::error::{Result, SpecError};
use crate::value::Value;

/// Effective access behaviour for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessOptions {
    pub return_type: ReturnType,
    pub raise_error: bool,
    pub support_attribute: bool,
}

impl AccessOptions {
    pub fn from_settings(settings: &SpecSettings) -> Self {
        Self {
            return_type: settings.return_type,
            raise_error: settings.raise_error,
            support_attribute: settings.support_attribute,
        }
    }

    /// These options with a node's explicit overrides applied
    pub fn overlay(self, options: &SpecOptions) -> Self {
        Self {
            return_type: options.return_type.unwrap_or(self.return_type),
            raise_error: options.raise_error.unwrap_or(self.raise_error),
            support_attribute: options.support_attribute.unwrap_or(self.support_attribute),
        }
    }
}

/// Walk `path` from `data`.
///
/// Mappings take keys (and decimal keys for index segments), sequences take
/// indices. Anything else goes through the accessor registered for its type
/// name, then (if enabled) a gated attribute lookup.
pub(crate) fn access_with(ctx: &Context, data: &Value, path: &[PathSegment], options: &AccessOptions) -> Result<Value> {
    let mut current = Cow::Borrowed(data);
    for segment in path {
        match step(ctx, &current, segment, path, options)? {
            Some(next) => current = next,
            None => return Ok(Value::Null),
        }
    }
    Ok(options.return_type.apply(&current))
}

/// One navigation step; `Ok(None)` is a tolerated failure
fn step<'a>(
    ctx: &Context,
    current: &Cow<'a, Value>,
    segment: &PathSegment,
    path: &[PathSegment],
    options: &AccessOptions,
) -> Result<Option<Cow<'a, Value>>> {
    let found: std::result::Result<Value, SpecError> = match (current.as_ref(), segment) {
        (Value::Mapping(map), PathSegment::Key(key)) => map.get(key).cloned().ok_or_else(|| SpecError::KeyNotFound {
            key: key.clone(),
            source_path: format_path(path),
        }),
        (Value::Mapping(map), PathSegment::Index(index)) => {
            map.get(&index.to_string())
                .cloned()
                .ok_or_else(|| SpecError::KeyNotFound {
                    key: index.to_string(),
                    source_path: format_path(path),
                })
        }
        (Value::Sequence(items), PathSegment::Index(index)) => {
            items.get(*index).cloned().ok_or(SpecError::IndexOutOfRange {
                index: *index,
                source_path: format_path(path),
            })
        }
        (other, segment) => {
            if let Some(value) = object_step(ctx, other, segment, options)? {
                Ok(value)
            } else {
                Err(SpecError::NotIndexable {
                    type_name: other.type_label().to_string(),
                    segment: segment.to_string(),
                    source_path: format_path(path),
                })
            }
        }
    };

    match found {
        Ok(value) => Ok(Some(Cow::Owned(value))),
        Err(err) if options.raise_error => Err(err.into()),
        Err(err) => {
            warn!("{}; yielding null", err);
            Ok(None)
        }
    }
}

/// Registered accessor, then gated attribute lookup
fn object_step(ctx: &Context, value: &Value, segment: &PathSegment, options: &AccessOptions) -> Result<Option<Value>> {
    if let Value::Object(obj) = value {
        if let Some(accessor) = ctx.accessors.get(obj.type_name()) {
            if let Some(found) = accessor(obj, segment) {
                return Ok(Some(found));
            }
            debug!(type_name = obj.type_name(), segment = %segment, "Accessor declined segment");
        }
    }
    match segment {
        PathSegment::Key(name) if options.support_attribute && !matches!(value, Value::Sequence(_)) => {
            ctx.security.validate_attribute(value.type_label(), name)?;
            Ok(value.get_attr(name))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use crate::spec::Accessor;
    use crate::value::{Mapping, Object, Record};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn options(raise_error: bool) -> AccessOptions {
        AccessOptions {
            raise_error,
            ..AccessOptions::from_settings(&SpecSettings::default())
        }
    }

    fn k(key: &str) -> PathSegment {
        PathSegment::Key(key.to_string())
    }

    fn i(index: usize) -> PathSegment {
        PathSegment::Index(index)
    }

    fn data() -> Value {
        Value::from(json!({
            "user": {"name": "ada", "tags": ["x", "y"]},
            "ports": {"0": 8080},
        }))
    }

    #[test]
    fn test_mapping_and_sequence_navigation() {
        let ctx = Context::current();
        let tags = vec![k("user"), k("tags"), i(1)];
        assert_eq!(access_with(&ctx, &data(), &tags, &options(true)).unwrap(), Value::from("y"));

        // index segment on a mapping reads the decimal key
        let port = vec![k("ports"), i(0)];
        assert_eq!(access_with(&ctx, &data(), &port, &options(true)).unwrap(), Value::Int(8080));

        assert_eq!(access_with(&ctx, &data(), &[], &options(true)).unwrap(), data());
    }

    #[test]
    fn test_failures_raise_or_yield_null() {
        let ctx = Context::current();
        let missing = vec![k("user"), k("email")];
        let err = access_with(&ctx, &data(), &missing, &options(true)).unwrap_err();
        assert!(matches!(err, Error::Spec(SpecError::KeyNotFound { ref key, .. }) if key == "email"));
        assert_eq!(access_with(&ctx, &data(), &missing, &options(false)).unwrap(), Value::Null);

        let out_of_range = vec![k("user"), k("tags"), i(5)];
        let err = access_with(&ctx, &data(), &out_of_range, &options(true)).unwrap_err();
        assert!(matches!(err, Error::Spec(SpecError::IndexOutOfRange { index: 5, .. })));

        let into_sequence = vec![k("user"), k("tags"), k("first")];
        let err = access_with(&ctx, &data(), &into_sequence, &options(true)).unwrap_err();
        assert!(matches!(err, Error::Spec(SpecError::NotIndexable { .. })));
    }

    #[test]
    fn test_attribute_fallback_is_gated() {
        let ctx = Context::current();
        let mut fields = Mapping::new();
        fields.insert("x".into(), Value::Int(3));
        let record = Value::object(Record::new("Point", fields));
        let data = Value::from(vec![record]);

        let x = vec![i(0), k("x")];
        assert_eq!(access_with(&ctx, &data, &x, &options(true)).unwrap(), Value::Int(3));

        let hidden = vec![i(0), k("__dict__")];
        let err = access_with(&ctx, &data, &hidden, &options(false)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Security);

        let disabled = AccessOptions {
            support_attribute: false,
            ..options(true)
        };
        assert!(access_with(&ctx, &data, &x, &disabled).is_err());
    }

    #[test]
    fn test_registered_accessor_runs_first() {
        let accessor: Accessor = Arc::new(|_: &Arc<dyn Object>, segment: &PathSegment| match segment {
            PathSegment::Index(i) => Some(Value::Int(*i as i64 * 10)),
            PathSegment::Key(_) => None,
        });
        let ctx = Context::current().with_accessor("Point", accessor);
        let record = Value::object(Record::new("Point", Mapping::new()));
        let out = access_with(&ctx, &record, &[i(4)], &options(true)).unwrap();
        assert_eq!(out, Value::Int(40));
    }
}
