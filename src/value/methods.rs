//! Methods exposed on plain values through attribute access
//!
//! `"a,b".split` resolves to a bound native function capturing the receiver.

use super::object::{NativeFunction, Signature};
use super::{Mapping, Value};

pub(super) fn method(receiver: &Value, name: &str) -> Option<Value> {
    let func = match receiver {
        Value::String(s) => string_method(s.clone(), name)?,
        Value::Mapping(map) => mapping_method(map.clone(), name)?,
        Value::Sequence(items) => sequence_method(items.clone(), name)?,
        _ => return None,
    };
    Some(Value::object(func))
}

fn string_method(s: String, name: &str) -> Option<NativeFunction> {
    let sig = Signature::new(format!("str.{name}"));
    let func = match name {
        "upper" => NativeFunction::new(sig, move |_| Ok(s.to_uppercase().into())),
        "lower" => NativeFunction::new(sig, move |_| Ok(s.to_lowercase().into())),
        "strip" => NativeFunction::new(sig, move |_| Ok(s.trim().into())),
        "lstrip" => NativeFunction::new(sig, move |_| Ok(s.trim_start().into())),
        "rstrip" => NativeFunction::new(sig, move |_| Ok(s.trim_end().into())),
        "title" => NativeFunction::new(sig, move |_| Ok(title_case(&s).into())),
        "capitalize" => NativeFunction::new(sig, move |_| {
            let mut chars = s.chars();
            let out: String = match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            };
            Ok(out.into())
        }),
        "startswith" => NativeFunction::new(sig.arg("prefix"), move |args| {
            Ok(s.starts_with(args.str(0)?).into())
        }),
        "endswith" => NativeFunction::new(sig.arg("suffix"), move |args| {
            Ok(s.ends_with(args.str(0)?).into())
        }),
        "replace" => NativeFunction::new(sig.arg("old").arg("new"), move |args| {
            Ok(s.replace(args.str(0)?, args.str(1)?).into())
        }),
        "split" => NativeFunction::new(sig.arg_default("sep", Value::Null), move |args| {
            let parts: Vec<Value> = match args.get(0) {
                Value::Null => s.split_whitespace().map(Value::from).collect(),
                _ => {
                    let sep = args.str(0)?;
                    if sep.is_empty() {
                        return Err(args.value_error("empty separator"));
                    }
                    s.split(sep).map(Value::from).collect()
                }
            };
            Ok(Value::Sequence(parts))
        }),
        "join" => NativeFunction::new(sig.arg("iterable"), move |args| {
            let items = args
                .get(0)
                .as_sequence()
                .ok_or_else(|| args.type_error("can only join a sequence"))?;
            let parts = items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| args.type_error("sequence item is not a str"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(parts.join(s.as_str()).into())
        }),
        _ => return None,
    };
    Some(func)
}

fn mapping_method(map: Mapping, name: &str) -> Option<NativeFunction> {
    let sig = Signature::new(format!("dict.{name}"));
    let func = match name {
        "keys" => NativeFunction::new(sig, move |_| {
            Ok(Value::Sequence(map.keys().cloned().map(Value::from).collect()))
        }),
        "values" => NativeFunction::new(sig, move |_| {
            Ok(Value::Sequence(map.values().cloned().collect()))
        }),
        "items" => NativeFunction::new(sig, move |_| {
            Ok(Value::Sequence(
                map.iter()
                    .map(|(k, v)| Value::Sequence(vec![Value::from(k.as_str()), v.clone()]))
                    .collect(),
            ))
        }),
        "get" => NativeFunction::new(
            sig.arg("key").arg_default("default", Value::Null),
            move |args| {
                let key = args.str(0)?;
                Ok(map.get(key).cloned().unwrap_or_else(|| args.get(1).clone()))
            },
        ),
        _ => return None,
    };
    Some(func)
}

fn sequence_method(items: Vec<Value>, name: &str) -> Option<NativeFunction> {
    let sig = Signature::new(format!("list.{name}"));
    let func = match name {
        "count" => NativeFunction::new(sig.arg("value"), move |args| {
            Ok(items.iter().filter(|item| *item == args.get(0)).count().into())
        }),
        "index" => NativeFunction::new(sig.arg("value"), move |args| {
            items
                .iter()
                .position(|item| item == args.get(0))
                .map(Value::from)
                .ok_or_else(|| args.value_error("value is not in list"))
        }),
        _ => return None,
    };
    Some(func)
}

pub(crate) fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start = false;
        } else {
            out.push(c);
            start = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::CallArgs;
    use serde_json::json;

    fn call(receiver: Value, name: &str, args: CallArgs) -> Value {
        let method = receiver.get_attr(name).unwrap();
        method.as_object().unwrap().call(args).unwrap()
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(call("abc".into(), "upper", CallArgs::new()), Value::from("ABC"));
        assert_eq!(
            call("a,b".into(), "split", CallArgs::new().arg(",")),
            Value::from(json!(["a", "b"]))
        );
        assert_eq!(
            call("-".into(), "join", CallArgs::new().arg(Value::from(json!(["x", "y"])))),
            Value::from("x-y")
        );
        assert_eq!(title_case("hello wide world"), "Hello Wide World");
    }

    #[test]
    fn test_mapping_and_sequence_methods() {
        let map = Value::from(json!({"a": 1, "b": 2}));
        assert_eq!(call(map.clone(), "keys", CallArgs::new()), Value::from(json!(["a", "b"])));
        assert_eq!(
            call(map, "get", CallArgs::new().arg("z").arg(0)),
            Value::Int(0)
        );
        let seq = Value::from(json!([1, 2, 2]));
        assert_eq!(call(seq, "count", CallArgs::new().arg(2)), Value::Int(2));
    }

    #[test]
    fn test_unknown_method_is_none() {
        assert!(Value::from("x").get_attr("format_map").is_none());
        assert!(Value::Int(1).get_attr("real").is_none());
    }
}
