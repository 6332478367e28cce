//! The `builtins` namespace

use std::cmp::Ordering;

use crate::error::CallError;
use crate::value::{BoundArgs, Mapping, Module, Signature, Value};

/// Upper bound on materialized `range` results
const MAX_RANGE_LEN: i64 = 1_000_000;

pub(super) fn module() -> Module {
    Module::new("builtins", Mapping::new())
        // constructors
        .with_fn(Signature::new("bool").arg_default("x", false), |args| {
            Ok(Value::Bool(args.get(0).truthy()))
        })
        .with_fn(
            Signature::new("int").arg_default("x", 0).arg_default("base", 10),
            to_int,
        )
        .with_fn(Signature::new("float").arg_default("x", 0.0), to_float)
        .with_fn(Signature::new("str").arg_default("object", ""), |args| {
            Ok(Value::String(args.get(0).to_string()))
        })
        .with_fn(
            Signature::new("list").arg_default("iterable", Value::Sequence(Vec::new())),
            |args| Ok(Value::Sequence(iterate(&args, 0)?)),
        )
        .with_fn(
            Signature::new("tuple").arg_default("iterable", Value::Sequence(Vec::new())),
            |args| Ok(Value::Sequence(iterate(&args, 0)?)),
        )
        .with_fn(
            Signature::new("set").arg_default("iterable", Value::Sequence(Vec::new())),
            |args| {
                let mut unique: Vec<Value> = Vec::new();
                for item in iterate(&args, 0)? {
                    if !unique.contains(&item) {
                        unique.push(item);
                    }
                }
                Ok(Value::Sequence(unique))
            },
        )
        .with_fn(
            Signature::new("dict")
                .arg_default("mapping", Value::Null)
                .var_keyword(),
            to_dict,
        )
        // helpers
        .with_fn(Signature::new("len").arg("obj"), |args| match args.get(0) {
            Value::String(s) => Ok(s.chars().count().into()),
            Value::Sequence(items) => Ok(items.len().into()),
            Value::Mapping(map) => Ok(map.len().into()),
            other => Err(args.type_error(format!(
                "object of type '{}' has no len()",
                other.type_label()
            ))),
        })
        .with_fn(Signature::new("abs").arg("x"), |args| match args.get(0) {
            Value::Int(i) => i
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(|| args.value_error("integer overflow")),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(args.type_error(format!(
                "bad operand type for abs(): '{}'",
                other.type_label()
            ))),
        })
        .with_fn(Signature::new("min").variadic(), |args| {
            extreme(&args, Ordering::Less)
        })
        .with_fn(Signature::new("max").variadic(), |args| {
            extreme(&args, Ordering::Greater)
        })
        .with_fn(
            Signature::new("sum").arg("iterable").arg_default("start", 0),
            |args| {
                iterate(&args, 0)?
                    .iter()
                    .try_fold(args.get(1).clone(), |acc, item| add(&args, &acc, item))
            },
        )
        .with_fn(
            Signature::new("round")
                .arg("number")
                .arg_default("ndigits", Value::Null),
            round,
        )
        .with_fn(
            Signature::new("sorted")
                .arg("iterable")
                .arg_default("reverse", false),
            |args| {
                let mut items = iterate(&args, 0)?;
                let mut failed = false;
                items.sort_by(|a, b| {
                    compare(a, b).unwrap_or_else(|| {
                        failed = true;
                        Ordering::Equal
                    })
                });
                if failed {
                    return Err(args.type_error("elements are not mutually comparable"));
                }
                if args.get(1).truthy() {
                    items.reverse();
                }
                Ok(Value::Sequence(items))
            },
        )
        .with_fn(Signature::new("reversed").arg("sequence"), |args| {
            let mut items = iterate(&args, 0)?;
            items.reverse();
            Ok(Value::Sequence(items))
        })
        .with_fn(
            Signature::new("range")
                .arg("start")
                .arg_default("stop", Value::Null)
                .arg_default("step", 1),
            range,
        )
        .with_fn(
            Signature::new("enumerate")
                .arg("iterable")
                .arg_default("start", 0),
            |args| {
                let start = args.int(1)?;
                iterate(&args, 0)?
                    .into_iter()
                    .enumerate()
                    .map(|(offset, item)| -> Result<Value, CallError> {
                        let index = i64::try_from(offset)
                            .ok()
                            .and_then(|offset| start.checked_add(offset))
                            .ok_or_else(|| args.value_error("integer overflow"))?;
                        Ok(Value::Sequence(vec![Value::Int(index), item]))
                    })
                    .collect::<Result<Vec<_>, CallError>>()
                    .map(Value::Sequence)
            },
        )
        .with_fn(Signature::new("zip").variadic(), |args| {
            let columns = args
                .rest
                .iter()
                .map(|value| iterate_value(&args, value))
                .collect::<Result<Vec<_>, _>>()?;
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            Ok(Value::Sequence(
                (0..len)
                    .map(|i| Value::Sequence(columns.iter().map(|c| c[i].clone()).collect()))
                    .collect(),
            ))
        })
        .with_fn(Signature::new("all").arg("iterable"), |args| {
            Ok(Value::Bool(iterate(&args, 0)?.iter().all(Value::truthy)))
        })
        .with_fn(Signature::new("any").arg("iterable"), |args| {
            Ok(Value::Bool(iterate(&args, 0)?.iter().any(Value::truthy)))
        })
        .with_fn(Signature::new("pow").arg("base").arg("exp"), |args| {
            match (args.get(0), args.get(1)) {
                (Value::Int(base), Value::Int(exp)) if *exp >= 0 => u32::try_from(*exp)
                    .ok()
                    .and_then(|exp| base.checked_pow(exp))
                    .map(Value::Int)
                    .ok_or_else(|| args.value_error("integer overflow")),
                _ => Ok(Value::Float(args.float(0)?.powf(args.float(1)?))),
            }
        })
        .with_fn(Signature::new("divmod").arg("a").arg("b"), |args| {
            match (args.get(0), args.get(1)) {
                (Value::Int(a), Value::Int(b)) => {
                    let (q, r) = floor_divmod(*a, *b)
                        .ok_or_else(|| args.value_error("integer division or modulo by zero"))?;
                    Ok(Value::Sequence(vec![Value::Int(q), Value::Int(r)]))
                }
                _ => {
                    let (a, b) = (args.float(0)?, args.float(1)?);
                    if b == 0.0 {
                        return Err(args.value_error("float divmod()"));
                    }
                    let q = (a / b).floor();
                    Ok(Value::Sequence(vec![Value::Float(q), Value::Float(a - q * b)]))
                }
            }
        })
        // formatting
        .with_fn(Signature::new("chr").arg("i"), |args| {
            u32::try_from(args.int(0)?)
                .ok()
                .and_then(char::from_u32)
                .map(|c| Value::String(c.to_string()))
                .ok_or_else(|| args.value_error("chr() arg not in range"))
        })
        .with_fn(Signature::new("ord").arg("c"), |args| {
            let s = args.str(0)?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Int(i64::from(u32::from(c)))),
                _ => Err(args.type_error("expected a character")),
            }
        })
        .with_fn(Signature::new("hex").arg("x"), |args| {
            Ok(radix_string(args.int(0)?, "0x", |n| format!("{n:x}")).into())
        })
        .with_fn(Signature::new("oct").arg("x"), |args| {
            Ok(radix_string(args.int(0)?, "0o", |n| format!("{n:o}")).into())
        })
        .with_fn(Signature::new("bin").arg("x"), |args| {
            Ok(radix_string(args.int(0)?, "0b", |n| format!("{n:b}")).into())
        })
}

// =============================================================================
// CONVERSIONS
// =============================================================================

fn to_int(args: BoundArgs) -> Result<Value, CallError> {
    let base = args.int(1)?;
    match args.get(0) {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        Value::Float(_) => Err(args.value_error("cannot convert float infinity or NaN to integer")),
        Value::String(s) => parse_int(s, base)
            .map(Value::Int)
            .ok_or_else(|| args.value_error(format!("invalid literal with base {base}: {s:?}"))),
        other => Err(args.type_error(format!(
            "argument must be a string or a number, not '{}'",
            other.type_label()
        ))),
    }
}

/// Integer literal parsing with optional sign, `0x`/`0o`/`0b` prefixes
/// (base 0 infers the radix from the prefix) and `_` separators
pub(crate) fn parse_int(literal: &str, base: i64) -> Option<i64> {
    let trimmed = literal.trim();
    let (negative, digits) = match trimmed.as_bytes().first().copied()? {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let lower = digits.to_ascii_lowercase();
    let prefixed = |prefix: &str| lower.strip_prefix(prefix).map(str::to_string);
    let (radix, body) = match base {
        0 => match lower.get(..2) {
            Some("0x") => (16, prefixed("0x")?),
            Some("0o") => (8, prefixed("0o")?),
            Some("0b") => (2, prefixed("0b")?),
            _ => (10, lower.clone()),
        },
        16 => (16, prefixed("0x").unwrap_or_else(|| lower.clone())),
        8 => (8, prefixed("0o").unwrap_or_else(|| lower.clone())),
        2 => (2, prefixed("0b").unwrap_or_else(|| lower.clone())),
        2..=36 => (base as u32, lower.clone()),
        _ => return None,
    };
    let body = body.strip_prefix('_').unwrap_or(&body).replace('_', "");
    if body.is_empty() || !body.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = i64::from_str_radix(&body, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

fn to_float(args: BoundArgs) -> Result<Value, CallError> {
    match args.get(0) {
        Value::String(s) => {
            s.trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| args.value_error(format!("could not convert string to float: {s:?}")))
        }
        other => other
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| args.type_error(format!(
                "argument must be a string or a number, not '{}'",
                other.type_label()
            ))),
    }
}

fn to_dict(args: BoundArgs) -> Result<Value, CallError> {
    let mut out = Mapping::new();
    match args.get(0) {
        Value::Null => {}
        Value::Mapping(map) => out.extend(map.iter().map(|(k, v)| (k.clone(), v.clone()))),
        Value::Sequence(pairs) => {
            for pair in pairs {
                match pair.as_sequence().map(Vec::as_slice) {
                    Some([Value::String(k), v]) => {
                        out.insert(k.clone(), v.clone());
                    }
                    _ => return Err(args.type_error("sequence elements must be [str, value] pairs")),
                }
            }
        }
        other => {
            return Err(args.type_error(format!(
                "'{}' object is not a mapping",
                other.type_label()
            )))
        }
    }
    out.extend(args.extra.clone());
    Ok(Value::Mapping(out))
}

// =============================================================================
// HELPERS
// =============================================================================

/// Items of an iterable argument: sequence elements, string characters or
/// mapping keys
fn iterate(args: &BoundArgs, index: usize) -> Result<Vec<Value>, CallError> {
    iterate_value(args, args.get(index))
}

fn iterate_value(args: &BoundArgs, value: &Value) -> Result<Vec<Value>, CallError> {
    match value {
        Value::Sequence(items) => Ok(items.clone()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        Value::Mapping(map) => Ok(map.keys().cloned().map(Value::String).collect()),
        other => Err(args.type_error(format!(
            "'{}' object is not iterable",
            other.type_label()
        ))),
    }
}

/// Ordering for numbers, strings and sequences of those
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Sequence(x), Value::Sequence(y)) => {
            for (l, r) in x.iter().zip(y) {
                match compare(l, r)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(x.len().cmp(&y.len()))
        }
        _ => match (a, b) {
            (Value::Bool(_) | Value::Int(_) | Value::Float(_), Value::Bool(_) | Value::Int(_) | Value::Float(_)) => {
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
            _ => None,
        },
    }
}

fn extreme(args: &BoundArgs, wanted: Ordering) -> Result<Value, CallError> {
    let candidates = match args.rest.as_slice() {
        [single] => iterate_value(args, single)?,
        many => many.to_vec(),
    };
    let mut iter = candidates.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| args.value_error("arg is an empty sequence"))?;
    for item in iter {
        match compare(&item, &best) {
            Some(ordering) if ordering == wanted => best = item,
            Some(_) => {}
            None => return Err(args.type_error("values are not comparable")),
        }
    }
    Ok(best)
}

fn add(args: &BoundArgs, a: &Value, b: &Value) -> Result<Value, CallError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x
            .checked_add(*y)
            .map(Value::Int)
            .ok_or_else(|| args.value_error("integer overflow")),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            Ok(Value::Float(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0)))
        }
        (Value::Sequence(x), Value::Sequence(y)) => {
            Ok(Value::Sequence(x.iter().chain(y).cloned().collect()))
        }
        _ => Err(args.type_error(format!(
            "unsupported operand types for +: '{}' and '{}'",
            a.type_label(),
            b.type_label()
        ))),
    }
}

fn round(args: BoundArgs) -> Result<Value, CallError> {
    let ndigits = match args.get(1) {
        Value::Null => None,
        _ => Some(args.int(1)?),
    };
    match (args.get(0), ndigits) {
        (Value::Int(i), _) => Ok(Value::Int(*i)),
        (Value::Float(f), None) if f.is_finite() => Ok(Value::Int(f.round_ties_even() as i64)),
        (Value::Float(_), None) => Err(args.value_error("cannot round infinity or NaN")),
        (Value::Float(f), Some(n)) => {
            let n = i32::try_from(n).map_err(|_| args.value_error("ndigits out of range"))?;
            let scale = 10f64.powi(n);
            Ok(Value::Float((f * scale).round_ties_even() / scale))
        }
        (other, _) => Err(args.type_error(format!(
            "type {} doesn't define __round__",
            other.type_label()
        ))),
    }
}

fn range(args: BoundArgs) -> Result<Value, CallError> {
    let (start, stop) = match args.get(1) {
        Value::Null => (0, args.int(0)?),
        _ => (args.int(0)?, args.int(1)?),
    };
    let step = args.int(2)?;
    if step == 0 {
        return Err(args.value_error("range() arg 3 must not be zero"));
    }
    // i128 holds every span and element exactly for any i64 bounds
    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    let span = if step > 0 { stop - start } else { start - stop };
    let len = if span <= 0 { 0 } else { (span - 1) / step.abs() + 1 };
    if len > i128::from(MAX_RANGE_LEN) {
        return Err(args.value_error(format!("range of {len} elements exceeds {MAX_RANGE_LEN}")));
    }
    (0..len)
        .map(|i| {
            i64::try_from(start + i * step)
                .map(Value::Int)
                .map_err(|_| args.value_error("integer overflow"))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Sequence)
}

fn floor_divmod(a: i64, b: i64) -> Option<(i64, i64)> {
    if b == 0 {
        return None;
    }
    let mut q = a.checked_div(b)?;
    let mut r = a % b;
    if r != 0 && ((r < 0) != (b < 0)) {
        q -= 1;
        r += b;
    }
    Some((q, r))
}

fn radix_string(n: i64, prefix: &str, digits: impl Fn(u64) -> String) -> String {
    let sign = if n < 0 { "-" } else { "" };
    format!("{sign}{prefix}{}", digits(n.unsigned_abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::CallArgs;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn call(name: &str, args: CallArgs) -> Result<Value, CallError> {
        module()
            .member(name)
            .and_then(Value::as_object)
            .unwrap()
            .call(args)
    }

    #[test]
    fn test_int_parsing() {
        assert_eq!(call("int", CallArgs::new().arg("42")).unwrap(), Value::Int(42));
        assert_eq!(
            call("int", CallArgs::new().arg("FF").kwarg("base", 16)).unwrap(),
            Value::Int(255)
        );
        assert_eq!(
            call("int", CallArgs::new().arg("0xff").kwarg("base", 16)).unwrap(),
            Value::Int(255)
        );
        assert_eq!(call("int", CallArgs::new().arg(-3.7)).unwrap(), Value::Int(-3));
        assert_eq!(parse_int("0b101", 0), Some(5));
        assert_eq!(parse_int("1_000", 10), Some(1000));
        assert!(call("int", CallArgs::new().arg("zz")).is_err());
    }

    #[test]
    fn test_aggregates() {
        let items = Value::from(json!([3, 1, 2]));
        assert_eq!(call("sum", CallArgs::new().arg(items.clone())).unwrap(), Value::Int(6));
        assert_eq!(call("max", CallArgs::new().arg(items.clone())).unwrap(), Value::Int(3));
        assert_eq!(call("min", CallArgs::new().arg(5).arg(2).arg(9)).unwrap(), Value::Int(2));
        assert_eq!(
            call("sorted", CallArgs::new().arg(items).kwarg("reverse", true)).unwrap(),
            Value::from(json!([3, 2, 1]))
        );
        assert_eq!(call("len", CallArgs::new().arg("h\u{e9}")).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_range_and_enumerate() {
        assert_eq!(
            call("range", CallArgs::new().arg(3)).unwrap(),
            Value::from(json!([0, 1, 2]))
        );
        assert_eq!(
            call("range", CallArgs::new().arg(10).arg(0).arg(-4)).unwrap(),
            Value::from(json!([10, 6, 2]))
        );
        assert!(call("range", CallArgs::new().arg(i64::MAX)).is_err());
        assert_eq!(
            call("enumerate", CallArgs::new().arg(Value::from(json!(["a", "b"])))).unwrap(),
            Value::from(json!([[0, "a"], [1, "b"]]))
        );
    }

    #[test]
    fn test_range_extreme_steps() {
        assert_eq!(
            call("range", CallArgs::new().arg(0).arg(-1).arg(i64::MIN)).unwrap(),
            Value::from(json!([0]))
        );
        assert_eq!(
            call("range", CallArgs::new().arg(i64::MIN).arg(i64::MAX).arg(i64::MAX)).unwrap(),
            Value::from(json!([i64::MIN, -1, i64::MAX - 1]))
        );
        assert_eq!(
            call("range", CallArgs::new().arg(i64::MAX - 1).arg(i64::MAX)).unwrap(),
            Value::from(json!([i64::MAX - 1]))
        );
        assert!(call("range", CallArgs::new().arg(i64::MIN).arg(i64::MAX)).is_err());
    }

    #[test]
    fn test_enumerate_start_overflow() {
        let items = Value::from(json!([1, 2]));
        assert_eq!(
            call("enumerate", CallArgs::new().arg(items.clone()).arg(i64::MAX - 1)).unwrap(),
            Value::from(json!([[i64::MAX - 1, 1], [i64::MAX, 2]]))
        );
        let err = call("enumerate", CallArgs::new().arg(items).arg(i64::MAX)).unwrap_err();
        assert!(matches!(err, CallError::Value { .. }));
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(call("hex", CallArgs::new().arg(255)).unwrap(), Value::from("0xff"));
        assert_eq!(call("bin", CallArgs::new().arg(-5)).unwrap(), Value::from("-0b101"));
        assert_eq!(
            call("round", CallArgs::new().arg(2.5)).unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            call("divmod", CallArgs::new().arg(-7).arg(2)).unwrap(),
            Value::from(json!([-4, 1]))
        );
        assert_eq!(call("str", CallArgs::new().arg(1.0)).unwrap(), Value::from("1.0"));
    }

    #[test]
    fn test_dict_merges_keywords() {
        let result = call(
            "dict",
            CallArgs::new()
                .arg(Value::from(json!({"a": 1})))
                .kwarg("b", 2),
        )
        .unwrap();
        assert_eq!(result, Value::from(json!({"a": 1, "b": 2})));
    }
}
