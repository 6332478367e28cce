//! Standard namespaces: `math`, `json`, `string`, `collections`,
//! `functools`, plus the context-bound `structcast` file helpers

use std::sync::Arc;

use crate::error::CallError;
use crate::security::SecuritySettings;
use crate::value::{
    title_case, BoundArgs, CallArgs, Mapping, Module, Object, Param, Partial, RecordType,
    Signature, Value,
};

pub(super) fn modules() -> Vec<Module> {
    vec![
        math(),
        json(),
        string(),
        collections(),
        functools(),
    ]
}

/// Widest `json.dumps` indent accepted from configuration
const MAX_JSON_INDENT: usize = 64;

// =============================================================================
// MATH
// =============================================================================

fn unary(name: &'static str, f: fn(f64) -> f64) -> (Signature, impl Fn(BoundArgs) -> Result<Value, CallError>) {
    (Signature::new(name).arg("x"), move |args: BoundArgs| {
        let y = f(args.float(0)?);
        if y.is_nan() && !args.float(0)?.is_nan() {
            return Err(args.value_error("math domain error"));
        }
        Ok(Value::Float(y))
    })
}

fn math() -> Module {
    let mut module = Module::new("math", Mapping::new())
        .with("pi", std::f64::consts::PI)
        .with("e", std::f64::consts::E)
        .with("tau", std::f64::consts::TAU)
        .with("inf", f64::INFINITY)
        .with("nan", f64::NAN);

    let unaries: [(&'static str, fn(f64) -> f64); 12] = [
        ("sqrt", f64::sqrt),
        ("fabs", f64::abs),
        ("exp", f64::exp),
        ("log2", f64::log2),
        ("log10", f64::log10),
        ("sin", f64::sin),
        ("cos", f64::cos),
        ("tan", f64::tan),
        ("asin", f64::asin),
        ("acos", f64::acos),
        ("atan", f64::atan),
        ("degrees", f64::to_degrees),
    ];
    for (name, f) in unaries {
        let (signature, func) = unary(name, f);
        module = module.with_fn(signature, func);
    }

    module
        .with_fn(Signature::new("radians").arg("x"), |args| {
            Ok(Value::Float(args.float(0)?.to_radians()))
        })
        .with_fn(Signature::new("floor").arg("x"), |args| {
            float_to_int(&args, args.float(0)?.floor())
        })
        .with_fn(Signature::new("ceil").arg("x"), |args| {
            float_to_int(&args, args.float(0)?.ceil())
        })
        .with_fn(Signature::new("trunc").arg("x"), |args| {
            float_to_int(&args, args.float(0)?.trunc())
        })
        .with_fn(
            Signature::new("log").arg("x").arg_default("base", Value::Null),
            |args| {
                let x = args.float(0)?;
                if x <= 0.0 {
                    return Err(args.value_error("math domain error"));
                }
                match args.get(1) {
                    Value::Null => Ok(Value::Float(x.ln())),
                    _ => Ok(Value::Float(x.log(args.float(1)?))),
                }
            },
        )
        .with_fn(Signature::new("pow").arg("x").arg("y"), |args| {
            Ok(Value::Float(args.float(0)?.powf(args.float(1)?)))
        })
        .with_fn(Signature::new("hypot").variadic(), |args| {
            let mut total = 0.0;
            for value in &args.rest {
                let x = value
                    .as_f64()
                    .ok_or_else(|| args.type_error("must be real numbers"))?;
                total += x * x;
            }
            Ok(Value::Float(total.sqrt()))
        })
        .with_fn(Signature::new("isfinite").arg("x"), |args| {
            Ok(Value::Bool(args.float(0)?.is_finite()))
        })
        .with_fn(Signature::new("isnan").arg("x"), |args| {
            Ok(Value::Bool(args.float(0)?.is_nan()))
        })
        .with_fn(
            Signature::new("isclose")
                .arg("a")
                .arg("b")
                .arg_default("rel_tol", 1e-9)
                .arg_default("abs_tol", 0.0),
            |args| {
                let (a, b) = (args.float(0)?, args.float(1)?);
                let tolerance = (args.float(2)? * a.abs().max(b.abs())).max(args.float(3)?);
                Ok(Value::Bool(a == b || (a - b).abs() <= tolerance))
            },
        )
        .with_fn(Signature::new("gcd").variadic(), |args| {
            let mut acc: i64 = 0;
            for value in &args.rest {
                let mut b = value
                    .as_i64()
                    .ok_or_else(|| args.type_error("integers required"))?
                    .unsigned_abs();
                let mut a = acc.unsigned_abs();
                while b != 0 {
                    (a, b) = (b, a % b);
                }
                acc = i64::try_from(a).map_err(|_| args.value_error("integer overflow"))?;
            }
            Ok(Value::Int(acc))
        })
        .with_fn(Signature::new("factorial").arg("n"), |args| {
            let n = args.int(0)?;
            if n < 0 {
                return Err(args.value_error("factorial() not defined for negative values"));
            }
            (1..=n)
                .try_fold(1i64, |acc, k| acc.checked_mul(k))
                .map(Value::Int)
                .ok_or_else(|| args.value_error("integer overflow"))
        })
}

fn float_to_int(args: &BoundArgs, x: f64) -> Result<Value, CallError> {
    if !x.is_finite() || x.abs() >= i64::MAX as f64 {
        return Err(args.value_error("cannot convert float infinity or NaN to integer"));
    }
    Ok(Value::Int(x as i64))
}

// =============================================================================
// JSON
// =============================================================================

fn json() -> Module {
    Module::new("json", Mapping::new())
        .with_fn(Signature::new("loads").arg("s"), |args| {
            Value::from_json_str(args.str(0)?).map_err(|e| args.value_error(e.to_string()))
        })
        .with_fn(
            Signature::new("dumps")
                .arg("obj")
                .arg_default("indent", Value::Null),
            |args| {
                let json = args
                    .get(0)
                    .to_json()
                    .map_err(|e| args.type_error(e.to_string()))?;
                let text = match args.get(1) {
                    Value::Null => serde_json::to_string(&json),
                    _ => {
                        let width = usize::try_from(args.int(1)?)
                            .ok()
                            .filter(|width| *width <= MAX_JSON_INDENT)
                            .ok_or_else(|| {
                                args.value_error(format!("indent must be between 0 and {MAX_JSON_INDENT}"))
                            })?;
                        pretty_json(&json, width)
                    }
                };
                text.map(Value::String)
                    .map_err(|e| args.value_error(e.to_string()))
            },
        )
}

fn pretty_json(json: &serde_json::Value, width: usize) -> Result<String, serde_json::Error> {
    use serde::Serialize;

    let indent = " ".repeat(width);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    json.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

// =============================================================================
// STRING
// =============================================================================

fn string() -> Module {
    const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
    const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    Module::new("string", Mapping::new())
        .with("ascii_lowercase", LOWER)
        .with("ascii_uppercase", UPPER)
        .with("ascii_letters", format!("{LOWER}{UPPER}"))
        .with("digits", "0123456789")
        .with("hexdigits", "0123456789abcdefABCDEF")
        .with("octdigits", "01234567")
        .with("punctuation", r##"!"#$%&'()*+,-./:;<=>?@[\]^_`{|}~"##)
        .with("whitespace", " \t\n\r\x0b\x0c")
        .with_fn(
            Signature::new("capwords")
                .arg("s")
                .arg_default("sep", Value::Null),
            |args| {
                let s = args.str(0)?;
                let words: Vec<String> = match args.get(1) {
                    Value::Null => s.split_whitespace().map(title_case).collect(),
                    _ => s.split(args.str(1)?).map(title_case).collect(),
                };
                let sep = match args.get(1) {
                    Value::Null => " ",
                    _ => args.str(1)?,
                };
                Ok(Value::String(words.join(sep)))
            },
        )
}

// =============================================================================
// COLLECTIONS
// =============================================================================

fn collections() -> Module {
    Module::new("collections", Mapping::new())
        .with_fn(
            Signature::new("Counter").arg_default("iterable", Value::Null),
            |args| {
                let mut counts = Mapping::new();
                let items: Vec<String> = match args.get(0) {
                    Value::Null => Vec::new(),
                    Value::String(s) => s.chars().map(String::from).collect(),
                    Value::Sequence(items) => items
                        .iter()
                        .map(|item| match item {
                            Value::Object(_) => Err(args.type_error("unhashable element")),
                            other => Ok(other.to_string()),
                        })
                        .collect::<Result<_, _>>()?,
                    other => {
                        return Err(args.type_error(format!(
                            "'{}' object is not iterable",
                            other.type_label()
                        )))
                    }
                };
                for item in items {
                    let entry = counts.entry(item).or_insert(Value::Int(0));
                    if let Value::Int(n) = entry {
                        *n += 1;
                    }
                }
                Ok(Value::Mapping(counts))
            },
        )
        .with_fn(
            Signature::new("OrderedDict")
                .arg_default("mapping", Value::Null)
                .var_keyword(),
            |args| {
                let mut out = match args.get(0) {
                    Value::Null => Mapping::new(),
                    Value::Mapping(map) => map.clone(),
                    other => {
                        return Err(args.type_error(format!(
                            "'{}' object is not a mapping",
                            other.type_label()
                        )))
                    }
                };
                out.extend(args.extra.clone());
                Ok(Value::Mapping(out))
            },
        )
        .with_fn(
            Signature::new("namedtuple")
                .arg("typename")
                .arg("field_names")
                .arg_default("defaults", Value::Null),
            namedtuple,
        )
}

/// Build a [`RecordType`]; defaults apply to the rightmost fields
fn namedtuple(args: BoundArgs) -> Result<Value, CallError> {
    let typename = args.str(0)?.to_string();
    let names: Vec<String> = match args.get(1) {
        Value::String(s) => s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| args.type_error("field names must be strings"))
            })
            .collect::<Result<_, _>>()?,
        other => {
            return Err(args.type_error(format!(
                "field_names must be a str or sequence, not '{}'",
                other.type_label()
            )))
        }
    };
    let defaults = match args.get(2) {
        Value::Null => Vec::new(),
        Value::Sequence(items) => items.clone(),
        _ => return Err(args.type_error("defaults must be a sequence")),
    };
    if defaults.len() > names.len() {
        return Err(args.type_error("got more default values than field names"));
    }
    for name in &names {
        let valid = name.chars().next().is_some_and(|c| c.is_alphabetic())
            && name.chars().all(|c| c == '_' || c.is_alphanumeric());
        if !valid {
            return Err(args.value_error(format!("invalid field name: {name:?}")));
        }
    }

    let first_default = names.len() - defaults.len();
    let mut signature = Signature::new(typename);
    for (index, name) in names.into_iter().enumerate() {
        signature.params.push(Param {
            name,
            default: index
                .checked_sub(first_default)
                .map(|offset| defaults[offset].clone()),
        });
    }
    Ok(Value::object(RecordType::new(signature)))
}

// =============================================================================
// FUNCTOOLS
// =============================================================================

fn functools() -> Module {
    Module::new("functools", Mapping::new())
        .with_fn(
            Signature::new("partial").arg("func").variadic().var_keyword(),
            |args| {
                let target = callable(&args, 0)?;
                let bound = CallArgs {
                    positional: args.rest.clone(),
                    named: args.extra.clone(),
                };
                Ok(Value::object(Partial::new(target, bound)))
            },
        )
        .with_fn(
            Signature::new("reduce")
                .arg("function")
                .arg("iterable")
                .arg_default("initial", Value::Null),
            |args| {
                let function = callable(&args, 0)?;
                let items = args
                    .get(1)
                    .as_sequence()
                    .ok_or_else(|| args.type_error("reduce() arg 2 must be a sequence"))?;
                let mut iter = items.iter().cloned();
                let mut acc = match args.get(2) {
                    Value::Null => iter.next().ok_or_else(|| {
                        args.type_error("reduce() of empty iterable with no initial value")
                    })?,
                    initial => initial.clone(),
                };
                for item in iter {
                    acc = function.call(CallArgs::positional([acc, item]))?;
                }
                Ok(acc)
            },
        )
}

fn callable(args: &BoundArgs, index: usize) -> Result<Arc<dyn Object>, CallError> {
    match args.get(index) {
        Value::Object(obj) if obj.is_callable() => Ok(Arc::clone(obj)),
        other => Err(args.type_error(format!(
            "'{}' object is not callable",
            other.type_label()
        ))),
    }
}

// =============================================================================
// STRUCTCAST
// =============================================================================

/// File helpers bound to the security snapshot of the resolving context
pub(super) fn structcast(security: Arc<SecuritySettings>) -> Module {
    let yaml_security = Arc::clone(&security);
    Module::new(super::FILE_NAMESPACE, Mapping::new())
        .with_fn(Signature::new("load_yaml").arg("path"), move |args| {
            let text = read_gated(&yaml_security, &args)?;
            Value::from_yaml_str(&text).map_err(|e| args.value_error(e.to_string()))
        })
        .with_fn(Signature::new("load_json").arg("path"), move |args| {
            let text = read_gated(&security, &args)?;
            Value::from_json_str(&text).map_err(|e| args.value_error(e.to_string()))
        })
        .with_fn(Signature::new("dump_yaml").arg("data"), |args| {
            let yaml = args
                .get(0)
                .to_yaml()
                .map_err(|e| args.type_error(e.to_string()))?;
            serde_yaml::to_string(&yaml)
                .map(Value::String)
                .map_err(|e| args.value_error(e.to_string()))
        })
        .with_fn(Signature::new("dump_json").arg("data"), |args| {
            let json = args
                .get(0)
                .to_json()
                .map_err(|e| args.type_error(e.to_string()))?;
            serde_json::to_string(&json)
                .map(Value::String)
                .map_err(|e| args.value_error(e.to_string()))
        })
}

fn read_gated(security: &SecuritySettings, args: &BoundArgs) -> Result<String, CallError> {
    let path = security
        .validate_path(args.str(0)?)
        .map_err(|e| args.value_error(e.to_string()))?;
    std::fs::read_to_string(&path).map_err(|e| args.value_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn member(module: &Module, name: &str) -> Arc<dyn Object> {
        Arc::clone(module.member(name).and_then(Value::as_object).unwrap())
    }

    #[test]
    fn test_math_domain_errors() {
        let sqrt = member(&math(), "sqrt");
        assert_eq!(sqrt.call(CallArgs::new().arg(9)).unwrap(), Value::Float(3.0));
        assert!(sqrt.call(CallArgs::new().arg(-1)).is_err());
        let floor = member(&math(), "floor");
        assert_eq!(floor.call(CallArgs::new().arg(2.7)).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_json_round_trip() {
        let module = json();
        let loaded = member(&module, "loads")
            .call(CallArgs::new().arg(r#"{"b": 1, "a": [true]}"#))
            .unwrap();
        assert_eq!(loaded, Value::from(json!({"b": 1, "a": [true]})));
        let dumped = member(&module, "dumps")
            .call(CallArgs::new().arg(loaded))
            .unwrap();
        assert_eq!(dumped, Value::from(r#"{"b":1,"a":[true]}"#));
    }

    #[test]
    fn test_dumps_indent_is_bounded() {
        let dumps = member(&json(), "dumps");
        let data = Value::from(json!([1]));
        assert_eq!(
            dumps.call(CallArgs::new().arg(data.clone()).arg(2)).unwrap(),
            Value::from("[\n  1\n]")
        );
        for indent in [i64::MAX, -1, 65] {
            let err = dumps
                .call(CallArgs::new().arg(data.clone()).arg(indent))
                .unwrap_err();
            assert!(matches!(err, CallError::Value { .. }), "indent {indent}");
        }
    }

    #[test]
    fn test_file_helpers_use_bound_settings() {
        let dir = tempfile::Builder::new().prefix("structcast-").tempdir().unwrap();
        let path = dir.path().join("data.yaml");
        std::fs::write(&path, "name: x\n").unwrap();
        let args = || CallArgs::new().arg(path.to_string_lossy().into_owned());

        let allowing = SecuritySettings {
            allowed_directories: vec![dir.path().to_path_buf()],
            ..Default::default()
        };
        let load = member(&structcast(Arc::new(allowing)), "load_yaml");
        assert_eq!(load.call(args()).unwrap(), Value::from(json!({"name": "x"})));

        let load = member(&structcast(Arc::new(SecuritySettings::default())), "load_yaml");
        assert!(load.call(args()).is_err());
    }

    #[test]
    fn test_namedtuple_builds_record_type() {
        let point_type = member(&collections(), "namedtuple")
            .call(
                CallArgs::new()
                    .arg("Point")
                    .arg("x, y")
                    .kwarg("defaults", Value::from(json!([0]))),
            )
            .unwrap();
        let point = point_type
            .as_object()
            .unwrap()
            .call(CallArgs::new().arg(3))
            .unwrap();
        assert_eq!(point.type_label(), "Point");
        assert_eq!(point.get_attr("y"), Some(Value::Int(0)));
    }

    #[test]
    fn test_partial_and_reduce() {
        let tools = functools();
        let pow = Value::object(crate::value::NativeFunction::new(
            Signature::new("pow").arg("base").arg("exp"),
            |args| Ok(Value::Int(args.int(0)?.pow(args.int(1)? as u32))),
        ));
        let square = member(&tools, "partial")
            .call(CallArgs::new().arg(pow).kwarg("exp", 2))
            .unwrap();
        assert_eq!(
            square.as_object().unwrap().call(CallArgs::new().arg(7)).unwrap(),
            Value::Int(49)
        );

        let add = Value::object(crate::value::NativeFunction::new(
            Signature::new("add").arg("a").arg("b"),
            |args| Ok(Value::Int(args.int(0)? + args.int(1)?)),
        ));
        let total = member(&tools, "reduce")
            .call(CallArgs::new().arg(add).arg(Value::from(json!([1, 2, 3]))))
            .unwrap();
        assert_eq!(total, Value::Int(6));
    }

    #[test]
    fn test_counter_counts_in_order() {
        let counter = member(&collections(), "Counter")
            .call(CallArgs::new().arg("abca"))
            .unwrap();
        assert_eq!(counter, Value::from(json!({"a": 2, "b": 1, "c": 1})));
    }
}
