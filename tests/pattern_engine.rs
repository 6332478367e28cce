//! Pattern engine integration tests

mod helpers;

use std::sync::Arc;

use helpers::{init_tracing, lock_globals, settings_allowing, temp_dir, value};
use pretty_assertions::assert_eq;
use serde_json::json;
use structcast::error::{Error, InstantiationError, Result};
use structcast::pattern::{Arguments, PatternResult};
use structcast::value::Record;
use structcast::{
    configure_security, instantiate, register_namespace, register_pattern, CallArgs, Context, ErrorKind, Mapping,
    Module, Pattern, PatternExtension, SecurityOverrides, SecuritySettings, Value,
};

fn call(target: &Value, args: CallArgs) -> Value {
    target.as_object().expect("runtime object").call(args).expect("call succeeds")
}

#[test]
fn test_hex_parser_from_yaml() {
    init_tracing();
    let config: Value = serde_yaml::from_str(
        r#"
parser:
  _obj_:
    - _addr_: int
    - _bind_: {base: 16}
"#,
    )
    .unwrap();
    let built = instantiate(&config).unwrap();
    let parser = &built.as_mapping().unwrap()["parser"];
    assert!(parser.is_callable());
    assert_eq!(call(parser, CallArgs::new().arg("FF")), Value::Int(255));
    assert_eq!(call(parser, CallArgs::new().arg("10")), Value::Int(16));
}

#[test]
fn test_chain_associativity() {
    let ctx = Context::current();
    let steps = vec![
        Pattern::address("math.pow"),
        Pattern::bind(Arguments::Positional(vec![Value::Int(2)])),
        Pattern::call(Arguments::Positional(vec![Value::Int(8)])),
    ];

    let whole = ctx.evaluate(&Pattern::object(steps.clone()), None).unwrap();

    let mut threaded: Option<PatternResult> = None;
    for step in &steps {
        threaded = Some(ctx.evaluate(step, threaded).unwrap());
    }
    let threaded = threaded.unwrap();

    assert_eq!(whole.stack, vec![Value::Float(256.0)]);
    assert_eq!(threaded.stack, whole.stack);
    assert_eq!(threaded.applied_patterns, steps);
}

#[test]
fn test_list_and_mapping_forms_agree() {
    let list = value(json!(["_obj_", ["_addr_", "math.fabs"], ["_call_", -2.5]]));
    let mapping = value(json!({"_obj_": [{"_addr_": "math.fabs"}, {"_call_": [-2.5]}]}));
    assert_eq!(instantiate(&list).unwrap(), Value::Float(2.5));
    assert_eq!(instantiate(&mapping).unwrap(), Value::Float(2.5));
}

#[test]
fn test_named_arguments_and_partials() {
    let config = value(json!({"_obj_": [
        {"_addr_": "round"},
        {"_bind_": {"ndigits": 2}},
    ]}));
    let rounder = instantiate(&config).unwrap();
    assert_eq!(call(&rounder, CallArgs::new().arg(3.14159)), Value::Float(3.14));
}

#[test]
fn test_blocked_and_missing_addresses() {
    let blocked = instantiate(&value(json!(["_obj_", ["_addr_", "os.system"]]))).unwrap_err();
    assert_eq!(blocked.kind(), ErrorKind::Security);

    let missing = instantiate(&value(json!(["_obj_", ["_addr_", "math.nope"]]))).unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);

    let malformed = instantiate(&value(json!({"_obj_": [{"_addr_": "int", "_call_": []}]}))).unwrap_err();
    assert!(matches!(
        malformed,
        Error::Instantiation(InstantiationError::InvalidPattern { .. })
    ));
}

#[test]
fn test_address_from_module_file() {
    let dir = temp_dir();
    let path = dir.path().join("tools.yaml");
    std::fs::write(
        &path,
        "answer: 42\nbinary:\n  _obj_:\n    - _addr_: int\n    - _bind_: {base: 2}\n",
    )
    .unwrap();

    let mut security = settings_allowing(dir.path());
    security.allowed_names.insert("tools".to_string(), None);
    let ctx = Context::current().with_security(security);
    let file = path.to_string_lossy().into_owned();

    let binary = ctx
        .instantiate(&value(json!(["_obj_", {"_addr_": "binary", "_file_": file}])))
        .unwrap();
    assert_eq!(call(&binary, CallArgs::new().arg("101")), Value::Int(5));

    let answer = ctx
        .instantiate(&value(json!(["_obj_", {"_addr_": "tools.answer", "_file_": file}])))
        .unwrap();
    assert_eq!(answer, Value::Int(42));

    // the same file outside the allowed directories
    let err = Context::current()
        .instantiate(&value(json!(["_obj_", {"_addr_": "answer", "_file_": file}])))
        .unwrap_err();
    assert!(err.is_security());
}

#[test]
fn test_file_helpers_follow_context_security() {
    let _guard = lock_globals();
    let dir = temp_dir();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"replicas": 3}"#).unwrap();
    let config = value(json!([
        "_obj_",
        ["_addr_", "structcast.load_json"],
        ["_call_", path.to_string_lossy().into_owned()],
    ]));

    // local override allows what the live settings reject
    let local = Context::current().with_security(settings_allowing(dir.path()));
    assert_eq!(local.instantiate(&config).unwrap(), value(json!({"replicas": 3})));
    let err = instantiate(&config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Instantiation);

    // and rejects what the live settings allow
    configure_security(SecurityOverrides {
        allowed_directories: Some(vec![dir.path().to_path_buf()]),
        ..Default::default()
    });
    assert_eq!(instantiate(&config).unwrap(), value(json!({"replicas": 3})));
    let strict = Context::current().with_security(SecuritySettings::default());
    assert_eq!(strict.instantiate(&config).unwrap_err().kind(), ErrorKind::Instantiation);
}

#[test]
fn test_registered_namespace() {
    let mut fields = Mapping::new();
    fields.insert("host".into(), Value::from("localhost"));
    let module = Module::new("pattern_engine_fixtures", Mapping::new())
        .with("server", Value::object(Record::new("Server", fields)));
    register_namespace(module);

    let mut security = SecuritySettings::default();
    security
        .allowed_names
        .insert("pattern_engine_fixtures".to_string(), None);
    let ctx = Context::current().with_security(security);

    let host = ctx
        .instantiate(&value(json!(["_obj_", ["_addr_", "pattern_engine_fixtures.server"], ["_attr_", "host"]])))
        .unwrap();
    assert_eq!(host, Value::from("localhost"));

    // the default allowlist does not know the namespace
    let err = instantiate(&value(json!(["_obj_", ["_addr_", "pattern_engine_fixtures.server"]]))).unwrap_err();
    assert!(err.is_security());
}

/// `{"_repeat_": [value, times]}` pushes a list of `times` copies
struct Repeat;

impl PatternExtension for Repeat {
    fn validate(&self, body: &Value) -> std::result::Result<(), String> {
        match body.as_sequence().map(Vec::as_slice) {
            Some([_, times]) if times.as_i64().is_some() => Ok(()),
            _ => Err("expected [value, times]".to_string()),
        }
    }

    fn evaluate(&self, _ctx: &Context, body: &Value, result: &mut PatternResult) -> Result<()> {
        if let Some([item, times]) = body.as_sequence().map(Vec::as_slice) {
            let times = times.as_i64().unwrap_or(0).max(0) as usize;
            result.stack.push(Value::Sequence(vec![item.clone(); times]));
        }
        Ok(())
    }
}

#[test]
fn test_process_wide_extension() {
    register_pattern("_repeat_", Arc::new(Repeat));

    let out = instantiate(&value(json!({"_obj_": [
        {"_repeat_": ["ab", 3]},
        {"_attr_": "count"},
        {"_call_": ["ab"]},
    ]})))
    .unwrap();
    assert_eq!(out, Value::Int(3));

    let err = instantiate(&value(json!({"_obj_": [{"_repeat_": "ab"}]}))).unwrap_err();
    assert!(matches!(
        err,
        Error::Instantiation(InstantiationError::Extension { .. })
    ));
}

#[test]
fn test_pattern_deserializes_from_yaml() {
    let pattern: Pattern = serde_yaml::from_str("[_addr_, math.sqrt]").unwrap();
    assert_eq!(pattern, Pattern::address("math.sqrt"));

    let object: Pattern = serde_yaml::from_str("_obj_: [{_addr_: abs}, {_call_: [-3]}]").unwrap();
    let result = Context::current().evaluate(&object, None).unwrap();
    assert_eq!(result.stack, vec![Value::Int(3)]);
}
