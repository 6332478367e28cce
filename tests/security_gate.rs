//! Security gate integration tests
//!
//! Default allow/deny decisions, reconfiguration through the process-wide
//! settings and the configuration file loader.

mod helpers;

use std::collections::BTreeSet;

use helpers::{lock_globals, settings_allowing, temp_dir};
use structcast::error::SecurityError;
use structcast::security::{security_settings, SecuritySettings};
use structcast::{
    configure_security, validate_attribute, validate_import, validate_path, ConfigLoader, Context, ErrorKind,
    SecurityOverrides, Value,
};

#[test]
fn test_default_import_decisions() {
    let _guard = lock_globals();

    assert!(matches!(
        validate_import("os", None),
        Err(SecurityError::BlockedImport { .. })
    ));
    assert!(validate_import("os.path", Some("join")).is_err());
    assert!(validate_import("subprocess", Some("run")).is_err());
    assert!(validate_import("math", Some("sqrt")).is_ok());
    assert!(validate_import("builtins", Some("int")).is_ok());
    assert!(validate_import("builtins", Some("eval")).is_err());
    // not on the allowlist
    assert!(validate_import("acme_internal", None).is_err());
}

#[test]
fn test_default_attribute_decisions() {
    let _guard = lock_globals();

    assert!(matches!(
        validate_attribute("object", "__subclasses__"),
        Err(SecurityError::BlockedAttribute { .. })
    ));
    assert!(validate_attribute("module", "_protected").is_err());
    assert!(validate_attribute("module", "__private").is_err());
    assert!(validate_attribute("module", "upper").is_ok());
    assert!(matches!(
        validate_attribute("module", "not-an-identifier"),
        Err(SecurityError::InvalidAttribute { .. })
    ));
    assert!(validate_attribute("module", "caf\u{e9}").is_err());
    // every dotted segment is checked
    assert!(validate_attribute("module", "real.__globals__").is_err());
}

#[test]
fn test_reset_restores_rejection() {
    let _guard = lock_globals();

    configure_security(SecurityOverrides {
        blocked_names: Some(BTreeSet::new()),
        enforce_allowlist: Some(false),
        ..Default::default()
    });
    assert!(validate_import("os", None).is_ok());

    configure_security(SecurityOverrides::default());
    assert!(validate_import("os", None).is_err());
    assert_eq!(*security_settings(), SecuritySettings::default());
}

#[test]
fn test_snapshot_ignores_later_reconfiguration() {
    let _guard = lock_globals();

    let ctx = Context::current();
    configure_security(SecurityOverrides {
        max_depth: Some(3),
        ..Default::default()
    });
    assert_eq!(ctx.security().max_depth, 100);
    assert_eq!(Context::current().security().max_depth, 3);
}

#[test]
fn test_reduced_depth_applies_to_instantiation() {
    let _guard = lock_globals();

    configure_security(SecurityOverrides {
        max_depth: Some(1),
        ..Default::default()
    });
    let config = Value::from(serde_json::json!({"a": {"b": {"c": 1}}}));
    let err = structcast::instantiate(&config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Recursion);
}

#[test]
fn test_path_validation() {
    let dir = temp_dir();
    let file = dir.path().join("data.yaml");
    std::fs::write(&file, "a: 1").unwrap();

    // temp dirs are outside the working directory
    let defaults = SecuritySettings::default();
    assert!(matches!(
        defaults.validate_path(&file),
        Err(SecurityError::PathViolation { .. })
    ));

    let allowing = settings_allowing(dir.path());
    assert_eq!(allowing.validate_path(&file).unwrap(), file.canonicalize().unwrap());
    // relative paths are searched under the allowed directories
    assert!(allowing.validate_path("data.yaml").is_ok());

    let hidden_dir = dir.path().join(".secret");
    std::fs::create_dir(&hidden_dir).unwrap();
    let hidden = hidden_dir.join("data.yaml");
    std::fs::write(&hidden, "a: 1").unwrap();
    assert!(matches!(
        allowing.validate_path(&hidden),
        Err(SecurityError::PathViolation { .. })
    ));

    let missing = allowing.validate_path(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(missing, SecurityError::PathNotFound { .. }));
}

#[test]
fn test_live_path_validation_uses_configured_directories() {
    let _guard = lock_globals();
    let dir = temp_dir();
    let file = dir.path().join("data.yaml");
    std::fs::write(&file, "a: 1").unwrap();

    assert!(validate_path(&file).is_err());
    configure_security(SecurityOverrides {
        allowed_directories: Some(vec![dir.path().to_path_buf()]),
        ..Default::default()
    });
    assert!(validate_path(&file).is_ok());
}

#[test]
fn test_config_file_applies_every_section() {
    let _guard = lock_globals();
    let dir = temp_dir();
    let path = dir.path().join("structcast.yaml");
    std::fs::write(
        &path,
        "security:\n  max_depth: 12\nspec:\n  raise_error: false\ntemplates:\n  default_group: base\n",
    )
    .unwrap();

    let config = ConfigLoader::new(&path)
        .load_with(&settings_allowing(dir.path()))
        .unwrap();
    config.apply();

    let ctx = Context::current();
    assert_eq!(ctx.security().max_depth, 12);
    assert!(!ctx.spec_settings().raise_error);
    assert_eq!(ctx.template_settings().default_group, "base");
}
