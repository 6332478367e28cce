//! Shared integration test helpers
//!
//! Tests that reconfigure process-wide settings take [`lock_globals`]; the
//! guard restores every settings group to its defaults when dropped.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use structcast::security::SecuritySettings;
use structcast::{configure_security, configure_spec, configure_templates, Mapping, Value};
use tracing_subscriber::EnvFilter;

static GLOBAL_STATE: Mutex<()> = Mutex::new(());

/// Install a test subscriber once (`RUST_LOG` overrides the filter)
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("structcast=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub struct GlobalGuard {
    _lock: MutexGuard<'static, ()>,
}

impl Drop for GlobalGuard {
    fn drop(&mut self) {
        reset_settings();
    }
}

pub fn lock_globals() -> GlobalGuard {
    init_tracing();
    let lock = GLOBAL_STATE.lock().unwrap_or_else(PoisonError::into_inner);
    reset_settings();
    GlobalGuard { _lock: lock }
}

fn reset_settings() {
    configure_security(Default::default());
    configure_spec(Default::default());
    configure_templates(Default::default());
}

pub fn value(json: serde_json::Value) -> Value {
    Value::from(json)
}

pub fn mapping(json: serde_json::Value) -> Mapping {
    match Value::from(json) {
        Value::Mapping(map) => map,
        other => panic!("expected a mapping, got {other:?}"),
    }
}

/// Default settings that also accept paths under `dir`
pub fn settings_allowing(dir: &Path) -> SecuritySettings {
    SecuritySettings {
        allowed_directories: vec![dir.to_path_buf()],
        ..Default::default()
    }
}

pub fn temp_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("structcast-")
        .tempdir()
        .expect("create temp dir")
}
