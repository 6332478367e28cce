//! Name Resolver
//!
//! Resolves dotted addresses (`math.sqrt`, `collections.Counter`, `int`)
//! against an explicit namespace table. No reflection is involved: a name
//! exists only if a registered [`Module`] exposes it.
//!
//! ## Resolution order
//!
//! 1. The longest dotted prefix registered in the table is the module; the
//!    remaining segments are attribute lookups.
//! 2. A single-segment address with no registered module resolves inside
//!    `builtins`.
//! 3. Otherwise the address does not exist; the gate is still consulted for
//!    the implied module so that forbidden names report `Blocked`, not
//!    `NotFound`.
//!
//! The `structcast` file helpers are not stored in the table. They are built
//! per lookup from the resolving context's security settings, so a local
//! `with_security` override also governs which files they may read.
//!
//! With a file hint the module is loaded from a YAML/JSON file instead. The
//! file path passes `validate_path`, and the loaded members still pass
//! `validate_import` / `validate_attribute`.

mod builtins;
mod stdlib;

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::context::{Budget, Context, Shared};
use crate::error::{ResolveError, Result};
use crate::pattern;
use crate::value::{Module, Object, Value};

/// Namespace of the file helpers bound to the resolving context
pub const FILE_NAMESPACE: &str = "structcast";

// =============================================================================
// NAMESPACE TABLE
// =============================================================================

/// Registered namespaces keyed by dotted module name
#[derive(Debug, Clone, Default)]
pub struct NamespaceTable {
    modules: IndexMap<String, Arc<Module>>,
}

impl NamespaceTable {
    /// Empty table (not even `builtins`)
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-populated with the built-in namespaces
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.insert(builtins::module());
        for module in stdlib::modules() {
            table.insert(module);
        }
        table
    }

    /// Register a module under its own name, returning the one it replaced
    pub fn insert(&mut self, module: Module) -> Option<Arc<Module>> {
        self.modules
            .insert(module.name().to_string(), Arc::new(module))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Module>> {
        self.modules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

static NAMESPACES: Lazy<Shared<NamespaceTable>> =
    Lazy::new(|| Shared::new(NamespaceTable::with_builtins()));

/// Snapshot of the process-wide namespace table
pub fn namespaces() -> Arc<NamespaceTable> {
    NAMESPACES.snapshot()
}

/// Register (or replace) a namespace process-wide
pub fn register_namespace(module: Module) -> Option<Arc<Module>> {
    debug!(module = module.name(), "Registering namespace");
    NAMESPACES.update(|table| table.insert(module))
}

/// Resolve `address` with the live configuration
pub fn resolve(address: &str) -> Result<Value> {
    Context::current().resolve_address(address)
}

// =============================================================================
// RESOLUTION
// =============================================================================

/// Resolve `address`, optionally from the module file `file`
pub(crate) fn resolve_address(
    ctx: &Context,
    address: &str,
    file: Option<&Path>,
    budget: Budget,
) -> Result<Value> {
    let segments: Vec<&str> = address.split('.').collect();
    if address.trim() != address || segments.iter().any(|s| s.is_empty()) {
        return Err(ResolveError::InvalidAddress {
            address: address.to_string(),
        }
        .into());
    }

    if let Some(file) = file {
        return resolve_from_file(ctx, &segments, file, budget);
    }

    for split in (1..=segments.len()).rev() {
        let module_name = segments[..split].join(".");
        if let Some(module) = lookup_module(ctx, &module_name) {
            let rest = &segments[split..];
            debug!(address, module = %module_name, "Resolving address");
            ctx.security.validate_import(&module_name, rest.first().copied())?;
            return walk(ctx, Value::Object(module), &module_name, rest, address);
        }
    }

    if let [name] = segments.as_slice() {
        if let Some(builtins) = ctx.namespaces.get("builtins") {
            ctx.security.validate_import("builtins", Some(*name))?;
            return walk(ctx, Value::Object(builtins.clone()), "builtins", &segments, address);
        }
    }

    // Unregistered module: forbidden names must not look merely absent
    let (implied, member) = segments.split_at(segments.len() - 1);
    if !implied.is_empty() {
        ctx.security
            .validate_import(&implied.join("."), member.first().copied())?;
    }
    Err(ResolveError::NotFound {
        name: address.to_string(),
    }
    .into())
}

/// Registered modules win; the file helpers fill in when none is registered
fn lookup_module(ctx: &Context, name: &str) -> Option<Arc<dyn Object>> {
    match ctx.namespaces.get(name) {
        Some(module) => Some(module.clone()),
        None if name == FILE_NAMESPACE => Some(Arc::new(stdlib::structcast(Arc::clone(&ctx.security)))),
        None => None,
    }
}

/// Attribute walk from a resolved module; every name is gated first
fn walk(ctx: &Context, root: Value, owner: &str, rest: &[&str], address: &str) -> Result<Value> {
    if rest.is_empty() {
        return Ok(root);
    }
    ctx.security.validate_attribute(owner, &rest.join("."))?;
    let mut current = root;
    for segment in rest {
        current = current
            .get_attr(segment)
            .ok_or_else(|| ResolveError::NotFound {
                name: address.to_string(),
            })?;
    }
    Ok(current)
}

fn resolve_from_file(ctx: &Context, segments: &[&str], file: &Path, budget: Budget) -> Result<Value> {
    let path = ctx.security.validate_path(file)?;
    if !ctx.security.is_module_file(&path) {
        return Err(ResolveError::UnsupportedModuleFile {
            path,
            allowed: ctx.security.module_file_extensions.iter().cloned().collect(),
        }
        .into());
    }

    let (prefix, member) = segments.split_at(segments.len() - 1);
    let member = member[0];
    let module_name = if prefix.is_empty() {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        prefix.join(".")
    };

    ctx.security.validate_import(&module_name, Some(member))?;
    ctx.security.validate_attribute(&module_name, member)?;

    let module = load_module_file(&module_name, &path)?;
    debug!(module = %module_name, path = %path.display(), member, "Resolving from module file");
    let raw = module
        .member(member)
        .cloned()
        .ok_or_else(|| ResolveError::NotFound {
            name: format!("{module_name}.{member}"),
        })?;
    pattern::instantiate_with(ctx, &raw, budget.descend())
}

/// Parse a YAML/JSON file into a module; the top level must be a mapping
pub(crate) fn load_module_file(name: &str, path: &Path) -> Result<Module, ResolveError> {
    let load_error = |message: String| ResolveError::ModuleLoad {
        path: path.to_path_buf(),
        message,
    };
    let text = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let data = if is_json {
        Value::from_json_str(&text).map_err(|e| load_error(e.to_string()))?
    } else {
        Value::from_yaml_str(&text).map_err(|e| load_error(e.to_string()))?
    };
    match data {
        Value::Mapping(members) => Ok(Module::new(name, members)),
        other => Err(load_error(format!(
            "top level must be a mapping, found {}",
            other.shape()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use crate::security::SecuritySettings;
    use crate::value::CallArgs;

    fn resolve(ctx: &Context, address: &str) -> Result<Value> {
        resolve_address(ctx, address, None, Budget::start())
    }

    #[test]
    fn test_resolves_module_members() {
        let ctx = Context::current();
        let sqrt = resolve(&ctx, "math.sqrt").unwrap();
        let result = sqrt
            .as_object()
            .unwrap()
            .call(CallArgs::new().arg(16))
            .unwrap();
        assert_eq!(result, Value::Float(4.0));
        assert_eq!(resolve(&ctx, "math.pi").unwrap().as_f64(), Some(std::f64::consts::PI));
    }

    #[test]
    fn test_single_segment_falls_back_to_builtins() {
        let ctx = Context::current();
        let int = resolve(&ctx, "int").unwrap();
        assert!(int.is_callable());
        assert!(resolve(&ctx, "builtins.int").unwrap().is_callable());
    }

    #[test]
    fn test_blocked_and_missing_are_distinct() {
        let ctx = Context::current();
        let blocked = resolve(&ctx, "os.system").unwrap_err();
        assert_eq!(blocked.kind(), ErrorKind::Security);

        let missing = resolve(&ctx, "math.nope").unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        // not on the allowlist at all
        let unlisted = resolve(&ctx, "secret_mod.x").unwrap_err();
        assert_eq!(unlisted.kind(), ErrorKind::Security);

        let relaxed = ctx.with_security(SecuritySettings {
            enforce_allowlist: false,
            ..Default::default()
        });
        let unknown = resolve(&relaxed, "secret_mod.x").unwrap_err();
        assert_eq!(unknown.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_builtins_outside_allowlist_rejected() {
        let ctx = Context::current();
        let err = resolve(&ctx, "eval").unwrap_err();
        assert!(matches!(err, Error::Security(_)));
    }

    #[test]
    fn test_attribute_walk_is_gated() {
        let ctx = Context::current();
        let err = resolve(&ctx, "math.__dict__").unwrap_err();
        assert!(err.is_security());
    }

    #[test]
    fn test_invalid_addresses() {
        let ctx = Context::current();
        for address in ["", "math.", ".math", "a..b", " math"] {
            assert!(matches!(
                resolve(&ctx, address),
                Err(Error::Resolve(ResolveError::InvalidAddress { .. }))
            ));
        }
    }

    #[test]
    fn test_local_namespace_registration() {
        let module = Module::new("acme.tools", Default::default()).with("answer", 42);
        let mut security = SecuritySettings::default();
        security.allowed_names.insert("acme.tools".into(), None);
        let ctx = Context::current()
            .with_namespace(module)
            .with_security(security);
        assert_eq!(resolve(&ctx, "acme.tools.answer").unwrap(), Value::Int(42));
    }
}
