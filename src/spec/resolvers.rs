//! Resolver and accessor registries
//!
//! * A **resolver** interprets the body of `"<name>: <body>"` against the
//!   source data.
//! * An **accessor** teaches path navigation how to step into a runtime
//!   object of a given type name.
//!
//! Both are process-wide and last-write-wins; a [`Context`] snapshot can
//! also carry local additions.
//!
//! [`Context`]: crate::context::Context

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use tracing::info;

use super::path::PathSegment;
use crate::context::Shared;
use crate::error::SpecError;
use crate::value::{Object, Value};

/// `fn(body, data) -> value`
pub type ResolverFn = Arc<dyn Fn(&str, &Value) -> Result<Value, String> + Send + Sync>;

/// `fn(object, segment) -> Some(value)` when the segment exists
pub type Accessor = Arc<dyn Fn(&Arc<dyn Object>, &PathSegment) -> Option<Value> + Send + Sync>;

/// Names handled by the spec engine itself
pub const BUILTIN_RESOLVERS: &[&str] = &["source", "constant", "skip"];

// =============================================================================
// RESOLVERS
// =============================================================================

#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: IndexMap<String, ResolverFn>,
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("names", &self.resolvers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ResolverRegistry {
    /// Register under the lowercased `name`; built-in names are refused
    pub fn register(&mut self, name: impl Into<String>, resolver: ResolverFn) -> Result<Option<ResolverFn>, SpecError> {
        let name = name.into().trim().to_lowercase();
        if BUILTIN_RESOLVERS.contains(&name.as_str()) || name.is_empty() || name.contains(':') {
            return Err(SpecError::ReservedResolver { name });
        }
        Ok(self.resolvers.insert(name, resolver))
    }

    pub fn get(&self, name: &str) -> Option<&ResolverFn> {
        self.resolvers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resolvers.keys().map(String::as_str)
    }
}

static RESOLVERS: Lazy<Shared<ResolverRegistry>> = Lazy::new(|| Shared::new(ResolverRegistry::default()));

pub fn resolver_registry() -> Arc<ResolverRegistry> {
    RESOLVERS.snapshot()
}

/// Register a named resolver process-wide
pub fn register_resolver(name: impl Into<String>, resolver: ResolverFn) -> Result<Option<ResolverFn>, SpecError> {
    let name = name.into();
    info!("Registering spec resolver {}", name);
    RESOLVERS.update(|registry| registry.register(name, resolver))
}

// =============================================================================
// ACCESSORS
// =============================================================================

#[derive(Clone, Default)]
pub struct AccessorRegistry {
    accessors: IndexMap<String, Accessor>,
}

impl fmt::Debug for AccessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorRegistry")
            .field("types", &self.accessors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AccessorRegistry {
    /// Register for objects whose `type_name()` equals `type_name`
    pub fn register(&mut self, type_name: impl Into<String>, accessor: Accessor) -> Option<Accessor> {
        self.accessors.insert(type_name.into(), accessor)
    }

    pub fn get(&self, type_name: &str) -> Option<&Accessor> {
        self.accessors.get(type_name)
    }
}

static ACCESSORS: Lazy<Shared<AccessorRegistry>> = Lazy::new(|| Shared::new(AccessorRegistry::default()));

pub fn accessor_registry() -> Arc<AccessorRegistry> {
    ACCESSORS.snapshot()
}

/// Register an accessor process-wide
pub fn register_accessor(type_name: impl Into<String>, accessor: Accessor) -> Option<Accessor> {
    let type_name = type_name.into();
    info!("Registering spec accessor for {}", type_name);
    ACCESSORS.update(|registry| registry.register(type_name, accessor))
}
