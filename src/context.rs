//! Evaluation Context
//!
//! A [`Context`] is an immutable snapshot of every piece of process-wide
//! state an evaluation reads: security settings, namespaces, registered
//! pattern extensions, spec resolvers and accessors, and spec / template
//! defaults. Top-level entry points take one snapshot and thread it through
//! the whole call, so reconfiguration on another thread is never observed
//! mid-evaluation.
//!
//! The recursion bound is carried separately as a [`Budget`]: a `(depth,
//! start)` token that nested evaluations inherit and deepen rather than
//! reset.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use crate::error::{Result, SecurityError, SpecError};
use crate::pattern::{self, Pattern, PatternExtension, PatternRegistry, PatternResult};
use crate::resolver::{self, NamespaceTable};
use crate::security::{self, SecuritySettings};
use crate::spec::{self, Accessor, AccessorRegistry, ResolverFn, ResolverRegistry, Spec, SpecSettings};
use crate::template::{self, BindingGroups, TemplateSettings};
use crate::value::{Module, Value};

// =============================================================================
// SHARED SLOT
// =============================================================================

/// Process-wide slot holding an atomically replaceable `Arc<T>`
pub(crate) struct Shared<T>(RwLock<Arc<T>>);

impl<T: Clone> Shared<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(RwLock::new(Arc::new(value)))
    }

    pub(crate) fn snapshot(&self) -> Arc<T> {
        let guard = self.0.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub(crate) fn replace(&self, value: T) {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(value);
    }

    /// Copy-on-write update; snapshots already handed out are unaffected
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        f(Arc::make_mut(&mut guard))
    }
}

// =============================================================================
// BUDGET
// =============================================================================

/// Depth / start-time token threaded through recursive evaluation
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    depth: usize,
    start: Instant,
}

impl Budget {
    /// Fresh budget for a top-level call
    pub fn start() -> Self {
        Self {
            depth: 0,
            start: Instant::now(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn started_at(&self) -> Instant {
        self.start
    }

    /// Same start time, one level deeper
    pub(crate) fn descend(self) -> Self {
        Self {
            depth: self.depth + 1,
            ..self
        }
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Snapshot of all process-wide configuration for one top-level call
#[derive(Debug, Clone)]
pub struct Context {
    pub(crate) security: Arc<SecuritySettings>,
    pub(crate) namespaces: Arc<NamespaceTable>,
    pub(crate) patterns: Arc<PatternRegistry>,
    pub(crate) resolvers: Arc<ResolverRegistry>,
    pub(crate) accessors: Arc<AccessorRegistry>,
    pub(crate) spec: Arc<SpecSettings>,
    pub(crate) templates: Arc<TemplateSettings>,
}

impl Context {
    /// Snapshot the live process-wide state
    pub fn current() -> Self {
        Self {
            security: security::security_settings(),
            namespaces: resolver::namespaces(),
            patterns: pattern::pattern_registry(),
            resolvers: spec::resolver_registry(),
            accessors: spec::accessor_registry(),
            spec: spec::spec_settings(),
            templates: template::template_settings(),
        }
    }

    pub fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub fn spec_settings(&self) -> &SpecSettings {
        &self.spec
    }

    pub fn template_settings(&self) -> &TemplateSettings {
        &self.templates
    }

    pub fn namespaces(&self) -> &NamespaceTable {
        &self.namespaces
    }

    // -------------------------------------------------------------------------
    // Local overrides (never touch process-wide state)
    // -------------------------------------------------------------------------

    pub fn with_security(mut self, settings: SecuritySettings) -> Self {
        self.security = Arc::new(settings);
        self
    }

    pub fn with_namespace(mut self, module: Module) -> Self {
        Arc::make_mut(&mut self.namespaces).insert(module);
        self
    }

    pub fn with_pattern(mut self, tag: impl Into<String>, handler: Arc<dyn PatternExtension>) -> Self {
        Arc::make_mut(&mut self.patterns).register(tag, handler);
        self
    }

    /// Fails for the built-in resolver names
    pub fn with_resolver(mut self, name: impl Into<String>, resolver: ResolverFn) -> Result<Self, SpecError> {
        Arc::make_mut(&mut self.resolvers).register(name, resolver)?;
        Ok(self)
    }

    pub fn with_accessor(mut self, type_name: impl Into<String>, accessor: Accessor) -> Self {
        Arc::make_mut(&mut self.accessors).register(type_name, accessor);
        self
    }

    pub fn with_spec_settings(mut self, settings: SpecSettings) -> Self {
        self.spec = Arc::new(settings);
        self
    }

    pub fn with_template_settings(mut self, settings: TemplateSettings) -> Self {
        self.templates = Arc::new(settings);
        self
    }

    /// Recursion/time check against this snapshot's bounds
    pub(crate) fn guard(&self, budget: Budget) -> std::result::Result<(), SecurityError> {
        self.security.guard_recursion(budget.depth, budget.start)
    }

    // -------------------------------------------------------------------------
    // Entry points
    // -------------------------------------------------------------------------

    /// Evaluate one pattern against an optional incoming result
    pub fn evaluate(&self, pattern: &Pattern, incoming: Option<PatternResult>) -> Result<PatternResult> {
        pattern::evaluate(self, pattern, incoming)
    }

    /// Walk `config`, evaluating every embedded object pattern
    pub fn instantiate(&self, config: &Value) -> Result<Value> {
        pattern::instantiate_with(self, config, Budget::start())
    }

    /// Resolve a dotted address
    pub fn resolve_address(&self, address: &str) -> Result<Value> {
        resolver::resolve_address(self, address, None, Budget::start())
    }

    /// Build a new tree from `spec` and `data`
    pub fn construct(&self, data: &Value, spec: &Spec) -> Result<Value> {
        spec::construct_with(self, data, spec, Budget::start())
    }

    /// Expand template nodes in `tree`
    pub fn expand_structure(&self, tree: &Value, bindings: &BindingGroups) -> Result<Value> {
        template::TemplateExpander::new().expand_with(self, tree, bindings)
    }
}
