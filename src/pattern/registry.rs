//! Pattern extension registry
//!
//! Extensions claim a mapping key (e.g. `_env_`) and run as one more step
//! on the pattern stack. The built-in keys always win over extensions.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use tracing::{info, warn};

use super::{PatternResult, RESERVED_KEYS};
use crate::context::{Context, Shared};
use crate::error::Result;
use crate::value::Value;

/// A user-defined pattern step
pub trait PatternExtension: Send + Sync {
    /// Check the body at parse time
    fn validate(&self, _body: &Value) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Apply the step to the running result
    fn evaluate(&self, ctx: &Context, body: &Value, result: &mut PatternResult) -> Result<()>;
}

/// Registered extensions keyed by their mapping tag
#[derive(Clone, Default)]
pub struct PatternRegistry {
    handlers: IndexMap<String, Arc<dyn PatternExtension>>,
}

impl fmt::Debug for PatternRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternRegistry")
            .field("tags", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PatternRegistry {
    /// Register `handler` under `tag`, returning the handler it replaced
    pub fn register(
        &mut self,
        tag: impl Into<String>,
        handler: Arc<dyn PatternExtension>,
    ) -> Option<Arc<dyn PatternExtension>> {
        let tag = tag.into();
        if RESERVED_KEYS.contains(&tag.as_str()) {
            warn!(tag = %tag, "Pattern extension shadows a built-in key and will never match");
        }
        self.handlers.insert(tag, handler)
    }

    pub fn get(&self, tag: &str) -> Option<&Arc<dyn PatternExtension>> {
        self.handlers.get(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

static PATTERNS: Lazy<Shared<PatternRegistry>> = Lazy::new(|| Shared::new(PatternRegistry::default()));

/// Snapshot of the process-wide extension registry
pub fn pattern_registry() -> Arc<PatternRegistry> {
    PATTERNS.snapshot()
}

/// Register a pattern extension process-wide (last write wins)
pub fn register_pattern(
    tag: impl Into<String>,
    handler: Arc<dyn PatternExtension>,
) -> Option<Arc<dyn PatternExtension>> {
    let tag = tag.into();
    info!("Registering pattern extension {}", tag);
    PATTERNS.update(|registry| registry.register(tag, handler))
}
