//! Stack evaluation of patterns and the generic `instantiate` walk.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use super::{is_object_form, Arguments, Pattern};
use crate::context::{Budget, Context};
use crate::error::{InstantiationError, Result};
use crate::resolver;
use crate::value::{CallArgs, Mapping, Object, Partial, Value};

// =============================================================================
// PATTERN RESULT
// =============================================================================

/// Running state of one evaluation: value stack plus the patterns applied
#[derive(Debug, Clone)]
pub struct PatternResult {
    pub stack: Vec<Value>,
    pub applied_patterns: Vec<Pattern>,
    budget: Budget,
}

impl Default for PatternResult {
    fn default() -> Self {
        Self::with_budget(Budget::start())
    }
}

impl PatternResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_budget(budget: Budget) -> Self {
        Self {
            stack: Vec::new(),
            applied_patterns: Vec::new(),
            budget,
        }
    }

    pub fn depth(&self) -> usize {
        self.budget.depth()
    }

    pub fn started_at(&self) -> Instant {
        self.budget.started_at()
    }

    pub fn budget(&self) -> Budget {
        self.budget
    }

    /// Top of the stack
    pub fn last(&self) -> Option<&Value> {
        self.stack.last()
    }

    /// Pop the top of the stack for the named pattern kind
    pub fn pop(&mut self, pattern: &'static str) -> std::result::Result<Value, InstantiationError> {
        self.stack
            .pop()
            .ok_or(InstantiationError::EmptyStack { pattern })
    }
}

// =============================================================================
// EVALUATION
// =============================================================================

/// Apply `pattern` to `incoming` (or a fresh result)
pub fn evaluate(ctx: &Context, pattern: &Pattern, incoming: Option<PatternResult>) -> Result<PatternResult> {
    let mut result = incoming.unwrap_or_default();
    ctx.guard(result.budget)?;
    step(ctx, pattern, &mut result)?;
    Ok(result)
}

fn step(ctx: &Context, pattern: &Pattern, result: &mut PatternResult) -> Result<()> {
    match pattern {
        Pattern::Address { address, file } => {
            let value = resolver::resolve_address(ctx, address, file.as_deref(), result.budget)?;
            result.stack.push(value);
        }
        Pattern::Attribute { attribute } => {
            let target = result.pop("attribute")?;
            ctx.security.validate_attribute(target.type_label(), attribute)?;
            let mut current = target;
            for segment in attribute.split('.') {
                current = current
                    .get_attr(segment)
                    .ok_or_else(|| InstantiationError::AttributeNotFound {
                        attribute: segment.to_string(),
                        type_name: current.type_label().to_string(),
                    })?;
            }
            result.stack.push(current);
        }
        Pattern::Call { args } => {
            let target = callable(result.pop("call")?)?;
            let call_args = resolve_arguments(ctx, args, result.budget)?;
            debug!(target = target.type_name(), "Calling");
            let value = target.call(call_args).map_err(InstantiationError::from)?;
            result.stack.push(value);
        }
        Pattern::Bind { args } => {
            let target = callable(result.pop("bind")?)?;
            let call_args = resolve_arguments(ctx, args, result.budget)?;
            result.stack.push(Value::object(Partial::new(target, call_args)));
        }
        Pattern::Object { steps } => {
            let value = evaluate_object(ctx, steps, result.budget.descend())?;
            result.stack.push(value);
        }
        Pattern::Extension { tag, body, handler } => {
            debug!(tag = %tag, "Applying pattern extension");
            handler.0.evaluate(ctx, body, result)?;
        }
    }
    result.applied_patterns.push(pattern.clone());
    Ok(())
}

/// Fold `steps` over a fresh stack; exactly one value must remain
pub(crate) fn evaluate_object(ctx: &Context, steps: &[Pattern], budget: Budget) -> Result<Value> {
    let mut inner = PatternResult::with_budget(budget);
    for pattern in steps {
        ctx.guard(budget)?;
        step(ctx, pattern, &mut inner)?;
    }
    if inner.stack.len() != 1 {
        return Err(InstantiationError::NotSingleResult {
            count: inner.stack.len(),
        }
        .into());
    }
    inner.pop("object").map_err(Into::into)
}

fn callable(value: Value) -> std::result::Result<Arc<dyn Object>, InstantiationError> {
    match value {
        Value::Object(obj) if obj.is_callable() => Ok(obj),
        other => Err(InstantiationError::NotCallable {
            type_name: other.type_label().to_string(),
        }),
    }
}

/// Instantiate every argument one level deeper than the calling pattern
fn resolve_arguments(ctx: &Context, args: &Arguments, budget: Budget) -> Result<CallArgs> {
    let nested = budget.descend();
    match args {
        Arguments::Positional(values) => {
            let values = values
                .iter()
                .map(|v| instantiate_with(ctx, v, nested))
                .collect::<Result<Vec<_>>>()?;
            Ok(CallArgs::positional(values))
        }
        Arguments::Named(map) => {
            let mut named = Mapping::with_capacity(map.len());
            for (name, v) in map {
                named.insert(name.clone(), instantiate_with(ctx, v, nested)?);
            }
            Ok(CallArgs::named(named))
        }
    }
}

// =============================================================================
// INSTANTIATE
// =============================================================================

/// Instantiate `config` against the live process-wide state
pub fn instantiate(config: &Value) -> Result<Value> {
    Context::current().instantiate(config)
}

/// Walk a value tree; object-pattern nodes are evaluated, containers are
/// rebuilt one level deeper, everything else passes through
pub(crate) fn instantiate_with(ctx: &Context, value: &Value, budget: Budget) -> Result<Value> {
    ctx.guard(budget)?;
    if is_object_form(value) {
        if let Pattern::Object { steps } = Pattern::parse(value, &ctx.patterns)? {
            return evaluate_object(ctx, &steps, budget);
        }
    }
    match value {
        Value::Sequence(items) => {
            let nested = budget.descend();
            items
                .iter()
                .map(|item| instantiate_with(ctx, item, nested))
                .collect::<Result<Vec<_>>>()
                .map(Value::Sequence)
        }
        Value::Mapping(map) => {
            let nested = budget.descend();
            let mut out = Mapping::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), instantiate_with(ctx, item, nested)?);
            }
            Ok(Value::Mapping(out))
        }
        other => Ok(other.clone()),
    }
}

// =============================================================================
// PIPELINES
// =============================================================================

/// Feed `value` through each pipeline step in order; every step must
/// evaluate to a callable taking one argument
pub(crate) fn apply_pipeline(ctx: &Context, pipe: &[Pattern], value: Value, budget: Budget) -> Result<Value> {
    let mut value = value;
    for (index, pattern) in pipe.iter().enumerate() {
        let func = match pattern {
            Pattern::Object { steps } => evaluate_object(ctx, steps, budget.descend())?,
            other => evaluate_object(ctx, std::slice::from_ref(other), budget.descend())?,
        };
        let func = match func {
            Value::Object(obj) if obj.is_callable() => obj,
            other => {
                return Err(InstantiationError::PipeNotCallable {
                    index,
                    type_name: other.type_label().to_string(),
                }
                .into())
            }
        };
        value = func
            .call(CallArgs::new().arg(value))
            .map_err(InstantiationError::from)?;
    }
    Ok(value)
}
