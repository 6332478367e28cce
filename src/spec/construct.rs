//! Construction of output trees from spec trees.

use tracing::debug;

use super::access::{access_with, AccessOptions};
use super::path::{ResolverKind, SpecIntermediate};
use super::{FlexNode, Spec};
use crate::context::{Budget, Context};
use crate::error::{Result, SpecError};
use crate::pattern;
use crate::value::{Mapping, Value};

/// Build the output for `spec`; a top-level `skip` yields `null`
pub(crate) fn construct_with(ctx: &Context, data: &Value, spec: &Spec, budget: Budget) -> Result<Value> {
    let inherited = AccessOptions::from_settings(&ctx.spec);
    Ok(build(ctx, data, spec, inherited, budget)?.unwrap_or(Value::Null))
}

/// `Ok(None)` means the node asked to be omitted
fn build(ctx: &Context, data: &Value, spec: &Spec, inherited: AccessOptions, budget: Budget) -> Result<Option<Value>> {
    ctx.guard(budget)?;
    let options = spec.options();
    let access = inherited.overlay(options);

    let value = match spec {
        Spec::Raw { intermediate, .. } => match resolve(ctx, data, intermediate, &access)? {
            Some(value) => value,
            None => return Ok(None),
        },
        Spec::Object { steps, .. } => pattern::evaluate_object(ctx, steps, budget.descend())?,
        Spec::Flex { node, .. } => match node {
            FlexNode::Null => Value::Null,
            FlexNode::Raw(intermediate) => match resolve(ctx, data, intermediate, &access)? {
                Some(value) => value,
                None => return Ok(None),
            },
            FlexNode::Object(steps) => pattern::evaluate_object(ctx, steps, budget.descend())?,
            FlexNode::Mapping(children) => {
                let nested = budget.descend();
                let mut out = Mapping::with_capacity(children.len());
                for (key, child) in children {
                    if let Some(value) = build(ctx, data, child, access, nested)? {
                        out.insert(key.clone(), value);
                    }
                }
                Value::Mapping(out)
            }
            FlexNode::Sequence(children) => {
                let nested = budget.descend();
                let mut out = Vec::with_capacity(children.len());
                for child in children {
                    if let Some(value) = build(ctx, data, child, access, nested)? {
                        out.push(value);
                    }
                }
                Value::Sequence(out)
            }
        },
    };

    if options.pipe.is_empty() {
        return Ok(Some(value));
    }
    pattern::apply_pipeline(ctx, &options.pipe, value, budget).map(Some)
}

fn resolve(ctx: &Context, data: &Value, intermediate: &SpecIntermediate, options: &AccessOptions) -> Result<Option<Value>> {
    match &intermediate.resolver {
        ResolverKind::Source => access_with(ctx, data, &intermediate.path, options).map(Some),
        ResolverKind::Constant => Ok(Some(Value::String(intermediate.body.clone()))),
        ResolverKind::Skip => Ok(None),
        ResolverKind::Custom(name) => {
            let resolver = ctx.resolvers.get(name).ok_or_else(|| SpecError::Resolver {
                name: name.clone(),
                message: "not registered".to_string(),
            })?;
            debug!(resolver = %name, "Applying custom resolver");
            let value = resolver(intermediate.body.as_str(), data).map_err(|message| SpecError::Resolver {
                name: name.clone(),
                message,
            })?;
            Ok(Some(value))
        }
    }
}
