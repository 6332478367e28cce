//! Runtime Object Model
//!
//! Opaque runtime values produced by name resolution and invocation.
//! Everything reachable from a pattern is one of these or plain data.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::{Mapping, Value};
use crate::error::CallError;

/// An opaque runtime object
///
/// Attribute lookups on objects are always preceded by
/// [`crate::security::SecuritySettings::validate_attribute`]; implementations
/// only need to answer for the names they expose.
pub trait Object: fmt::Debug + Send + Sync {
    /// Type name used in error messages and accessor lookup
    fn type_name(&self) -> &str;

    fn get_attr(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Names this object exposes as attributes
    fn attr_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn is_callable(&self) -> bool {
        false
    }

    fn call(&self, _args: CallArgs) -> Result<Value, CallError> {
        Err(CallError::type_error(
            self.type_name(),
            "object is not callable",
        ))
    }

    /// Independent copy for deep-copy return types; `None` shares the object
    fn deep_clone(&self) -> Option<Arc<dyn Object>> {
        None
    }
}

// =============================================================================
// CALL ARGUMENTS
// =============================================================================

/// Positional and named arguments for one invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub named: Mapping,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: values.into_iter().collect(),
            named: Mapping::new(),
        }
    }

    pub fn named(values: Mapping) -> Self {
        Self {
            positional: Vec::new(),
            named: values,
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// A declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

/// Parameter list of a callable
///
/// Binding follows the usual calling convention: positional arguments fill
/// parameters in order, named arguments fill by name, defaults fill the rest.
/// Surplus positional arguments go to the variadic tail when one is declared,
/// unknown names go to the keyword tail when one is declared.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<Param>,
    pub variadic: bool,
    pub var_keyword: bool,
}

impl Signature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            variadic: false,
            var_keyword: false,
        }
    }

    /// Required parameter
    pub fn arg(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            default: None,
        });
        self
    }

    /// Optional parameter
    pub fn arg_default(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.params.push(Param {
            name: name.into(),
            default: Some(default.into()),
        });
        self
    }

    /// Accept surplus positional arguments
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Accept unknown named arguments
    pub fn var_keyword(mut self) -> Self {
        self.var_keyword = true;
        self
    }

    pub fn bind(&self, args: CallArgs) -> Result<BoundArgs, CallError> {
        let given = args.positional.len();
        let mut slots: Vec<Option<Value>> = vec![None; self.params.len()];
        let mut positional = args.positional.into_iter();

        for (slot, value) in slots.iter_mut().zip(positional.by_ref()) {
            *slot = Some(value);
        }
        let rest: Vec<Value> = positional.collect();
        if !rest.is_empty() && !self.variadic {
            return Err(CallError::TooManyPositional {
                function: self.name.clone(),
                max: self.params.len(),
                given,
            });
        }

        let mut extra = Mapping::new();
        for (name, value) in args.named {
            match self.params.iter().position(|p| p.name == name) {
                Some(index) if slots[index].is_some() => {
                    return Err(CallError::DuplicateArgument {
                        function: self.name.clone(),
                        name,
                    });
                }
                Some(index) => slots[index] = Some(value),
                None if self.var_keyword => {
                    extra.insert(name, value);
                }
                None => {
                    return Err(CallError::UnexpectedKeyword {
                        function: self.name.clone(),
                        name,
                    });
                }
            }
        }

        let mut values = Vec::with_capacity(slots.len());
        for (slot, param) in slots.into_iter().zip(&self.params) {
            match slot.or_else(|| param.default.clone()) {
                Some(value) => values.push(value),
                None => {
                    return Err(CallError::MissingArgument {
                        function: self.name.clone(),
                        name: param.name.clone(),
                    });
                }
            }
        }

        Ok(BoundArgs {
            function: self.name.clone(),
            values,
            rest,
            extra,
        })
    }
}

/// Arguments after binding against a [`Signature`]
#[derive(Debug, Clone)]
pub struct BoundArgs {
    pub function: String,
    /// One value per declared parameter, in declaration order
    pub values: Vec<Value>,
    /// Surplus positional arguments (variadic tail)
    pub rest: Vec<Value>,
    /// Unknown named arguments (keyword tail)
    pub extra: Mapping,
}

impl BoundArgs {
    pub fn get(&self, index: usize) -> &Value {
        self.values.get(index).unwrap_or(&Value::Null)
    }

    pub fn str(&self, index: usize) -> Result<&str, CallError> {
        self.get(index).as_str().ok_or_else(|| {
            CallError::type_error(
                &self.function,
                format!("expected str, got {}", self.get(index).type_label()),
            )
        })
    }

    pub fn int(&self, index: usize) -> Result<i64, CallError> {
        self.get(index).as_i64().ok_or_else(|| {
            CallError::type_error(
                &self.function,
                format!("expected int, got {}", self.get(index).type_label()),
            )
        })
    }

    pub fn float(&self, index: usize) -> Result<f64, CallError> {
        self.get(index).as_f64().ok_or_else(|| {
            CallError::type_error(
                &self.function,
                format!("expected a number, got {}", self.get(index).type_label()),
            )
        })
    }

    /// All positional values: declared parameters followed by the tail
    pub fn all_positional(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().chain(self.rest.iter())
    }

    pub fn type_error(&self, message: impl Into<String>) -> CallError {
        CallError::type_error(&self.function, message)
    }

    pub fn value_error(&self, message: impl Into<String>) -> CallError {
        CallError::value_error(&self.function, message)
    }
}

// =============================================================================
// NATIVE FUNCTIONS
// =============================================================================

type NativeFn = dyn Fn(BoundArgs) -> Result<Value, CallError> + Send + Sync;

/// A named callable implemented in Rust
#[derive(Clone)]
pub struct NativeFunction {
    signature: Signature,
    func: Arc<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(signature: Signature, func: F) -> Self
    where
        F: Fn(BoundArgs) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self {
            signature,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.signature.name)
            .finish_non_exhaustive()
    }
}

impl Object for NativeFunction {
    fn type_name(&self) -> &str {
        "builtin_function"
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, args: CallArgs) -> Result<Value, CallError> {
        let bound = self.signature.bind(args)?;
        (self.func)(bound)
    }
}

// =============================================================================
// PARTIAL APPLICATION
// =============================================================================

/// A callable with pre-filled arguments
///
/// Positional arguments supplied at call time are appended after the bound
/// ones; named arguments supplied at call time override bound ones.
#[derive(Debug, Clone)]
pub struct Partial {
    pub target: Arc<dyn Object>,
    pub args: Vec<Value>,
    pub kwargs: Mapping,
}

impl Partial {
    pub fn new(target: Arc<dyn Object>, bound: CallArgs) -> Self {
        Self {
            target,
            args: bound.positional,
            kwargs: bound.named,
        }
    }
}

impl Object for Partial {
    fn type_name(&self) -> &str {
        "partial"
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        match name {
            "func" => Some(Value::Object(Arc::clone(&self.target))),
            "args" => Some(Value::Sequence(self.args.clone())),
            "keywords" => Some(Value::Mapping(self.kwargs.clone())),
            _ => None,
        }
    }

    fn attr_names(&self) -> Vec<String> {
        vec!["func".into(), "args".into(), "keywords".into()]
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, args: CallArgs) -> Result<Value, CallError> {
        let mut positional = self.args.clone();
        positional.extend(args.positional);
        let mut named = self.kwargs.clone();
        named.extend(args.named);
        self.target.call(CallArgs { positional, named })
    }
}

// =============================================================================
// MODULES
// =============================================================================

/// A namespace of named members
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    members: Mapping,
}

impl Module {
    pub fn new(name: impl Into<String>, members: Mapping) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member(&self, name: &str) -> Option<&Value> {
        self.members.get(name)
    }

    pub fn members(&self) -> &Mapping {
        &self.members
    }

    /// Add a member (builder style)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.members.insert(name.into(), value.into());
        self
    }

    /// Add a native function member (builder style)
    pub fn with_fn<F>(self, signature: Signature, func: F) -> Self
    where
        F: Fn(BoundArgs) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        let name = signature.name.clone();
        self.with(name, Value::object(NativeFunction::new(signature, func)))
    }
}

impl Object for Module {
    fn type_name(&self) -> &str {
        "module"
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        self.members.get(name).cloned()
    }

    fn attr_names(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// Struct-like object with named fields
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    type_name: String,
    fields: Mapping,
}

impl Record {
    pub fn new(type_name: impl Into<String>, fields: Mapping) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }

    pub fn fields(&self) -> &Mapping {
        &self.fields
    }
}

impl Object for Record {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    fn attr_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn deep_clone(&self) -> Option<Arc<dyn Object>> {
        let fields = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.deep_clone()))
            .collect::<IndexMap<_, _>>();
        Some(Arc::new(Record::new(self.type_name.clone(), fields)))
    }
}

/// Callable constructor for [`Record`]s
#[derive(Debug, Clone)]
pub struct RecordType {
    signature: Signature,
}

impl RecordType {
    pub fn new(signature: Signature) -> Self {
        Self { signature }
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }
}

impl Object for RecordType {
    fn type_name(&self) -> &str {
        "type"
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, args: CallArgs) -> Result<Value, CallError> {
        let bound = self.signature.bind(args)?;
        let fields = self
            .signature
            .params
            .iter()
            .zip(bound.values)
            .map(|(param, value)| (param.name.clone(), value))
            .chain(bound.extra)
            .collect();
        Ok(Value::object(Record::new(self.signature.name.clone(), fields)))
    }
}
