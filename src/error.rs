//! Error taxonomy for the resolution engine
//!
//! Every component reports through one of the enums below. The top-level
//! [`Error`] wraps them with `#[from]` conversions so `?` works across
//! component boundaries. Messages name the kind and the offending
//! name/path; they never include resolved values.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

// =============================================================================
// TOP-LEVEL ERROR
// =============================================================================

/// Main error type returned by every public entry point
#[derive(Error, Debug)]
pub enum Error {
    #[error("Security error: {0}")]
    Security(#[from] SecurityError),

    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Instantiation error: {0}")]
    Instantiation(#[from] InstantiationError),

    #[error("Spec error: {0}")]
    Spec(#[from] SpecError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Blocked import, blocked attribute or path violation
    Security,
    /// The name or path does not exist
    NotFound,
    /// Malformed pattern chain or failed invocation
    Instantiation,
    /// Spec parse, access or resolver failure
    Spec,
    /// Render failure or merge/splice shape mismatch
    Template,
    /// Recursion depth bound exceeded
    Recursion,
    /// Wall-clock bound exceeded
    Timeout,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Security(e) => e.kind(),
            Error::Resolve(ResolveError::NotFound { .. }) => ErrorKind::NotFound,
            Error::Resolve(_) => ErrorKind::Instantiation,
            Error::Instantiation(_) => ErrorKind::Instantiation,
            Error::Spec(_) => ErrorKind::Spec,
            Error::Template(_) => ErrorKind::Template,
        }
    }

    /// True for gate rejections (not for recursion/time bounds)
    pub fn is_security(&self) -> bool {
        self.kind() == ErrorKind::Security
    }
}

// =============================================================================
// SECURITY
// =============================================================================

/// Rejections raised by the security gate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("Blocked import: {module}{}", member.as_deref().map(|m| format!(".{m}")).unwrap_or_default())]
    BlockedImport {
        module: String,
        member: Option<String>,
    },

    #[error("Blocked attribute access on {owner}: {attribute:?}")]
    BlockedAttribute { owner: String, attribute: String },

    #[error("Invalid attribute name on {owner}: {attribute:?}")]
    InvalidAttribute { owner: String, attribute: String },

    #[error("Path not allowed: {}", path.display())]
    PathViolation { path: PathBuf },

    #[error("Path does not exist: {}", path.display())]
    PathNotFound { path: PathBuf },

    #[error("Maximum recursion depth exceeded: {max}")]
    DepthExceeded { depth: usize, max: usize },

    #[error("Maximum evaluation time exceeded: {max:?}")]
    Timeout { elapsed: Duration, max: Duration },
}

impl SecurityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SecurityError::DepthExceeded { .. } => ErrorKind::Recursion,
            SecurityError::Timeout { .. } => ErrorKind::Timeout,
            SecurityError::PathNotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Security,
        }
    }
}

// =============================================================================
// NAME RESOLUTION
// =============================================================================

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Address is empty or malformed: {address:?}")]
    InvalidAddress { address: String },

    #[error("Name not found: {name}")]
    NotFound { name: String },

    #[error("Module file must have one of the extensions {allowed:?}: {}", path.display())]
    UnsupportedModuleFile { path: PathBuf, allowed: Vec<String> },

    #[error("Failed to load module file {}: {message}", path.display())]
    ModuleLoad { path: PathBuf, message: String },
}

// =============================================================================
// INVOCATION
// =============================================================================

/// Errors raised by callables while binding or executing a call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    #[error("{function}() takes at most {max} positional arguments ({given} given)")]
    TooManyPositional {
        function: String,
        max: usize,
        given: usize,
    },

    #[error("{function}() got an unexpected keyword argument '{name}'")]
    UnexpectedKeyword { function: String, name: String },

    #[error("{function}() got multiple values for argument '{name}'")]
    DuplicateArgument { function: String, name: String },

    #[error("{function}() missing required argument '{name}'")]
    MissingArgument { function: String, name: String },

    #[error("{function}(): {message}")]
    Type { function: String, message: String },

    #[error("{function}(): {message}")]
    Value { function: String, message: String },
}

impl CallError {
    pub fn type_error(function: impl Into<String>, message: impl Into<String>) -> Self {
        CallError::Type {
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn value_error(function: impl Into<String>, message: impl Into<String>) -> Self {
        CallError::Value {
            function: function.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// PATTERN ENGINE
// =============================================================================

#[derive(Error, Debug)]
pub enum InstantiationError {
    #[error("Invalid pattern: {message}")]
    InvalidPattern { message: String },

    #[error("No object on the stack for {pattern} pattern")]
    EmptyStack { pattern: &'static str },

    #[error("Object of type {type_name} is not callable")]
    NotCallable { type_name: String },

    #[error("Attribute {attribute:?} not found on object of type {type_name}")]
    AttributeNotFound {
        attribute: String,
        type_name: String,
    },

    #[error("Object pattern did not produce a single object (got {count})")]
    NotSingleResult { count: usize },

    #[error("Call failed: {0}")]
    Call(#[from] CallError),

    #[error("Pipeline step {index} did not resolve to a callable (got {type_name})")]
    PipeNotCallable { index: usize, type_name: String },

    #[error("Pattern extension '{tag}' failed: {message}")]
    Extension { tag: String, message: String },
}

// =============================================================================
// SPEC ENGINE
// =============================================================================

#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Invalid specification format: {raw:?}: {message}")]
    InvalidFormat { raw: String, message: String },

    #[error("Unsupported specification node: {message}")]
    Unsupported { message: String },

    #[error("Key {key:?} not found at source {source_path:?}")]
    KeyNotFound { key: String, source_path: String },

    #[error("Index {index} out of range at source {source_path:?}")]
    IndexOutOfRange { index: usize, source_path: String },

    #[error("Cannot index {type_name} with {segment} at source {source_path:?}")]
    NotIndexable {
        type_name: String,
        segment: String,
        source_path: String,
    },

    #[error("Resolver '{name}' failed: {message}")]
    Resolver { name: String, message: String },

    #[error("Resolver name '{name}' is reserved")]
    ReservedResolver { name: String },
}

// =============================================================================
// TEMPLATE WALKER
// =============================================================================

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template render failed: {0}")]
    Render(#[from] RenderError),

    #[error("Invalid template node: {message}")]
    InvalidNode { message: String },

    #[error("Multiple template keys in one mapping: {keys:?}")]
    MultipleTemplates { keys: Vec<String> },

    #[error("Template in mapping context rendered a {found}, expected a mapping")]
    ExpectedMapping { found: &'static str },

    #[error("Template in sequence context rendered a {found}, expected a sequence")]
    ExpectedSequence { found: &'static str },

    #[error("Template output key {key:?} collides with an existing key")]
    KeyCollision { key: String },

    #[error("Template node in a sequence carries static keys: {keys:?}")]
    StrayKeys { keys: Vec<String> },

    #[error("Rendered {format} could not be parsed: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("Binding {name:?} cannot be passed to the renderer: {message}")]
    Binding { name: String, message: String },
}

/// Failure reported by a [`crate::template::TemplateRenderer`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Template syntax error: {0}")]
    Syntax(String),

    #[error("Unresolved variable: {0}")]
    Unresolved(String),

    #[error("{0}")]
    Other(String),
}
