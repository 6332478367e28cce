//! Structcast - configuration-driven construction behind a security gate
//!
//! Plain configuration trees (YAML / JSON) describe three things:
//!
//! - **Objects to build**, as chains of patterns: resolve an address, read
//!   an attribute, call, partially apply.
//! - **Data to reshape**, as spec trees whose leaves are `"<resolver>:
//!   <body>"` strings (source paths, constants, skips, custom resolvers).
//! - **Fragments to generate**, as template nodes expanded in place.
//!
//! Every name lookup, attribute access, file path and recursion step passes
//! through one security gate.
//!
//! ## Architecture
//!
//! ```text
//! value ── security ── resolver ── pattern ──┬── spec
//!                                            └── template
//!                 context (per-call snapshot of all of the above)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use structcast::{instantiate, CallArgs, Value};
//!
//! let config = Value::from(json!({"_obj_": [{"_addr_": "int"}, {"_bind_": {"base": 16}}]}));
//! let parser = instantiate(&config).unwrap();
//! let value = parser.as_object().unwrap().call(CallArgs::new().arg("FF")).unwrap();
//! assert_eq!(value, Value::Int(255));
//! ```

// Core error handling
pub mod error;

// Generic value tree and runtime objects
pub mod value;

// Security gate
pub mod security;

// Name resolution over the namespace table
pub mod resolver;

// Object construction
pub mod pattern;

// Data reshaping
pub mod spec;

// Template expansion
pub mod template;

// Per-call snapshot of process-wide state
pub mod context;

// Configuration file loading
pub mod config;

pub use config::{ConfigLoader, StructcastConfig, CONFIG_ENV_VAR};
pub use context::{Budget, Context};
pub use error::{Error, ErrorKind, Result};
pub use pattern::{evaluate, instantiate, register_pattern, Pattern, PatternExtension, PatternResult};
pub use resolver::{register_namespace, resolve, NamespaceTable};
pub use security::{configure_security, validate_attribute, validate_import, validate_path, SecurityOverrides, SecuritySettings};
pub use spec::{
    access, construct, parse_spec, register_accessor, register_resolver, configure_spec, PathSegment, Spec,
    SpecIntermediate, SpecOverrides,
};
pub use template::{
    configure_templates, expand_structure, render_node, BindingGroups, TemplateExpander, TemplateNode,
    TemplateOverrides, TemplateRenderer,
};
pub use value::{CallArgs, Mapping, Module, Object, Value};
