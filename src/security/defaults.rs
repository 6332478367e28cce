//! Compiled-in gate defaults

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

pub const DEFAULT_MAX_DEPTH: usize = 100;
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(30);

/// Namespaces whose every member is allowed
pub const ALLOWED_MODULES: &[&str] = &[
    // data structures
    "collections",
    "datetime",
    "uuid",
    "decimal",
    "enum",
    // logic & math
    "math",
    "itertools",
    "functools",
    "random",
    "secrets",
    // text & encoding
    "string",
    "base64",
    "json",
    "html",
    // parsing
    "urllib.parse",
    "ipaddress",
    "structcast",
];

/// Members of `builtins` allowed by default
pub const ALLOWED_BUILTINS: &[&str] = &[
    "bool", "int", "float", "complex", "str", "bytes", "bytearray", "list", "tuple", "set",
    "frozenset", "dict", "len", "abs", "min", "max", "sum", "all", "any", "divmod", "round",
    "hash", "id", "enumerate", "zip", "range", "reversed", "sorted", "filter", "map", "pow",
    "slice", "format", "chr", "ord", "bin", "oct", "hex", "ascii", "repr", "Exception",
    "ValueError", "TypeError", "KeyError", "IndexError",
];

/// Names blocked outright, together with their dotted children
pub const BLOCKED_MODULES: &[&str] = &[
    // system & process
    "os",
    "subprocess",
    "sys",
    "shutil",
    "platform",
    "commands",
    "posix",
    "nt",
    // code execution & import machinery
    "importlib",
    "runpy",
    "pkgutil",
    "imp",
    "code",
    "codeop",
    // foreign function interfaces
    "ctypes",
    "cffi",
    "mmap",
    // serialization with code execution
    "pickle",
    "shelve",
    "marshal",
    "dill",
    "dbm",
    // network
    "socket",
    "ssl",
    "asyncio",
    "requests",
    "urllib.request",
    "http",
    "ftplib",
    "poplib",
    "imaplib",
    "smtplib",
    "telnetlib",
    "xmlrpc",
    // filesystem
    "pathlib",
    "glob",
    "tempfile",
    "fileinput",
    "io",
    // introspection & debugging
    "inspect",
    "pdb",
    "traceback",
    "faulthandler",
    "gc",
    "pty",
    // concurrency
    "threading",
    "multiprocessing",
    "concurrent",
];

/// Attribute names that are never reachable
pub const RESERVED_ATTRIBUTES: &[&str] = &[
    "__subclasses__",
    "__bases__",
    "__globals__",
    "__code__",
    "__dict__",
    "__class__",
    "__mro__",
    "__init__",
    "__import__",
];

/// Extensions accepted for file-based namespaces
pub const MODULE_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

pub fn blocked_names() -> BTreeSet<String> {
    BLOCKED_MODULES.iter().map(|s| s.to_string()).collect()
}

pub fn allowed_names() -> BTreeMap<String, Option<BTreeSet<Option<String>>>> {
    let mut allowed: BTreeMap<_, _> = ALLOWED_MODULES
        .iter()
        .map(|m| (m.to_string(), Some(BTreeSet::from([None]))))
        .collect();
    allowed.insert(
        "builtins".to_string(),
        Some(ALLOWED_BUILTINS.iter().map(|b| Some(b.to_string())).collect()),
    );
    allowed
}

pub fn reserved_attributes() -> BTreeSet<String> {
    RESERVED_ATTRIBUTES.iter().map(|s| s.to_string()).collect()
}

pub fn module_file_extensions() -> BTreeSet<String> {
    MODULE_FILE_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}
