//! Security Gate
//!
//! The single enforcement point for everything that reaches outside plain
//! data: which names may be resolved, which attributes may be touched,
//! which files may be read, and how deep / how long one evaluation may run.
//!
//! ## Settings lifecycle
//!
//! Exactly one [`SecuritySettings`] instance is live per process. It starts
//! as the compiled-in defaults and is replaced atomically by
//! [`configure_security`]. Evaluations take one snapshot
//! ([`security_settings`]) at their top-level entry and use it throughout,
//! so a concurrent reconfiguration is never observed half-way.
//!
//! ```ignore
//! configure_security(SecurityOverrides {
//!     enforce_allowlist: Some(false),
//!     ..Default::default()
//! });
//! // ...
//! configure_security(SecurityOverrides::default()); // back to defaults
//! ```

pub mod defaults;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::{debug, info};

use crate::context::Shared;
use crate::error::SecurityError;

/// Allowlist entry: `None` = module fully open; a set containing `None` =
/// every member allowed; otherwise only the listed members
pub type AllowedMembers = Option<BTreeSet<Option<String>>>;

// =============================================================================
// SETTINGS
// =============================================================================

/// Process-wide restriction settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecuritySettings {
    /// Names blocked together with their dotted children
    pub blocked_names: BTreeSet<String>,
    /// Allowlist keyed by module name
    pub allowed_names: BTreeMap<String, AllowedMembers>,
    /// Attribute names never reachable
    pub reserved_attributes: BTreeSet<String>,
    pub ascii_only: bool,
    /// Reject `_name`
    pub block_protected: bool,
    /// Reject `__name` (dunders excluded)
    pub block_private: bool,
    pub reject_hidden_paths: bool,
    pub require_working_dir_containment: bool,
    /// Reject modules without an allowlist entry
    pub enforce_allowlist: bool,
    /// Extra roots for containment and relative path search
    pub allowed_directories: Vec<PathBuf>,
    /// Extensions accepted for file-based namespaces (without the dot)
    pub module_file_extensions: BTreeSet<String>,
    pub max_depth: usize,
    pub max_duration: Duration,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            blocked_names: defaults::blocked_names(),
            allowed_names: defaults::allowed_names(),
            reserved_attributes: defaults::reserved_attributes(),
            ascii_only: true,
            block_protected: true,
            block_private: true,
            reject_hidden_paths: true,
            require_working_dir_containment: true,
            enforce_allowlist: true,
            allowed_directories: Vec::new(),
            module_file_extensions: defaults::module_file_extensions(),
            max_depth: defaults::DEFAULT_MAX_DEPTH,
            max_duration: defaults::DEFAULT_MAX_DURATION,
        }
    }
}

/// Partial update applied over the compiled-in defaults
///
/// Every `None` field keeps its default. An all-`None` value resets the gate.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityOverrides {
    pub blocked_names: Option<BTreeSet<String>>,
    pub allowed_names: Option<BTreeMap<String, AllowedMembers>>,
    pub reserved_attributes: Option<BTreeSet<String>>,
    pub ascii_only: Option<bool>,
    pub block_protected: Option<bool>,
    pub block_private: Option<bool>,
    pub reject_hidden_paths: Option<bool>,
    pub require_working_dir_containment: Option<bool>,
    pub enforce_allowlist: Option<bool>,
    pub allowed_directories: Option<Vec<PathBuf>>,
    pub module_file_extensions: Option<BTreeSet<String>>,
    pub max_depth: Option<usize>,
    /// Seconds, fractional allowed
    pub max_duration_secs: Option<f64>,
}

impl SecurityOverrides {
    /// Defaults overlaid with the provided fields
    pub fn into_settings(self) -> SecuritySettings {
        let defaults = SecuritySettings::default();
        SecuritySettings {
            blocked_names: self.blocked_names.unwrap_or(defaults.blocked_names),
            allowed_names: self.allowed_names.unwrap_or(defaults.allowed_names),
            reserved_attributes: self
                .reserved_attributes
                .unwrap_or(defaults.reserved_attributes),
            ascii_only: self.ascii_only.unwrap_or(defaults.ascii_only),
            block_protected: self.block_protected.unwrap_or(defaults.block_protected),
            block_private: self.block_private.unwrap_or(defaults.block_private),
            reject_hidden_paths: self
                .reject_hidden_paths
                .unwrap_or(defaults.reject_hidden_paths),
            require_working_dir_containment: self
                .require_working_dir_containment
                .unwrap_or(defaults.require_working_dir_containment),
            enforce_allowlist: self.enforce_allowlist.unwrap_or(defaults.enforce_allowlist),
            allowed_directories: self
                .allowed_directories
                .unwrap_or(defaults.allowed_directories),
            module_file_extensions: self
                .module_file_extensions
                .unwrap_or(defaults.module_file_extensions),
            max_depth: self.max_depth.unwrap_or(defaults.max_depth),
            max_duration: self
                .max_duration_secs
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.max_duration),
        }
    }
}

// =============================================================================
// PROCESS-WIDE INSTANCE
// =============================================================================

static SETTINGS: Lazy<Shared<SecuritySettings>> =
    Lazy::new(|| Shared::new(SecuritySettings::default()));

/// Snapshot of the live settings
pub fn security_settings() -> Arc<SecuritySettings> {
    SETTINGS.snapshot()
}

/// Replace the live settings with the defaults overlaid by `overrides`
pub fn configure_security(overrides: SecurityOverrides) {
    let settings = overrides.into_settings();
    info!(
        blocked = settings.blocked_names.len(),
        allowed = settings.allowed_names.len(),
        enforce_allowlist = settings.enforce_allowlist,
        max_depth = settings.max_depth,
        "Security settings configured"
    );
    SETTINGS.replace(settings);
}

// =============================================================================
// CHECKS
// =============================================================================

impl SecuritySettings {
    fn is_blocked(&self, module: &str) -> bool {
        self.blocked_names.iter().any(|blocked| {
            !blocked.is_empty()
                && (module == blocked
                    || module
                        .strip_prefix(blocked.as_str())
                        .is_some_and(|rest| rest.starts_with('.')))
        })
    }

    /// Check that `member` of `module` may be resolved (`None` = the module
    /// itself)
    pub fn validate_import(&self, module: &str, member: Option<&str>) -> Result<(), SecurityError> {
        let blocked = || SecurityError::BlockedImport {
            module: module.to_string(),
            member: member.map(str::to_string),
        };

        if self.is_blocked(module) {
            debug!(module, ?member, "Import rejected by blocklist");
            return Err(blocked());
        }

        match self.allowed_names.get(module) {
            Some(None) => Ok(()),
            Some(Some(members)) => {
                let allowed = match member {
                    None => true,
                    Some(name) => members.contains(&None) || members.contains(&Some(name.to_string())),
                };
                if allowed {
                    Ok(())
                } else {
                    debug!(module, ?member, "Import rejected by allowlist");
                    Err(blocked())
                }
            }
            None if self.enforce_allowlist => {
                debug!(module, ?member, "Import rejected: module not on allowlist");
                Err(blocked())
            }
            None => Ok(()),
        }
    }

    /// Check every dot-separated segment of `attribute`
    pub fn validate_attribute(&self, owner: &str, attribute: &str) -> Result<(), SecurityError> {
        let mut end = 0;
        for (index, segment) in attribute.split('.').enumerate() {
            end += segment.len() + usize::from(index > 0);
            let prefix = &attribute[..end];
            let invalid = || SecurityError::InvalidAttribute {
                owner: owner.to_string(),
                attribute: prefix.to_string(),
            };
            let blocked = || SecurityError::BlockedAttribute {
                owner: owner.to_string(),
                attribute: prefix.to_string(),
            };

            if !is_identifier(segment) {
                return Err(invalid());
            }
            if self.ascii_only && !segment.is_ascii() {
                return Err(invalid());
            }
            if self.reserved_attributes.contains(segment) {
                debug!(owner, attribute = prefix, "Reserved attribute rejected");
                return Err(blocked());
            }
            let is_dunder = segment.len() > 4 && segment.starts_with("__") && segment.ends_with("__");
            let is_private = segment.starts_with("__") && !is_dunder;
            let is_protected = segment.starts_with('_') && !segment.starts_with("__");
            if (self.block_private && is_private) || (self.block_protected && is_protected) {
                debug!(owner, attribute = prefix, "Non-public attribute rejected");
                return Err(blocked());
            }
        }
        Ok(())
    }

    /// Resolve `path` to an existing canonical path the settings permit
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SecurityError> {
        let path = path.as_ref();
        let mut candidate = path.canonicalize().ok();
        if candidate.is_none() && path.is_relative() {
            candidate = self
                .allowed_directories
                .iter()
                .find_map(|dir| dir.join(path).canonicalize().ok());
        }
        let Some(candidate) = candidate else {
            return Err(SecurityError::PathNotFound {
                path: path.to_path_buf(),
            });
        };
        let violation = || SecurityError::PathViolation {
            path: path.to_path_buf(),
        };

        if self.reject_hidden_paths && has_hidden_component(&candidate) {
            debug!(path = %path.display(), "Hidden path rejected");
            return Err(violation());
        }

        if self.require_working_dir_containment {
            let inside_cwd = std::env::current_dir()
                .and_then(|cwd| cwd.canonicalize())
                .is_ok_and(|cwd| candidate.starts_with(cwd));
            let inside_allowed = self
                .allowed_directories
                .iter()
                .filter_map(|dir| dir.canonicalize().ok())
                .any(|dir| candidate.starts_with(dir));
            if !inside_cwd && !inside_allowed {
                debug!(path = %path.display(), "Path outside allowed roots rejected");
                return Err(violation());
            }
        }

        Ok(candidate)
    }

    /// Depth and wall-clock bound shared by every recursive component
    pub fn guard_recursion(&self, depth: usize, start: Instant) -> Result<(), SecurityError> {
        if depth > self.max_depth {
            return Err(SecurityError::DepthExceeded {
                depth,
                max: self.max_depth,
            });
        }
        let elapsed = start.elapsed();
        if elapsed > self.max_duration {
            return Err(SecurityError::Timeout {
                elapsed,
                max: self.max_duration,
            });
        }
        Ok(())
    }

    /// Whether `path` carries one of the accepted module file extensions
    pub fn is_module_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.module_file_extensions.contains(&ext.to_ascii_lowercase()))
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_alphabetic() => {
            chars.all(|c| c == '_' || c.is_alphanumeric())
        }
        _ => false,
    }
}

fn has_hidden_component(path: &Path) -> bool {
    path.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

// =============================================================================
// FREE FUNCTIONS OVER THE LIVE SETTINGS
// =============================================================================

pub fn validate_import(module: &str, member: Option<&str>) -> Result<(), SecurityError> {
    security_settings().validate_import(module, member)
}

pub fn validate_attribute(owner: &str, attribute: &str) -> Result<(), SecurityError> {
    security_settings().validate_attribute(owner, attribute)
}

pub fn validate_path(path: impl AsRef<Path>) -> Result<PathBuf, SecurityError> {
    security_settings().validate_path(path)
}

pub fn guard_recursion(depth: usize, start: Instant) -> Result<(), SecurityError> {
    security_settings().guard_recursion(depth, start)
}
