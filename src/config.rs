//! Configuration file loading
//!
//! One YAML (or JSON) document configures all three process-wide
//! settings groups:
//!
//! ```yaml
//! security:
//!   max_depth: 50
//!   allowed_directories: [/etc/structcast]
//! spec:
//!   raise_error: false
//! templates:
//!   default_group: base
//! ```
//!
//! Every section and field is optional; omitted fields keep their
//! defaults. The file path itself passes through the security gate's
//! path validation before it is read.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::Deserialize;
use tracing::info;

use crate::security::{self, configure_security, SecurityOverrides, SecuritySettings};
use crate::spec::{configure_spec, SpecOverrides};
use crate::template::{configure_templates, TemplateOverrides};

/// Environment variable naming a configuration file
pub const CONFIG_ENV_VAR: &str = "STRUCTCAST_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StructcastConfig {
    pub security: SecurityOverrides,
    pub spec: SpecOverrides,
    pub templates: TemplateOverrides,
}

impl StructcastConfig {
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        serde_yaml::from_str(source).context("Failed to parse structcast configuration")
    }

    /// Install every section process-wide
    pub fn apply(self) {
        configure_security(self.security);
        configure_spec(self.spec);
        configure_templates(self.templates);
        info!("Structcast configuration applied");
    }
}

/// Loads a [`StructcastConfig`] from a file
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loader for the file named by `STRUCTCAST_CONFIG`, if set
    pub fn from_env() -> Option<Self> {
        std::env::var_os(CONFIG_ENV_VAR)
            .filter(|value| !value.is_empty())
            .map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load using the live security settings for path validation
    pub fn load(&self) -> Result<StructcastConfig> {
        self.load_with(&security::security_settings())
    }

    pub fn load_with(&self, security: &SecuritySettings) -> Result<StructcastConfig> {
        let path = security
            .validate_path(&self.path)
            .with_context(|| format!("Configuration path rejected: {}", self.path.display()))?;

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let config: StructcastConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        info!("Loaded structcast configuration from {}", path.display());
        Ok(config)
    }

    /// Load and install in one step
    pub fn load_and_apply(&self) -> Result<()> {
        self.load()?.apply();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ReturnType;
    use std::io::Write;

    fn settings_for(dir: &Path) -> SecuritySettings {
        SecuritySettings {
            allowed_directories: vec![dir.to_path_buf()],
            ..Default::default()
        }
    }

    #[test]
    fn test_parses_partial_sections() {
        let config = StructcastConfig::from_yaml_str(
            "spec:\n  return_type: deep_copy\ntemplates:\n  strict: false\n",
        )
        .unwrap();
        assert_eq!(config.spec.return_type, Some(ReturnType::DeepCopy));
        assert_eq!(config.templates.strict, Some(false));
        assert!(config.security.max_depth.is_none());

        let empty = StructcastConfig::from_yaml_str("{}").unwrap();
        assert!(empty.spec.raise_error.is_none());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(StructcastConfig::from_yaml_str("spec:\n  raise_errors: true\n").is_err());
        assert!(StructcastConfig::from_yaml_str("logging: {}\n").is_err());
    }

    #[test]
    fn test_load_from_allowed_directory() {
        let dir = tempfile::Builder::new().prefix("structcast-").tempdir().unwrap();
        let path = dir.path().join("structcast.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "security:\n  max_depth: 42").unwrap();

        let config = ConfigLoader::new(&path).load_with(&settings_for(dir.path())).unwrap();
        assert_eq!(config.security.max_depth, Some(42));
    }

    #[test]
    fn test_load_errors_carry_path_context() {
        let dir = tempfile::Builder::new().prefix("structcast-").tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        let err = ConfigLoader::new(&missing)
            .load_with(&settings_for(dir.path()))
            .unwrap_err();
        assert!(err.to_string().contains("Configuration path rejected"));

        let broken = dir.path().join("broken.yaml");
        std::fs::write(&broken, "spec: [").unwrap();
        let err = ConfigLoader::new(&broken)
            .load_with(&settings_for(dir.path()))
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse"));
    }
}
