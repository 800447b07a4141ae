//! Resolver configuration (profile file)
//!
//! ```toml
//! [options.liba]
//! shared = "True"
//!
//! [[build_requires]]
//! pattern = "*"
//! refs = ["cmake/3.20"]
//!
//! [resolver]
//! allow_missing = false
//! build_context = true
//! parallel_lookups = true
//! max_depth = 64
//!
//! [build]
//! mode = ["missing"]
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::validation::validate_config;
use crate::dependency::profile::BuildRequirePattern;
use crate::dependency::recipe::PackageOptions;

/// Everything a resolution call needs besides its collaborators
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Option values per package name, applied before any recipe value
    pub options: PackageOptions,

    /// Profile build-require patterns, in declaration order
    pub build_requires: Vec<BuildRequirePattern>,

    pub resolver: ResolverSettings,

    pub build: BuildSettings,
}

/// `[resolver]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Drop requirements whose recipe cannot be found instead of failing
    pub allow_missing: bool,

    /// Expand build-requires in the build context
    pub build_context: bool,

    /// Look up the requirements of one node in parallel
    pub parallel_lookups: bool,

    /// Maximum length of an ancestor chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
}

/// `[build]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Build mode entries, same syntax as `--build`
    pub mode: Vec<String>,
}

impl ResolverConfig {
    /// Load configuration from a profile file
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile from {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("Invalid profile {}", path.display()))
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse profile")?;
        validate_config(&config)?;
        Ok(config)
    }

    pub fn allow_missing(&self) -> bool {
        self.resolver.allow_missing
    }

    pub fn build_context(&self) -> bool {
        self.resolver.build_context
    }

    pub fn parallel_lookups(&self) -> bool {
        self.resolver.parallel_lookups
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.resolver.max_depth
    }
}
