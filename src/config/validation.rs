//! Profile validation with actionable messages
//!
//! Checks that cannot be expressed by deserialization alone: glob patterns
//! that compile, build mode entries, sane limits.

use anyhow::{bail, Context, Result};

use super::ResolverConfig;
use crate::dependency::binaries::BuildMode;

/// Validate the whole profile
pub fn validate_config(config: &ResolverConfig) -> Result<()> {
    for (index, entry) in config.build_requires.iter().enumerate() {
        entry
            .validate()
            .with_context(|| format!("Invalid [[build_requires]] entry #{}", index + 1))?;
        if entry.refs.is_empty() {
            bail!(
                "[[build_requires]] entry #{} (pattern '{}') has no refs\n\
                 Add at least one reference, e.g. refs = [\"cmake/3.20\"]",
                index + 1,
                entry.pattern
            );
        }
    }

    for (package, values) in &config.options {
        for name in values.keys() {
            if name.trim().is_empty() {
                bail!("Empty option name in [options.{}]", package);
            }
        }
    }

    if config.max_depth() == Some(0) {
        bail!("[resolver] max_depth must be at least 1");
    }

    BuildMode::parse(config.build.mode.as_slice()).context("Invalid [build] mode")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::profile::BuildRequirePattern;

    #[test]
    fn test_default_is_valid() {
        assert!(validate_config(&ResolverConfig::default()).is_ok());
    }

    #[test]
    fn test_pattern_without_refs() {
        let mut config = ResolverConfig::default();
        config
            .build_requires
            .push(BuildRequirePattern::new("*", Vec::new()));
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("has no refs"));
    }

    #[test]
    fn test_zero_depth() {
        let mut config = ResolverConfig::default();
        config.resolver.max_depth = Some(0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_conflicting_build_modes() {
        let mut config = ResolverConfig::default();
        config.build.mode = vec!["never".to_string(), "missing".to_string()];
        assert!(validate_config(&config).is_err());
    }
}
