//! Profile build-require patterns
//!
//! A profile can inject build-requires into every node whose reference
//! matches a pattern:
//!
//! - `*` or any glob: matched against the node reference (`zlib/*`, `*@user/*`)
//! - `&`: only the package that owns the build-requires being expanded
//! - `&!`: every package except that one

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::reference::PackageReference;

/// One `[[build_requires]]` entry of a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequirePattern {
    pub pattern: String,
    pub refs: Vec<PackageReference>,
}

impl BuildRequirePattern {
    pub fn new(pattern: impl Into<String>, refs: Vec<PackageReference>) -> Self {
        Self {
            pattern: pattern.into(),
            refs,
        }
    }

    /// Check the pattern can be compiled
    pub fn validate(&self) -> Result<()> {
        if matches!(self.pattern.as_str(), "&" | "&!") {
            return Ok(());
        }
        Pattern::new(&self.pattern)
            .map(|_| ())
            .map_err(|e| GraphError::malformed(&self.pattern, format!("invalid pattern: {}", e)))
    }

    /// Whether the pattern selects a node. `is_root` tells if the node is the
    /// owner of the current build-require expansion.
    pub fn applies_to(&self, reference: Option<&PackageReference>, is_root: bool) -> bool {
        match self.pattern.as_str() {
            "&" => is_root,
            "&!" => !is_root,
            pattern => {
                let Some(reference) = reference else {
                    return pattern == "*";
                };
                match Pattern::new(pattern) {
                    Ok(glob) => glob.matches(&reference.cleared().to_string()),
                    Err(_) => false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(text: &str) -> BuildRequirePattern {
        BuildRequirePattern::new(text, vec![PackageReference::parse("tool/0.1").unwrap()])
    }

    fn reference(text: &str) -> PackageReference {
        PackageReference::parse(text).unwrap()
    }

    #[test]
    fn test_star_matches_everything() {
        let p = pattern("*");
        assert!(p.applies_to(Some(&reference("zlib/1.0")), false));
        assert!(p.applies_to(None, true));
    }

    #[test]
    fn test_glob_on_reference() {
        let p = pattern("lib*/0.*");
        assert!(p.applies_to(Some(&reference("liba/0.1")), false));
        assert!(!p.applies_to(Some(&reference("liba/1.0")), false));
        assert!(!p.applies_to(None, true));
    }

    #[test]
    fn test_root_markers() {
        let root_only = pattern("&");
        let not_root = pattern("&!");
        let r = reference("app/1.0");
        assert!(root_only.applies_to(Some(&r), true));
        assert!(!root_only.applies_to(Some(&r), false));
        assert!(not_root.applies_to(Some(&r), false));
        assert!(!not_root.applies_to(Some(&r), true));
    }

    #[test]
    fn test_glob_ignores_revision() {
        let p = pattern("liba/0.1");
        assert!(p.applies_to(Some(&reference("liba/0.1#abc123")), false));
    }

    #[test]
    fn test_invalid_glob() {
        assert!(pattern("[").validate().is_err());
        assert!(pattern("&!").validate().is_ok());
    }
}
