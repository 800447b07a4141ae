//! Version range resolution using semantic versioning
//!
//! Range expressions are written inside brackets in a reference version field,
//! e.g. `liba/[>0.1 <1.0]`. Package versions are not always full semver, so
//! partial versions such as `0.1` or `2` are coerced to `0.1.0` / `2.0.0`
//! before comparison. Versions that cannot be coerced never match a range.

use std::fmt;

use semver::{Version, VersionReq};

use crate::error::{GraphError, Result};

/// Coerce a package version string into a semver version
pub fn coerce(version: &str) -> Option<Version> {
    let version = version.trim();
    if let Ok(v) = Version::parse(version) {
        return Some(v);
    }

    // Split pre-release/build suffix and pad the numeric part
    let split_at = version.find(|c| c == '-' || c == '+');
    let (numeric, suffix) = match split_at {
        Some(pos) => version.split_at(pos),
        None => (version, ""),
    };
    let parts: Vec<&str> = numeric.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    if parts
        .iter()
        .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }
    let mut padded: Vec<&str> = parts.clone();
    while padded.len() < 3 {
        padded.push("0");
    }
    Version::parse(&format!("{}{}", padded.join("."), suffix)).ok()
}

/// A parsed version range expression
#[derive(Debug, Clone)]
pub enum VersionRange {
    /// Any version (`*` or empty)
    Any,
    /// One or more alternatives joined with `||`
    Alternatives {
        requirements: Vec<VersionReq>,
        include_prerelease: bool,
    },
}

impl VersionRange {
    /// Parse a range expression (without the surrounding brackets)
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        if expression.is_empty() || expression == "*" {
            return Ok(Self::Any);
        }

        let mut include_prerelease = false;
        let mut requirements = Vec::new();
        for alternative in expression.split("||") {
            let mut comparators = Vec::new();
            for token in alternative
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
            {
                // Flags like `include_prerelease` or `loose=False`
                if token.starts_with(|c: char| c.is_ascii_alphabetic()) {
                    if token.starts_with("include_prerelease") {
                        include_prerelease = !token.ends_with("=False");
                    }
                    continue;
                }
                comparators.push(normalize_comparator(token));
            }
            if comparators.is_empty() {
                return Ok(Self::Any);
            }
            let joined = comparators.join(", ");
            let req = VersionReq::parse(&joined).map_err(|e| {
                GraphError::malformed(
                    format!("[{}]", expression),
                    format!("invalid version range: {}", e),
                )
            })?;
            requirements.push(req);
        }

        Ok(Self::Alternatives {
            requirements,
            include_prerelease,
        })
    }

    /// Check if a version string satisfies this range
    pub fn matches(&self, version: &str) -> bool {
        match self {
            Self::Any => coerce(version).map_or(true, |v| v.pre.is_empty()),
            Self::Alternatives {
                requirements,
                include_prerelease,
            } => {
                let Some(mut v) = coerce(version) else {
                    return false;
                };
                if *include_prerelease {
                    v.pre = semver::Prerelease::EMPTY;
                }
                requirements.iter().any(|req| req.matches(&v))
            }
        }
    }

    /// Pick the highest candidate satisfying this range
    pub fn best_match<'a, I>(&self, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter(|c| self.matches(c))
            .max_by(|a, b| match (coerce(a), coerce(b)) {
                (Some(va), Some(vb)) => va.cmp(&vb),
                _ => a.cmp(b),
            })
    }
}

/// Bare versions inside ranges mean exact matches, like `[1.2.3]`
fn normalize_comparator(token: &str) -> String {
    let is_bare = token.starts_with(|c: char| c.is_ascii_digit());
    let has_wildcard = token.contains('*') || token.contains(".x") || token.contains(".X");
    if is_bare && !has_wildcard {
        format!("={}", token)
    } else {
        token.to_string()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Alternatives { requirements, .. } => {
                let parts: Vec<String> = requirements.iter().map(|r| r.to_string()).collect();
                write!(f, "{}", parts.join(" || "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_partial_versions() {
        assert_eq!(coerce("0.1"), Some(Version::new(0, 1, 0)));
        assert_eq!(coerce("2"), Some(Version::new(2, 0, 0)));
        assert_eq!(coerce("1.2.3"), Some(Version::new(1, 2, 3)));
        assert!(coerce("1.2-beta").unwrap().pre.as_str() == "beta");
        assert_eq!(coerce("system"), None);
        assert_eq!(coerce("1.2.3.4"), None);
    }

    #[test]
    fn test_space_separated_range() {
        let range = VersionRange::parse(">0.1 <1.0").unwrap();
        assert!(range.matches("0.2"));
        assert!(range.matches("0.9.9"));
        assert!(!range.matches("0.1"));
        assert!(!range.matches("1.0"));
    }

    #[test]
    fn test_any_range() {
        let range = VersionRange::parse("*").unwrap();
        assert!(range.matches("3.4"));
        assert!(range.matches("system"));
        assert!(!range.matches("1.0-rc1"));
    }

    #[test]
    fn test_bare_version_is_exact() {
        let range = VersionRange::parse("1.2.3").unwrap();
        assert!(range.matches("1.2.3"));
        assert!(!range.matches("1.2.4"));
    }

    #[test]
    fn test_alternatives() {
        let range = VersionRange::parse("<1.0 || >=2.0").unwrap();
        assert!(range.matches("0.5"));
        assert!(!range.matches("1.5"));
        assert!(range.matches("2.1"));
    }

    #[test]
    fn test_prerelease_flag() {
        let strict = VersionRange::parse(">1.0").unwrap();
        assert!(!strict.matches("1.1-beta"));
        let loose = VersionRange::parse(">1.0, include_prerelease=True").unwrap();
        assert!(loose.matches("1.1-beta"));
    }

    #[test]
    fn test_best_match_picks_highest() {
        let range = VersionRange::parse("~1.2").unwrap();
        let candidates = ["1.1.0", "1.2.0", "1.2.7", "1.3.0"];
        assert_eq!(range.best_match(candidates.iter().copied()), Some("1.2.7"));

        let none = VersionRange::parse(">5").unwrap();
        assert_eq!(none.best_match(candidates.iter().copied()), None);
    }

    #[test]
    fn test_invalid_range() {
        assert!(VersionRange::parse(">>1.0").is_err());
    }
}
