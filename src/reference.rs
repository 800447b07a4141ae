//! Package and binary references
//!
//! A package reference names one recipe: `name/version[@user/channel][#revision]`.
//! A binary reference names one built configuration of it:
//! `name/version[@user/channel][#revision]:package_id[#binary_revision]`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

fn name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9_+.-]{1,50}$").ok())
        .as_ref()
}

fn version_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9_+.-]{0,50}$").ok())
        .as_ref()
}

fn revision_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9]{1,64}$").ok())
        .as_ref()
}

/// Whether `text` matches the pattern; an unavailable pattern matches nothing
fn pattern_matches(pattern: Option<&Regex>, text: &str) -> bool {
    pattern.is_some_and(|re| re.is_match(text))
}

/// Identifier of one recipe
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageReference {
    name: String,
    version: String,
    user: Option<String>,
    channel: Option<String>,
    revision: Option<String>,
}

impl PackageReference {
    /// Create a reference with just name and version
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            user: None,
            channel: None,
            revision: None,
        }
    }

    /// Parse textual reference
    pub fn parse(text: &str) -> Result<Self> {
        let input = text.trim();
        if input.is_empty() {
            return Err(GraphError::malformed(text, "empty reference"));
        }

        let (main, revision) = match input.split_once('#') {
            Some((main, rev)) => {
                if !pattern_matches(revision_pattern(), rev) {
                    return Err(GraphError::malformed(text, "invalid revision"));
                }
                (main, Some(rev.to_string()))
            }
            None => (input, None),
        };

        let (name_version, user_channel) = match main.split_once('@') {
            Some((nv, uc)) => (nv, Some(uc)),
            None => (main, None),
        };

        let (name, version) = name_version
            .split_once('/')
            .ok_or_else(|| GraphError::malformed(text, "expected 'name/version'"))?;
        if name.is_empty() {
            return Err(GraphError::malformed(text, "missing name"));
        }
        if version.is_empty() {
            return Err(GraphError::malformed(text, "missing version"));
        }
        if version.contains('/') {
            return Err(GraphError::malformed(text, "too many '/' separators"));
        }
        if !pattern_matches(name_pattern(), name) {
            return Err(GraphError::malformed(
                text,
                format!("invalid name '{}'", name),
            ));
        }
        let is_range = version.starts_with('[');
        if is_range {
            if !version.ends_with(']') || version.len() < 3 {
                return Err(GraphError::malformed(text, "unterminated version range"));
            }
        } else if !pattern_matches(version_pattern(), version) {
            return Err(GraphError::malformed(
                text,
                format!("invalid version '{}'", version),
            ));
        }

        let (user, channel) = match user_channel {
            None | Some("") => (None, None),
            Some(uc) => {
                let (user, channel) = uc
                    .split_once('/')
                    .ok_or_else(|| GraphError::malformed(text, "expected '@user/channel'"))?;
                for (field, value) in [("user", user), ("channel", channel)] {
                    if !pattern_matches(name_pattern(), value) {
                        return Err(GraphError::malformed(
                            text,
                            format!("invalid {} '{}'", field, value),
                        ));
                    }
                }
                (Some(user.to_string()), Some(channel.to_string()))
            }
        };

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
            user,
            channel,
            revision,
        })
    }

    /// Set user and channel
    pub fn with_user_channel(mut self, user: impl Into<String>, channel: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.channel = Some(channel.into());
        self
    }

    /// Set the recipe revision
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Replace the version, keeping user/channel
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            revision: None,
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Whether the version field is a `[...]` range expression
    pub fn is_range(&self) -> bool {
        self.version.starts_with('[')
    }

    /// The range expression without brackets
    pub fn range_expression(&self) -> Option<&str> {
        if self.is_range() {
            self.version
                .strip_prefix('[')
                .and_then(|v| v.strip_suffix(']'))
        } else {
            None
        }
    }

    /// Copy of this reference without revision
    pub fn cleared(&self) -> Self {
        Self {
            revision: None,
            ..self.clone()
        }
    }

    /// Recipe identity comparison: a missing revision on either side matches any revision
    pub fn matches_recipe(&self, other: &Self) -> bool {
        self.name == other.name
            && self.version == other.version
            && self.user == other.user
            && self.channel == other.channel
            && match (&self.revision, &other.revision) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }

    /// Same user and channel
    pub fn same_namespace(&self, other: &Self) -> bool {
        self.user == other.user && self.channel == other.channel
    }
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    match (crate::dependency::version::coerce(a), crate::dependency::version::coerce(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

impl Ord for PackageReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| compare_versions(&self.version, &other.version))
            .then_with(|| self.user.cmp(&other.user))
            .then_with(|| self.channel.cmp(&other.channel))
            .then_with(|| self.revision.cmp(&other.revision))
    }
}

impl PartialOrd for PackageReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)?;
        if let (Some(user), Some(channel)) = (&self.user, &self.channel) {
            write!(f, "@{}/{}", user, channel)?;
        }
        if let Some(rev) = &self.revision {
            write!(f, "#{}", rev)?;
        }
        Ok(())
    }
}

impl FromStr for PackageReference {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PackageReference {
    type Error = GraphError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PackageReference> for String {
    fn from(reference: PackageReference) -> Self {
        reference.to_string()
    }
}

/// Identifier of one built configuration of a recipe
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BinaryReference {
    pub reference: PackageReference,
    pub package_id: String,
    pub revision: Option<String>,
}

impl BinaryReference {
    pub fn new(reference: PackageReference, package_id: impl Into<String>) -> Self {
        Self {
            reference,
            package_id: package_id.into(),
            revision: None,
        }
    }

    /// Set the binary revision
    pub fn with_revision(mut self, revision: Option<String>) -> Self {
        self.revision = revision;
        self
    }

    /// Copy without binary revision, the key used by the evaluated cache
    pub fn cleared(&self) -> Self {
        Self {
            revision: None,
            ..self.clone()
        }
    }

    /// Parse `reference:package_id[#binary_revision]`
    pub fn parse(text: &str) -> Result<Self> {
        let (reference, binary) = text
            .trim()
            .split_once(':')
            .ok_or_else(|| GraphError::malformed(text, "expected 'reference:package_id'"))?;
        let reference = PackageReference::parse(reference)?;
        let (package_id, revision) = match binary.split_once('#') {
            Some((id, rev)) => (id, Some(rev.to_string())),
            None => (binary, None),
        };
        if package_id.is_empty() {
            return Err(GraphError::malformed(text, "missing package id"));
        }
        Ok(Self {
            reference,
            package_id: package_id.to_string(),
            revision,
        })
    }
}

impl fmt::Display for BinaryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.reference, self.package_id)?;
        if let Some(rev) = &self.revision {
            write!(f, "#{}", rev)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_round_trip() {
        for text in ["libb/0.1@user/testing", "pkg/1.0", "pkg/1.0#abcd1234"] {
            let reference = PackageReference::parse(text).unwrap();
            assert_eq!(reference.to_string(), text);
        }
    }

    #[test]
    fn test_parse_fields() {
        let r = PackageReference::parse("zlib/1.2.13@acme/stable#rev1").unwrap();
        assert_eq!(r.name(), "zlib");
        assert_eq!(r.version(), "1.2.13");
        assert_eq!(r.user(), Some("acme"));
        assert_eq!(r.channel(), Some("stable"));
        assert_eq!(r.revision(), Some("rev1"));
    }

    #[test]
    fn test_builder_methods() {
        let r = PackageReference::parse("zlib/1.2.13")
            .unwrap()
            .with_user_channel("acme", "stable")
            .with_revision("rev1");
        assert_eq!(r.to_string(), "zlib/1.2.13@acme/stable#rev1");
        assert_eq!(r.cleared().to_string(), "zlib/1.2.13@acme/stable");
    }

    #[test]
    fn test_unavailable_pattern_matches_nothing() {
        assert!(pattern_matches(name_pattern(), "zlib"));
        assert!(!pattern_matches(None, "zlib"));
    }

    #[test]
    fn test_trailing_at_means_no_namespace() {
        let r = PackageReference::parse("app/0.1@").unwrap();
        assert_eq!(r.user(), None);
        assert_eq!(r.to_string(), "app/0.1");
    }

    #[test]
    fn test_malformed_references() {
        for text in [
            "",
            "zlib",
            "/1.0",
            "zlib/",
            "zlib/1.0/extra",
            "zlib/1.0@user",
            "zlib/1.0@user/",
            "zlib/1.0#",
            "z/1.0",
            "zlib/[>1.0",
        ] {
            let err = PackageReference::parse(text).unwrap_err();
            assert!(
                matches!(err, GraphError::MalformedReference { .. }),
                "{} should be malformed",
                text
            );
        }
    }

    #[test]
    fn test_range_reference() {
        let r = PackageReference::parse("liba/[>0.1 <1.0]@user/testing").unwrap();
        assert!(r.is_range());
        assert_eq!(r.range_expression(), Some(">0.1 <1.0"));
    }

    #[test]
    fn test_cleared_and_recipe_match() {
        let with_rev = PackageReference::parse("pkg/1.0#abcd1234").unwrap();
        let without = PackageReference::parse("pkg/1.0").unwrap();
        assert_ne!(with_rev, without);
        assert_eq!(with_rev.cleared(), without);
        assert!(without.matches_recipe(&with_rev));
        assert!(!PackageReference::parse("pkg/1.0#other")
            .unwrap()
            .matches_recipe(&with_rev));
    }

    #[test]
    fn test_version_ordering_is_numeric() {
        let a = PackageReference::new("pkg", "0.9");
        let b = PackageReference::new("pkg", "0.10");
        assert!(a < b);
        let c = PackageReference::new("abc", "9.0");
        assert!(c < a);
    }

    #[test]
    fn test_binary_reference() {
        let pref = BinaryReference::parse("pkg/1.0#rev:abc123#prev1").unwrap();
        assert_eq!(pref.reference.to_string(), "pkg/1.0#rev");
        assert_eq!(pref.package_id, "abc123");
        assert_eq!(pref.revision.as_deref(), Some("prev1"));
        assert_eq!(pref.to_string(), "pkg/1.0#rev:abc123#prev1");
        assert_eq!(pref.cleared().to_string(), "pkg/1.0#rev:abc123");
        assert!(BinaryReference::parse("pkg/1.0").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let r: PackageReference = serde_json::from_str("\"tool/0.1@user/testing\"").unwrap();
        assert_eq!(r.name(), "tool");
        assert_eq!(serde_json::to_string(&r).unwrap(), "\"tool/0.1@user/testing\"");
    }
}
