//! Requirement declarations and downstream overrides
//!
//! A recipe declares its requirements in order. Before they are expanded, the
//! requirements coming from further down the graph (closer to the root) are
//! applied: a downstream requirement for the same name replaces the upstream
//! reference. This is what lets a root package fix the version of a transitive
//! dependency to break a conflict.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::reference::PackageReference;

/// One declared requirement of a recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RequirementSpec")]
pub struct Requirement {
    #[serde(rename = "ref")]
    pub reference: PackageReference,

    /// Not propagated to the dependants of the requirer
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub private: bool,

    /// Needed only to build the requirer
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub build_require: bool,

    /// Only overrides upstream requirements, never creates an edge
    #[serde(rename = "override", default, skip_serializing_if = "std::ops::Not::not")]
    pub override_only: bool,
}

impl Requirement {
    /// A plain public requirement
    pub fn new(reference: PackageReference) -> Self {
        Self {
            reference,
            private: false,
            build_require: false,
            override_only: false,
        }
    }

    pub fn private(reference: PackageReference) -> Self {
        Self {
            private: true,
            ..Self::new(reference)
        }
    }

    pub fn build(reference: PackageReference) -> Self {
        Self {
            build_require: true,
            ..Self::new(reference)
        }
    }

    pub fn overriding(reference: PackageReference) -> Self {
        Self {
            override_only: true,
            ..Self::new(reference)
        }
    }

    pub fn name(&self) -> &str {
        self.reference.name()
    }

    /// Neither private nor build-require
    pub fn is_public(&self) -> bool {
        !self.private && !self.build_require
    }
}

/// Accepted forms in recipe files: `"liba/0.1"` or `{ ref = "liba/0.1", private = true }`
#[derive(Deserialize)]
#[serde(untagged)]
enum RequirementSpec {
    Simple(PackageReference),
    Detailed {
        #[serde(rename = "ref")]
        reference: PackageReference,
        #[serde(default)]
        private: bool,
        #[serde(default)]
        build_require: bool,
        #[serde(rename = "override", default)]
        override_only: bool,
    },
}

impl From<RequirementSpec> for Requirement {
    fn from(entry: RequirementSpec) -> Self {
        match entry {
            RequirementSpec::Simple(reference) => Requirement::new(reference),
            RequirementSpec::Detailed {
                reference,
                private,
                build_require,
                override_only,
            } => Requirement {
                reference,
                private,
                build_require,
                override_only,
            },
        }
    }
}

/// Ordered set of requirements keyed by package name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
    items: IndexMap<String, Requirement>,
}

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a requirement; a later requirement with the same name replaces the earlier one
    pub fn add(&mut self, requirement: Requirement) {
        self.items
            .insert(requirement.name().to_string(), requirement);
    }

    pub fn get(&self, name: &str) -> Option<&Requirement> {
        self.items.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Apply the downstream requirements to this set.
    ///
    /// Every non-private requirement whose name appears in `downstream` is
    /// rewritten to the downstream reference. Returns the requirement set to
    /// hand to the children: the downstream set without `owner`, extended with
    /// this node's own non-private requirements.
    pub fn apply_overrides(&mut self, downstream: &Requirements, owner: Option<&str>) -> Requirements {
        let mut passed = downstream.clone();
        if let Some(owner) = owner {
            passed.items.shift_remove(owner);
        }

        for (name, requirement) in self.items.iter_mut() {
            if requirement.private {
                continue;
            }
            if let Some(down) = downstream.get(name) {
                if down.reference != requirement.reference {
                    warn!(
                        "{} requirement {} overridden by downstream to {}",
                        owner.unwrap_or("consumer"),
                        requirement.reference,
                        down.reference
                    );
                    requirement.reference = down.reference.clone();
                }
            }
            // Downstream entries keep their position and flags
            if !passed.items.contains_key(name) {
                passed.items.insert(name.clone(), requirement.clone());
            }
        }

        passed
    }
}

impl FromIterator<Requirement> for Requirements {
    fn from_iter<I: IntoIterator<Item = Requirement>>(iter: I) -> Self {
        let mut requirements = Requirements::new();
        for requirement in iter {
            requirements.add(requirement);
        }
        requirements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(text: &str) -> Requirement {
        Requirement::new(PackageReference::parse(text).unwrap())
    }

    #[test]
    fn test_override_rewrites_reference() {
        let mut own: Requirements = [req("liba/0.1"), req("zlib/1.2")].into_iter().collect();
        let downstream: Requirements = [req("liba/0.2")].into_iter().collect();

        let passed = own.apply_overrides(&downstream, Some("libb"));

        assert_eq!(own.get("liba").unwrap().reference.to_string(), "liba/0.2");
        assert_eq!(own.get("zlib").unwrap().reference.to_string(), "zlib/1.2");
        assert_eq!(passed.get("liba").unwrap().reference.to_string(), "liba/0.2");
        assert!(passed.get("zlib").is_some());
    }

    #[test]
    fn test_private_requirements_are_not_overridden_nor_passed() {
        let mut own: Requirements = [Requirement::private(
            PackageReference::parse("liba/0.1").unwrap(),
        )]
        .into_iter()
        .collect();
        let downstream: Requirements = [req("liba/0.2")].into_iter().collect();

        let passed = own.apply_overrides(&Requirements::new(), None);
        assert!(passed.is_empty());

        own.apply_overrides(&downstream, None);
        assert_eq!(own.get("liba").unwrap().reference.to_string(), "liba/0.1");
    }

    #[test]
    fn test_owner_is_removed_from_passed_set() {
        let mut own = Requirements::new();
        let downstream: Requirements = [req("libb/0.1"), req("liba/0.1")].into_iter().collect();
        let passed = own.apply_overrides(&downstream, Some("libb"));
        assert!(passed.get("libb").is_none());
        assert!(passed.get("liba").is_some());
    }

    #[test]
    fn test_deserialize_both_forms() {
        #[derive(Deserialize)]
        struct Doc {
            requires: Vec<Requirement>,
        }
        let doc: Doc = toml::from_str(
            r#"requires = ["liba/0.1", { ref = "libb/0.1", private = true }, { ref = "libc/1.0", override = true }]"#,
        )
        .unwrap();
        assert_eq!(doc.requires.len(), 3);
        assert!(!doc.requires[0].private);
        assert!(doc.requires[1].private);
        assert!(doc.requires[2].override_only);
    }
}
