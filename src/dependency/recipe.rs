//! Recipe payloads and the recipe lookup contract
//!
//! Recipes are never executed here: a [`Recipe`] is the already evaluated
//! description the lookup collaborator hands back (requirements, options,
//! alias target and validation rules).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dependency::node::RecipeStatus;
use crate::dependency::requirement::Requirement;
use crate::error::Result;
use crate::reference::PackageReference;

/// Option values keyed by option name
pub type OptionValues = BTreeMap<String, String>;

/// Option values for other packages, keyed by package name
pub type PackageOptions = BTreeMap<String, OptionValues>;

/// A configuration a recipe refuses to build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidRule {
    pub option: String,
    pub value: String,
    pub message: String,
}

/// Evaluated recipe description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipe {
    /// Ordered requirements
    pub requires: Vec<Requirement>,

    /// Tools needed only to build this package
    pub build_requires: Vec<PackageReference>,

    /// Default option values
    pub options: OptionValues,

    /// Option values this recipe sets for its dependencies
    pub dependency_options: PackageOptions,

    /// When set, this recipe only redirects to another reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<PackageReference>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invalid_configurations: Vec<InvalidRule>,
}

impl Recipe {
    /// Recipe that only holds a list of requirements
    pub fn with_requires(requires: Vec<Requirement>) -> Self {
        Self {
            requires,
            ..Self::default()
        }
    }

    /// Effective options: defaults overridden by the given values.
    /// Unknown option names in `overrides` are ignored.
    pub fn configure_options(&self, overrides: Option<&OptionValues>) -> OptionValues {
        let mut values = self.options.clone();
        if let Some(overrides) = overrides {
            for (name, value) in overrides {
                if let Some(slot) = values.get_mut(name) {
                    *slot = value.clone();
                }
            }
        }
        values
    }
}

/// Answer of a recipe lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecipe {
    /// Canonical reference, version ranges resolved and revision filled in
    pub reference: PackageReference,
    pub status: RecipeStatus,
    pub recipe: Recipe,
}

impl ResolvedRecipe {
    pub fn alias(&self) -> Option<&PackageReference> {
        self.recipe.alias.as_ref()
    }
}

/// Recipe lookup collaborator
///
/// `resolve` accepts exact references and version ranges. Implementations
/// fail with `GraphError::RecipeNotFound` or `GraphError::RangeNotSatisfiable`.
pub trait RecipeLookup: Send + Sync {
    fn resolve(&self, reference: &PackageReference) -> Result<ResolvedRecipe>;
}

impl<T: RecipeLookup + ?Sized> RecipeLookup for &T {
    fn resolve(&self, reference: &PackageReference) -> Result<ResolvedRecipe> {
        (**self).resolve(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_options_keeps_declared_names_only() {
        let recipe = Recipe {
            options: [("shared".to_string(), "False".to_string())]
                .into_iter()
                .collect(),
            ..Recipe::default()
        };
        let overrides: OptionValues = [
            ("shared".to_string(), "True".to_string()),
            ("fPIC".to_string(), "True".to_string()),
        ]
        .into_iter()
        .collect();

        let values = recipe.configure_options(Some(&overrides));
        assert_eq!(values.get("shared").map(String::as_str), Some("True"));
        assert!(!values.contains_key("fPIC"));
    }

    #[test]
    fn test_recipe_from_toml() {
        let recipe: Recipe = toml::from_str(
            r#"
            requires = ["liba/0.1", { ref = "libc/0.1", private = true }]
            build_requires = ["tool/0.1"]

            [options]
            shared = "False"

            [dependency_options.liba]
            shared = "True"
            "#,
        )
        .unwrap();
        assert_eq!(recipe.requires.len(), 2);
        assert_eq!(recipe.build_requires[0].to_string(), "tool/0.1");
        assert_eq!(recipe.dependency_options["liba"]["shared"], "True");
    }
}
