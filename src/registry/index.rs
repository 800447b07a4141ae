//! File-backed recipe index
//!
//! A single TOML file describes the recipes known to the resolver and the
//! binaries available for them:
//!
//! ```toml
//! [[recipe]]
//! reference = "liba/1.0"
//! options = { shared = "False" }
//!
//! [[recipe]]
//! reference = "libb/1.0"
//! requires = ["liba/[>=1.0 <2.0]", { ref = "zlib/1.2", private = true }]
//! build_requires = ["cmake/3.20"]
//!
//! [[binary]]
//! reference = "liba/1.0"
//! location = "remote"
//! ```
//!
//! Recipes without an explicit revision get one derived from their content.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::dependency::binaries::{BinaryLocation, BinaryRecord, BinaryStore};
use crate::dependency::node::RecipeStatus;
use crate::dependency::recipe::{Recipe, RecipeLookup, ResolvedRecipe};
use crate::dependency::version::VersionRange;
use crate::error::GraphError;
use crate::reference::{BinaryReference, PackageReference};

/// Recipe status as written in the index file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    #[default]
    Cache,
    Downloaded,
    Updated,
    Editable,
}

impl From<EntryStatus> for RecipeStatus {
    fn from(status: EntryStatus) -> Self {
        match status {
            EntryStatus::Cache => RecipeStatus::Cache,
            EntryStatus::Downloaded => RecipeStatus::Downloaded,
            EntryStatus::Updated => RecipeStatus::Updated,
            EntryStatus::Editable => RecipeStatus::Editable,
        }
    }
}

/// One `[[recipe]]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeEntry {
    pub reference: PackageReference,

    #[serde(default)]
    pub status: EntryStatus,

    #[serde(flatten)]
    pub recipe: Recipe,
}

/// One `[[binary]]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryEntry {
    pub reference: PackageReference,

    /// Absent means any configuration of the reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,

    #[serde(default)]
    pub location: BinaryLocation,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    /// Offered as a replacement for other configurations of the reference
    #[serde(default)]
    pub compatible: bool,
}

impl BinaryEntry {
    fn serves(&self, pref: &BinaryReference) -> bool {
        if !self.reference.matches_recipe(&pref.reference) {
            return false;
        }
        match &self.package_id {
            Some(id) => *id == pref.package_id,
            None => !self.compatible,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    #[serde(default, rename = "recipe")]
    recipes: Vec<RecipeEntry>,

    #[serde(default, rename = "binary")]
    binaries: Vec<BinaryEntry>,
}

/// In-memory recipe index, usable as recipe lookup and binary store
#[derive(Debug, Clone, Default)]
pub struct RecipeIndex {
    recipes: Vec<RecipeEntry>,
    binaries: Vec<BinaryEntry>,
}

impl RecipeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an index from a TOML file
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read recipe index: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to load recipe index: {}", path.display()))
    }

    /// Parse an index from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let file: IndexFile = toml::from_str(content).context("Failed to parse recipe index")?;
        let mut index = Self::new();
        for entry in file.recipes {
            index.add_entry(entry);
        }
        index.binaries = file.binaries;
        Ok(index)
    }

    /// Register a recipe with the default status
    pub fn add_recipe(&mut self, reference: PackageReference, recipe: Recipe) -> &mut Self {
        self.add_entry(RecipeEntry {
            reference,
            status: EntryStatus::default(),
            recipe,
        });
        self
    }

    pub fn add_binary(&mut self, entry: BinaryEntry) -> &mut Self {
        self.binaries.push(entry);
        self
    }

    fn add_entry(&mut self, mut entry: RecipeEntry) {
        if entry.reference.revision().is_none() {
            let revision = content_revision(&entry);
            entry.reference = entry.reference.with_revision(revision);
        }
        self.recipes.push(entry);
    }

    pub fn recipes(&self) -> &[RecipeEntry] {
        &self.recipes
    }

    pub fn binaries(&self) -> &[BinaryEntry] {
        &self.binaries
    }

    /// Latest declared entry for an exact reference
    fn find_exact(&self, reference: &PackageReference) -> Option<&RecipeEntry> {
        self.recipes
            .iter()
            .rev()
            .find(|e| e.reference.matches_recipe(reference))
    }

    fn find_range(
        &self,
        reference: &PackageReference,
        expression: &str,
    ) -> crate::error::Result<&RecipeEntry> {
        let range = VersionRange::parse(expression)?;
        let candidates: Vec<&str> = self
            .recipes
            .iter()
            .filter(|e| {
                e.reference.name() == reference.name() && e.reference.same_namespace(reference)
            })
            .map(|e| e.reference.version())
            .collect();

        let Some(version) = range.best_match(candidates.iter().copied()) else {
            let mut candidates: Vec<String> = candidates.iter().map(|c| c.to_string()).collect();
            candidates.dedup();
            return Err(GraphError::RangeNotSatisfiable {
                reference: reference.to_string(),
                range: expression.to_string(),
                candidates,
            });
        };
        trace!("Range {} resolved to version {}", reference, version);

        let exact = reference.cleared().with_version(version);
        self.find_exact(&exact)
            .ok_or_else(|| GraphError::not_found(exact.to_string()))
    }
}

impl RecipeLookup for RecipeIndex {
    fn resolve(&self, reference: &PackageReference) -> crate::error::Result<ResolvedRecipe> {
        let entry = match reference.range_expression() {
            Some(expression) => self.find_range(reference, expression)?,
            None => self
                .find_exact(reference)
                .ok_or_else(|| GraphError::not_found(reference.to_string()))?,
        };
        Ok(ResolvedRecipe {
            reference: entry.reference.clone(),
            status: entry.status.into(),
            recipe: entry.recipe.clone(),
        })
    }
}

impl BinaryStore for RecipeIndex {
    fn find(&self, pref: &BinaryReference) -> Option<BinaryRecord> {
        self.binaries
            .iter()
            .rev()
            .find(|b| b.serves(pref))
            .map(|b| BinaryRecord {
                location: b.location,
                revision: b.revision.clone(),
            })
    }

    fn compatible_ids(&self, pref: &BinaryReference) -> Vec<String> {
        self.binaries
            .iter()
            .filter(|b| b.compatible && b.reference.matches_recipe(&pref.reference))
            .filter_map(|b| b.package_id.clone())
            .filter(|id| *id != pref.package_id)
            .collect()
    }
}

/// Revision derived from the serialized recipe
fn content_revision(entry: &RecipeEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry.reference.cleared().to_string().as_bytes());
    if let Ok(json) = serde_json::to_string(&entry.recipe) {
        hasher.update(json.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"
[[recipe]]
reference = "liba/1.0"
options = { shared = "False" }

[[recipe]]
reference = "liba/1.5"

[[recipe]]
reference = "liba/2.0"

[[recipe]]
reference = "libb/1.0#rev1"
status = "downloaded"
requires = ["liba/[>=1.0 <2.0]", { ref = "zlib/1.2", private = true }]
build_requires = ["cmake/3.20"]

[[binary]]
reference = "liba/1.5"
location = "remote"
revision = "bin1"

[[binary]]
reference = "libb/1.0"
package_id = "other"
compatible = true
"#;

    fn reference(text: &str) -> PackageReference {
        PackageReference::parse(text).unwrap()
    }

    #[test]
    fn test_parse_index() {
        let index = RecipeIndex::parse(INDEX).unwrap();
        assert_eq!(index.recipes().len(), 4);
        assert_eq!(index.binaries().len(), 2);

        let libb = &index.recipes()[3];
        assert_eq!(libb.status, EntryStatus::Downloaded);
        assert_eq!(libb.reference.revision(), Some("rev1"));
        assert_eq!(libb.recipe.requires.len(), 2);
        assert!(libb.recipe.requires[1].private);
        assert_eq!(libb.recipe.build_requires, vec![reference("cmake/3.20")]);
    }

    #[test]
    fn test_content_revision_is_stable() {
        let first = RecipeIndex::parse(INDEX).unwrap();
        let second = RecipeIndex::parse(INDEX).unwrap();
        let revision = first.recipes()[0].reference.revision().unwrap().to_string();
        assert_eq!(revision.len(), 32);
        assert_eq!(second.recipes()[0].reference.revision(), Some(revision.as_str()));
        assert_ne!(first.recipes()[1].reference.revision(), Some(revision.as_str()));
    }

    #[test]
    fn test_resolve_exact_and_range() {
        let index = RecipeIndex::parse(INDEX).unwrap();

        let exact = index.resolve(&reference("liba/1.0")).unwrap();
        assert_eq!(exact.reference.version(), "1.0");
        assert_eq!(exact.status, RecipeStatus::Cache);
        assert_eq!(exact.recipe.options["shared"], "False");

        let ranged = index.resolve(&reference("liba/[>=1.0 <2.0]")).unwrap();
        assert_eq!(ranged.reference.version(), "1.5");
    }

    #[test]
    fn test_resolve_failures() {
        let index = RecipeIndex::parse(INDEX).unwrap();

        assert_eq!(
            index.resolve(&reference("zlib/1.2")).unwrap_err(),
            GraphError::not_found("zlib/1.2")
        );
        assert!(matches!(
            index.resolve(&reference("liba/[>3.0]")).unwrap_err(),
            GraphError::RangeNotSatisfiable { candidates, .. } if candidates.len() == 3
        ));
        assert!(index.resolve(&reference("libb/1.0#rev2")).is_err());
    }

    #[test]
    fn test_build_index_in_code() {
        let mut index = RecipeIndex::new();
        index
            .add_recipe(reference("liba/1.0"), Recipe::default())
            .add_binary(BinaryEntry {
                reference: reference("liba/1.0"),
                package_id: None,
                location: BinaryLocation::Remote,
                revision: None,
                compatible: false,
            });

        let resolved = index.resolve(&reference("liba/1.0")).unwrap();
        assert!(resolved.reference.revision().is_some());
        assert_eq!(resolved.status, RecipeStatus::Cache);

        let pref = BinaryReference::new(resolved.reference, "abc");
        assert_eq!(index.find(&pref).unwrap().location, BinaryLocation::Remote);
    }

    #[test]
    fn test_binary_store() {
        let index = RecipeIndex::parse(INDEX).unwrap();
        let liba = BinaryReference::new(reference("liba/1.5"), "abc");
        let record = index.find(&liba).unwrap();
        assert_eq!(record.location, BinaryLocation::Remote);
        assert_eq!(record.revision.as_deref(), Some("bin1"));
        assert!(index.find(&BinaryReference::new(reference("liba/1.0"), "abc")).is_none());

        let libb = BinaryReference::new(reference("libb/1.0"), "abc");
        assert!(index.find(&libb).is_none());
        assert_eq!(index.compatible_ids(&libb), vec!["other".to_string()]);
        let other = BinaryReference::new(reference("libb/1.0"), "other");
        assert_eq!(index.find(&other).unwrap().location, BinaryLocation::Cache);
    }
}
