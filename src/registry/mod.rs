//! Recipe and binary sources
//!
//! The engine only talks to the [`RecipeLookup`](crate::dependency::recipe::RecipeLookup)
//! and [`BinaryStore`](crate::dependency::binaries::BinaryStore) traits. This
//! module provides the file-backed implementation used by the CLI and tests.

mod index;

pub use index::{BinaryEntry, EntryStatus, RecipeEntry, RecipeIndex};
