//! Configuration loading
//!
//! The resolver is configured by an explicit [`ResolverConfig`] value, usually
//! loaded from a TOML profile.

pub mod resolver_config;
pub mod validation;

pub use resolver_config::{BuildSettings, ResolverConfig, ResolverSettings};
