//! Error types for graph resolution
//!
//! Structural errors (malformed references, conflicts, loops) abort a whole
//! resolution. Per-node binary problems are recorded on the node and only turn
//! into `InvalidPackages` / `MissingPackages` when a planner needs the binary.

use thiserror::Error;

/// Result alias used across the library
pub type Result<T, E = GraphError> = std::result::Result<T, E>;

/// Errors raised while resolving or planning a dependency graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Reference text could not be parsed
    #[error("Malformed reference '{input}': {reason}")]
    MalformedReference { input: String, reason: String },

    /// The recipe lookup did not find a recipe
    #[error("Unable to find '{reference}'{}", requirer_suffix(.requirer))]
    RecipeNotFound {
        reference: String,
        requirer: Option<String>,
    },

    /// No available version satisfies a range
    #[error("Version range '{range}' from requirement '{reference}' could not be resolved (candidates: {})", format_candidates(.candidates))]
    RangeNotSatisfiable {
        reference: String,
        range: String,
        candidates: Vec<String>,
    },

    /// Two requirements disagree on one name inside a propagation scope
    #[error(
        "Conflict in {consumer}:\n    '{consumer}' requires '{requested}' while '{previous_requirer}' requires '{previous}'.\n    To fix this conflict you need to override the package '{name}' in your root package."
    )]
    VersionConflict {
        name: String,
        consumer: String,
        requested: String,
        previous_requirer: String,
        previous: String,
    },

    /// The same reference is required with two different revisions
    #[error(
        "Conflict in {consumer}:\n    '{consumer}' requires '{requested}' while '{previous_requirer}' requires '{previous}'.\n    Different revisions of '{name}' have been requested."
    )]
    RevisionConflict {
        name: String,
        consumer: String,
        requested: String,
        previous_requirer: String,
        previous: String,
    },

    /// A requirement closes a cycle
    #[error("Loop detected in context {context}: '{requirer}' requires '{required}' which is an ancestor too")]
    DependencyLoop {
        context: String,
        requirer: String,
        required: String,
    },

    /// Alias recipes point at each other
    #[error("Alias loop detected: {}", .chain.join(" -> "))]
    AliasLoop { chain: Vec<String> },

    /// A consumer tried to set an option that was already fixed upstream
    #[error("{consumer} tried to change {reference} option {option} to {requested} but it was already defined as {existing}")]
    OptionConflict {
        consumer: String,
        reference: String,
        option: String,
        requested: String,
        existing: String,
    },

    /// Ancestor chain longer than the configured limit
    #[error("Maximum dependency depth ({max_depth}) exceeded at '{reference}'")]
    MaxDepthExceeded { reference: String, max_depth: usize },

    /// A recipe rejected its own configuration
    #[error("{reference}: Invalid ID: {message}")]
    InvalidConfiguration { reference: String, message: String },

    /// A planner needed binaries of invalid nodes
    #[error("There are invalid packages (packages that cannot exist for this configuration):\n{}", format_lines(.packages))]
    InvalidPackages { packages: Vec<String> },

    /// A planner needed binaries that are neither available nor buildable
    #[error("Missing prebuilt package for '{}'", .packages.join("', '"))]
    MissingPackages { packages: Vec<String> },

    /// The configuration id of a node was assigned twice
    #[error("Trying to override an existing package_id of {reference}: '{existing}' -> '{attempted}'")]
    DuplicateAssignment {
        reference: String,
        existing: String,
        attempted: String,
    },

    /// A binary reference was requested from a node that was never evaluated
    #[error("Node {reference} has no package id yet, evaluate the graph first")]
    Unevaluated { reference: String },
}

fn requirer_suffix(requirer: &Option<String>) -> String {
    match requirer {
        Some(r) => format!(" required by '{}'", r),
        None => String::new(),
    }
}

fn format_candidates(candidates: &[String]) -> String {
    if candidates.is_empty() {
        "none".to_string()
    } else {
        candidates.join(", ")
    }
}

fn format_lines(lines: &[String]) -> String {
    lines
        .iter()
        .map(|l| format!("    {}", l))
        .collect::<Vec<_>>()
        .join("\n")
}

impl GraphError {
    /// Create a malformed reference error
    pub fn malformed(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedReference {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create a recipe-not-found error
    pub fn not_found(reference: impl Into<String>) -> Self {
        Self::RecipeNotFound {
            reference: reference.into(),
            requirer: None,
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reference: reference.into(),
            message: message.into(),
        }
    }

    /// Attach the requiring node to a lookup failure
    pub fn with_requirer(self, requirer: impl Into<String>) -> Self {
        match self {
            Self::RecipeNotFound {
                reference,
                requirer: None,
            } => Self::RecipeNotFound {
                reference,
                requirer: Some(requirer.into()),
            },
            other => other,
        }
    }

    /// Whether this error belongs to the class suppressed by `allow_missing`
    pub fn is_missing_recipe(&self) -> bool {
        matches!(
            self,
            Self::RecipeNotFound { .. } | Self::RangeNotSatisfiable { .. }
        )
    }

    /// Internal invariant violations, as opposed to user-facing conditions
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::DuplicateAssignment { .. } | Self::Unevaluated { .. })
    }

    /// Actionable hint for the error, if any
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MalformedReference { .. } => Some(hints::reference_format()),
            Self::RecipeNotFound { .. } | Self::RangeNotSatisfiable { .. } => {
                Some(hints::missing_recipe())
            }
            Self::VersionConflict { .. } | Self::RevisionConflict { .. } => {
                Some(hints::version_conflict())
            }
            Self::DependencyLoop { .. } | Self::AliasLoop { .. } => Some(hints::dependency_loop()),
            Self::InvalidPackages { .. } | Self::InvalidConfiguration { .. } => {
                Some(hints::invalid_configuration())
            }
            Self::MissingPackages { .. } => Some(hints::missing_binary()),
            _ => None,
        }
    }

    /// Display error with formatting and hints
    pub fn display_with_hints(&self) {
        use console::style;

        eprintln!("\n{} {}", style("ERROR:").red().bold(), self);
        if let Some(h) = self.hint() {
            eprintln!("\n{} {}", style("HINT:").yellow().bold(), h);
        }
        eprintln!();
    }
}

/// Common error hints
pub mod hints {
    /// Hint for malformed references
    pub fn reference_format() -> &'static str {
        "References use the form name/version[@user/channel][#revision], e.g.:\n\
         • zlib/1.2.13\n\
         • libb/0.1@user/testing\n\
         • pkg/1.0#abcd1234"
    }

    /// Hint for missing recipes or unsatisfiable ranges
    pub fn missing_recipe() -> &'static str {
        "Check that the recipe exists in the index and that the version range matches\n\
         at least one available version. Enable `allow_missing` in the [resolver]\n\
         section to continue with an incomplete graph."
    }

    /// Hint for version conflicts
    pub fn version_conflict() -> &'static str {
        "Add an explicit requirement for the conflicting package to the root\n\
         package; downstream requirements override upstream ones."
    }

    /// Hint for loops
    pub fn dependency_loop() -> &'static str {
        "A package cannot depend on itself, directly or transitively.\n\
         Review the requirements of the packages in the reported chain."
    }

    /// Hint for invalid configurations
    pub fn invalid_configuration() -> &'static str {
        "The recipe rejected the current options. Change the options in the profile\n\
         or provide a compatible binary."
    }

    /// Hint for missing binaries
    pub fn missing_binary() -> &'static str {
        "No binary is available for the current configuration. Use the build mode\n\
         'missing' to build it from sources."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message() {
        let err = GraphError::VersionConflict {
            name: "liba".to_string(),
            consumer: "libc/0.1".to_string(),
            requested: "liba/0.2".to_string(),
            previous_requirer: "libb/0.1".to_string(),
            previous: "liba/0.1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Conflict in libc/0.1:\n"));
        assert!(msg.contains("'libc/0.1' requires 'liba/0.2' while 'libb/0.1' requires 'liba/0.1'"));
        assert!(msg.contains("override the package 'liba'"));
    }

    #[test]
    fn test_with_requirer_only_touches_not_found() {
        let err = GraphError::not_found("zlib/1.0").with_requirer("app/1.0");
        assert_eq!(
            err.to_string(),
            "Unable to find 'zlib/1.0' required by 'app/1.0'"
        );

        let loop_err = GraphError::DependencyLoop {
            context: "host".to_string(),
            requirer: "a/1".to_string(),
            required: "b/1".to_string(),
        };
        assert_eq!(loop_err.clone().with_requirer("x"), loop_err);
    }

    #[test]
    fn test_missing_recipe_class() {
        assert!(GraphError::not_found("a/1").is_missing_recipe());
        assert!(GraphError::RangeNotSatisfiable {
            reference: "a/[>1]".to_string(),
            range: ">1".to_string(),
            candidates: vec![],
        }
        .is_missing_recipe());
        assert!(!GraphError::malformed("x", "y").is_missing_recipe());
    }

    #[test]
    fn test_internal_class_has_no_hint() {
        let err = GraphError::DuplicateAssignment {
            reference: "a/1".to_string(),
            existing: "1".to_string(),
            attempted: "2".to_string(),
        };
        assert!(err.is_internal());
        assert!(err.hint().is_none());
    }
}
