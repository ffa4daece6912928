//! Error types for the detection pipeline.
//!
//! [`DetectionError`] covers everything the library itself can reject:
//! bad restriction filters, invalid component identities, unknown graph
//! nodes and configuration problems. Detector bodies and the binary use
//! `anyhow` and convert into this type where a typed error is needed.

use std::path::PathBuf;

/// Errors raised by the component graph, restriction service and config loader.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    /// A detector id in the allow-list did not match any known detector.
    #[error("detector '{0}' was not found")]
    InvalidDetectorFilter(String),

    /// The category allow-list filtered out every detector.
    #[error("categories {} did not match any available detectors", .0.join(","))]
    InvalidDetectorCategories(Vec<String>),

    /// A single-file recorder was requested for an empty location.
    #[error("invalid manifest location: {0:?}")]
    InvalidLocation(String),

    /// A graph query referenced a component that was never registered.
    #[error("component '{0}' is not present in the dependency graph")]
    MissingNode(String),

    /// A component identity was missing a required field.
    #[error("property {field} of component type {component_type} is required")]
    InvalidComponent {
        /// Name of the missing field
        field: &'static str,
        /// Ecosystem of the component being built
        component_type: &'static str,
    },

    /// Configuration could not be loaded or is inconsistent.
    #[error("config error: {path}: {reason}")]
    Config {
        /// Path of the offending config file
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
