//! Core data types for components and scan results.
//!
//! - [`TypedComponent`] - The identity of a package in one ecosystem
//! - [`DetectedComponent`] - A component plus provenance that merges across files
//! - [`ProcessingResultCode`] - Outcome of a detector or a scan
//! - [`ScanResult`] - The final scan manifest
//!
//! # Example
//!
//! ```
//! use compscan::model::{DetectedComponent, NpmComponent};
//!
//! let detected = DetectedComponent::new(NpmComponent::new("lodash", "4.17.21").unwrap());
//! assert_eq!(detected.id(), "lodash 4.17.21 - Npm");
//! ```

mod component;
mod detected;
mod result;

pub use component::*;
pub use detected::*;
pub use result::*;
