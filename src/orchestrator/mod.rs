//! Detector selection, execution and result assembly.
//!
//! A scan flows through four stages:
//!
//! 1. [`restriction`] narrows the detector registry by id, category and
//!    default-off status.
//! 2. [`processing`] runs every remaining detector concurrently, each with its
//!    own recorder, isolating failures and bounding experimental detectors in time.
//! 3. [`translation`] flattens the recorders into the final [`ScanResult`](crate::model::ScanResult).
//! 4. [`execution`] ties the stages together from [`DetectionArguments`].

pub mod execution;
pub mod processing;
pub mod restriction;
pub mod translation;

pub use execution::ScanExecutionService;
pub use processing::{DetectorProcessingResult, DetectorProcessingService, DetectorRunResult};
pub use restriction::{apply_restrictions, DetectorRestrictions};

use crate::model::DevDependencyMergeRule;
use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default time budget for experimental detectors.
pub const DEFAULT_EXPERIMENTAL_TIMEOUT: Duration = Duration::from_secs(4 * 60);

/// Default cap on per-detector file parallelism.
pub const DEFAULT_MAX_THREADS: usize = 5;

/// Everything that shapes one scan.
#[derive(Debug, Clone)]
pub struct DetectionArguments {
    pub source_directory: PathBuf,
    pub detector_args: BTreeMap<String, String>,
    pub directory_exclusion_list: Vec<String>,
    pub detector_categories: Vec<String>,
    pub detectors_filter: Vec<String>,
    pub max_threads: usize,
    pub experimental_timeout: Duration,
    pub dev_dependency_merge: DevDependencyMergeRule,
    /// Component id patterns removed from the final manifest.
    pub ignored_components: Vec<String>,
}

impl DetectionArguments {
    pub fn new(source_directory: impl Into<PathBuf>) -> Self {
        Self {
            source_directory: source_directory.into(),
            detector_args: BTreeMap::new(),
            directory_exclusion_list: Vec::new(),
            detector_categories: Vec::new(),
            detectors_filter: Vec::new(),
            max_threads: DEFAULT_MAX_THREADS,
            experimental_timeout: DEFAULT_EXPERIMENTAL_TIMEOUT,
            dev_dependency_merge: DevDependencyMergeRule::default(),
            ignored_components: Vec::new(),
        }
    }
}

/// Parses `Key=Value` detector arguments.
///
/// Later duplicates win. The value may itself contain `=`.
pub fn parse_detector_args<S: AsRef<str>>(args: &[S]) -> Result<BTreeMap<String, String>> {
    let mut parsed = BTreeMap::new();
    for arg in args {
        let arg = arg.as_ref();
        let Some((key, value)) = arg.split_once('=') else {
            bail!("Invalid detector argument '{}', expected Key=Value", arg);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid detector argument '{}', key is empty", arg);
        }
        parsed.insert(key.to_string(), value.trim().to_string());
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_detector_args() {
        let parsed = parse_detector_args(&["Pip=EnableIfDefaultOff", "Npm.Option=a=b"]).unwrap();
        assert_eq!(parsed["Pip"], "EnableIfDefaultOff");
        assert_eq!(parsed["Npm.Option"], "a=b");
    }

    #[test]
    fn test_parse_detector_args_rejects_malformed() {
        assert!(parse_detector_args(&["NoEquals"]).is_err());
        assert!(parse_detector_args(&["=Enable"]).is_err());
        assert!(parse_detector_args::<&str>(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_default_arguments() {
        let args = DetectionArguments::new("/src");
        assert_eq!(args.max_threads, 5);
        assert_eq!(args.experimental_timeout, Duration::from_secs(240));
        assert_eq!(args.dev_dependency_merge, DevDependencyMergeRule::ProductionWins);
    }
}
