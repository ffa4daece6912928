//! Component detectors.
//!
//! This module provides the [`Detector`] trait and the built-in detectors that
//! find components in manifest and lock files.
//!
//! # Available Detectors
//!
//! | Detector | Files | Category |
//! |----------|-------|----------|
//! | [`CargoDetector`] | `Cargo.lock` | Cargo |
//! | [`NpmDetector`] | `package-lock.json` | Npm |
//! | [`PipDetector`] | `*requirements.txt` | Pip |
//! | [`GoModDetector`] | `go.mod` | GoMod |
//!
//! # Example
//!
//! ```
//! use compscan::detector::{all_detectors, get_detector};
//!
//! assert_eq!(all_detectors().len(), 4);
//! assert_eq!(get_detector("npmwithroots").unwrap().id(), "NpmWithRoots");
//! ```

mod cargo;
pub mod files;
mod gomod;
mod npm;
mod pip;

pub use cargo::CargoDetector;
pub use gomod::GoModDetector;
pub use npm::NpmDetector;
pub use pip::PipDetector;

use crate::graph::recorder::ComponentRecorder;
use crate::model::{ComponentType, DetectorInfo, ProcessingResultCode};
use crate::pattern::DirectoryExclusion;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Ecosystem categories a detector can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DetectorClass {
    All,
    Npm,
    NuGet,
    Maven,
    RubyGems,
    Cargo,
    Pip,
    GoMod,
    CocoaPods,
    Linux,
    Conda,
    Spdx,
    Vcpkg,
    DockerReference,
    Swift,
}

impl DetectorClass {
    pub const ALL: [DetectorClass; 15] = [
        DetectorClass::All,
        DetectorClass::Npm,
        DetectorClass::NuGet,
        DetectorClass::Maven,
        DetectorClass::RubyGems,
        DetectorClass::Cargo,
        DetectorClass::Pip,
        DetectorClass::GoMod,
        DetectorClass::CocoaPods,
        DetectorClass::Linux,
        DetectorClass::Conda,
        DetectorClass::Spdx,
        DetectorClass::Vcpkg,
        DetectorClass::DockerReference,
        DetectorClass::Swift,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorClass::All => "All",
            DetectorClass::Npm => "Npm",
            DetectorClass::NuGet => "NuGet",
            DetectorClass::Maven => "Maven",
            DetectorClass::RubyGems => "RubyGems",
            DetectorClass::Cargo => "Cargo",
            DetectorClass::Pip => "Pip",
            DetectorClass::GoMod => "GoMod",
            DetectorClass::CocoaPods => "CocoaPods",
            DetectorClass::Linux => "Linux",
            DetectorClass::Conda => "Conda",
            DetectorClass::Spdx => "Spdx",
            DetectorClass::Vcpkg => "Vcpkg",
            DetectorClass::DockerReference => "DockerReference",
            DetectorClass::Swift => "Swift",
        }
    }

    /// Case-insensitive comparison against a category name from the command line.
    pub fn matches(&self, name: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(name)
    }
}

impl std::fmt::Display for DetectorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DetectorClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DetectorClass::ALL
            .iter()
            .find(|class| class.matches(s))
            .copied()
            .ok_or_else(|| format!("Unknown detector category: {}", s))
    }
}

/// Everything a detector needs for one run.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub source_directory: PathBuf,
    pub directory_exclusion: DirectoryExclusion,
    /// `Key=Value` arguments from the command line, keyed by the part before `=`.
    pub detector_args: BTreeMap<String, String>,
    pub component_recorder: Arc<ComponentRecorder>,
    pub max_threads: usize,
    /// Cancelled when the detector's time budget runs out.
    pub cancellation: CancellationToken,
}

impl ScanRequest {
    pub fn new(source_directory: impl Into<PathBuf>, component_recorder: Arc<ComponentRecorder>) -> Self {
        Self {
            source_directory: source_directory.into(),
            directory_exclusion: DirectoryExclusion::none(),
            detector_args: BTreeMap::new(),
            component_recorder,
            max_threads: 5,
            cancellation: CancellationToken::new(),
        }
    }
}

/// What a detector reports about its own run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndividualDetectorScanResult {
    pub result_code: ProcessingResultCode,
    pub additional_telemetry_details: BTreeMap<String, String>,
}

impl IndividualDetectorScanResult {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.additional_telemetry_details
            .insert(key.into(), value.to_string());
        self
    }
}

/// Trait for finding components of one ecosystem in a source tree.
///
/// Detectors write everything they find into
/// [`ScanRequest::component_recorder`]; the returned result only carries the
/// outcome code and telemetry.
///
/// Detectors doing long blocking work should check
/// [`ScanRequest::cancellation`]; a detector that ignores it keeps running in
/// the background after its time budget has been exceeded.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Unique identifier, matched case-insensitively by restrictions.
    fn id(&self) -> &str;

    fn version(&self) -> u32;

    fn categories(&self) -> &[DetectorClass];

    fn supported_component_types(&self) -> &[ComponentType];

    /// When true, the recorder treats every component without parents as
    /// explicitly referenced instead of relying on the explicit flag.
    fn needs_automatic_root_dependency_calculation(&self) -> bool {
        false
    }

    /// Experimental detectors run under a time limit and their results are
    /// never part of the scan output.
    fn is_experimental(&self) -> bool {
        false
    }

    /// Default-off detectors only run when explicitly enabled.
    fn is_default_off(&self) -> bool {
        false
    }

    /// Runs the detector.
    ///
    /// # Errors
    ///
    /// An error means the detector as a whole failed; per-file problems should
    /// be recorded as parse failures instead.
    async fn execute(&self, request: ScanRequest) -> Result<IndividualDetectorScanResult>;
}

/// Returns every built-in detector, in registry order.
pub fn all_detectors() -> Vec<Arc<dyn Detector>> {
    vec![
        Arc::new(CargoDetector),
        Arc::new(NpmDetector),
        Arc::new(PipDetector),
        Arc::new(GoModDetector),
    ]
}

/// Manifest metadata describing `detector`.
pub fn detector_info(detector: &dyn Detector, is_experimental: bool) -> DetectorInfo {
    DetectorInfo {
        detector_id: detector.id().to_string(),
        is_experimental,
        version: detector.version(),
        supported_component_types: detector.supported_component_types().to_vec(),
    }
}

/// Looks a built-in detector up by id, ignoring case.
pub fn get_detector(id: &str) -> Option<Arc<dyn Detector>> {
    all_detectors()
        .into_iter()
        .find(|d| d.id().eq_ignore_ascii_case(id))
}
