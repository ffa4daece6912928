use super::component::{ComponentId, ComponentType};
use super::detected::DetectedComponent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Outcome of a detector run or of a whole scan.
///
/// Variants are ordered so that `max` picks the worst outcome.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ProcessingResultCode {
    #[default]
    Success,
    PartialSuccess,
    InputError,
    TimeoutError,
}

impl ProcessingResultCode {
    /// Process exit code used by the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProcessingResultCode::Success => 0,
            ProcessingResultCode::PartialSuccess => 2,
            ProcessingResultCode::InputError => 3,
            ProcessingResultCode::TimeoutError => 4,
        }
    }
}

impl std::fmt::Display for ProcessingResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessingResultCode::Success => "Success",
            ProcessingResultCode::PartialSuccess => "PartialSuccess",
            ProcessingResultCode::InputError => "InputError",
            ProcessingResultCode::TimeoutError => "TimeoutError",
        };
        write!(f, "{}", s)
    }
}

/// A detector that took part in the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorInfo {
    pub detector_id: String,
    pub is_experimental: bool,
    pub version: u32,
    pub supported_component_types: Vec<ComponentType>,
}

/// Serialized form of one manifest's dependency graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGraphContract {
    /// Component id to the ids of its direct dependencies.
    pub graph: BTreeMap<ComponentId, BTreeSet<ComponentId>>,
    pub explicitly_referenced_component_ids: BTreeSet<ComponentId>,
    pub development_dependencies: BTreeSet<ComponentId>,
}

/// The scan manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub correlation_id: String,
    pub scan_time: DateTime<Utc>,
    pub source_directory: PathBuf,
    pub result_code: ProcessingResultCode,
    pub components_found: Vec<DetectedComponent>,
    pub detectors_in_scan: Vec<DetectorInfo>,
    /// Registered detectors that restrictions kept out of the scan.
    #[serde(default)]
    pub detectors_not_in_scan: Vec<DetectorInfo>,
    /// Keyed by manifest location relative to the source directory.
    pub dependency_graphs: BTreeMap<String, DependencyGraphContract>,
}

impl ScanResult {
    pub fn explicit_count(&self) -> usize {
        self.components_found
            .iter()
            .filter(|c| c.is_explicit_referenced_dependency)
            .count()
    }

    pub fn development_count(&self) -> usize {
        self.components_found
            .iter()
            .filter(|c| c.development_dependency == Some(true))
            .count()
    }

    pub fn count_by_type(&self) -> BTreeMap<ComponentType, usize> {
        let mut counts = BTreeMap::new();
        for c in &self.components_found {
            *counts.entry(c.component.component_type()).or_insert(0) += 1;
        }
        counts
    }
}
