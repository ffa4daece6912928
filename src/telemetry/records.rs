use super::Record;
use crate::model::ProcessingResultCode;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// One detector run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorExecutionRecord {
    pub detector_id: String,
    pub is_experimental: bool,
    pub detected_component_count: usize,
    pub explicitly_referenced_component_count: usize,
    pub return_code: ProcessingResultCode,
    pub execution_time_ms: u64,
    pub additional_telemetry_details: BTreeMap<String, String>,
    /// Failure text for experimental detectors that timed out or errored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental_information: Option<String>,
}

impl DetectorExecutionRecord {
    pub fn new(detector_id: impl Into<String>, is_experimental: bool) -> Self {
        Self {
            detector_id: detector_id.into(),
            is_experimental,
            ..Self::default()
        }
    }
}

impl Record for DetectorExecutionRecord {
    fn record_name(&self) -> &'static str {
        "DetectorExecution"
    }

    fn set_execution_time(&mut self, elapsed: Duration) {
        self.execution_time_ms = elapsed.as_millis() as u64;
    }
}

/// A whole scan invocation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanExecutionRecord {
    pub command: String,
    pub source_directory: String,
    pub detectors_run: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_code: Option<ProcessingResultCode>,
    pub component_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub execution_time_ms: u64,
}

impl Record for ScanExecutionRecord {
    fn record_name(&self) -> &'static str {
        "ScanExecution"
    }

    fn set_execution_time(&mut self, elapsed: Duration) {
        self.execution_time_ms = elapsed.as_millis() as u64;
    }
}
