use super::processing::DetectorProcessingService;
use super::restriction::{apply_restrictions, DetectorRestrictions};
use super::translation::generate_scan_result;
use super::DetectionArguments;
use crate::detector::{detector_info, Detector};
use crate::error::DetectionError;
use crate::model::ScanResult;
use crate::telemetry::{ScanExecutionRecord, TelemetrySink};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

/// Detector arg values that enable a default-off or experimental detector.
const ENABLE_VALUES: [&str; 2] = ["EnableIfDefaultOff", "Enable"];

/// Restrictions derived from the scan arguments.
pub fn detector_restrictions(args: &DetectionArguments) -> DetectorRestrictions {
    let explicitly_enabled_detector_ids: BTreeSet<String> = args
        .detector_args
        .iter()
        .filter(|(_, value)| ENABLE_VALUES.iter().any(|v| v.eq_ignore_ascii_case(value)))
        .map(|(key, _)| key.clone())
        .collect();

    DetectorRestrictions {
        allowed_detector_ids: args.detectors_filter.clone(),
        allowed_detector_categories: args.detector_categories.clone(),
        explicitly_enabled_detector_ids,
    }
}

/// Runs a complete scan: restriction, processing and translation.
pub struct ScanExecutionService {
    detectors: Vec<Arc<dyn Detector>>,
    processing: DetectorProcessingService,
    telemetry: TelemetrySink,
}

impl ScanExecutionService {
    pub fn new(detectors: Vec<Arc<dyn Detector>>, telemetry: TelemetrySink) -> Self {
        Self {
            detectors,
            processing: DetectorProcessingService::new(telemetry.clone()),
            telemetry,
        }
    }

    /// Scans `args.source_directory` with every detector the arguments allow.
    ///
    /// # Errors
    ///
    /// Returns an error if the restrictions in `args` name an unknown detector
    /// or match no detector. No detector runs in that case.
    pub async fn execute_scan(&self, args: &DetectionArguments) -> Result<ScanResult, DetectionError> {
        let mut record = self.telemetry.track(ScanExecutionRecord {
            command: "scan".to_string(),
            source_directory: args.source_directory.display().to_string(),
            ..Default::default()
        });

        let restrictions = detector_restrictions(args);
        let detectors = match apply_restrictions(&restrictions, self.detectors.clone()) {
            Ok(detectors) => detectors,
            Err(e) => {
                record.error_message = Some(e.to_string());
                return Err(e);
            }
        };
        debug!(count = detectors.len(), "Finished applying restrictions to detectors");

        let disabled: Vec<_> = self
            .detectors
            .iter()
            .filter(|d| !detectors.iter().any(|kept| kept.id() == d.id()))
            .map(|d| detector_info(d.as_ref(), d.is_experimental()))
            .collect();

        record.detectors_run = detectors.iter().map(|d| d.id().to_string()).collect();

        let span = info_span!("scan", source = %args.source_directory.display());
        let processing = self
            .processing
            .process_detectors(args, detectors, &restrictions)
            .instrument(span)
            .await;

        let mut result = generate_scan_result(&processing, args, self.telemetry.correlation_id());
        result.detectors_not_in_scan = disabled;

        record.result_code = Some(result.result_code);
        record.component_count = result.components_found.len();
        info!(
            components = result.components_found.len(),
            result = %result.result_code,
            "Scan finished"
        );

        Ok(result)
    }
}
