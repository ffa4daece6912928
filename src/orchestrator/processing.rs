//! Concurrent detector execution.
//!
//! Every detector runs in its own tokio task with its own
//! [`ComponentRecorder`]. The detector future itself runs in a nested task so
//! that a panic surfaces as a `JoinError` for that detector only.
//! Experimental detectors run under a time limit and never contribute
//! components or affect the overall result code.

use super::restriction::DetectorRestrictions;
use super::DetectionArguments;
use crate::detector::{detector_info, Detector, IndividualDetectorScanResult, ScanRequest};
use crate::graph::recorder::ComponentRecorder;
use crate::model::{DetectorInfo, DevDependencyMergeRule, ProcessingResultCode};
use crate::pattern::DirectoryExclusion;
use crate::telemetry::{DetectorExecutionRecord, TelemetrySink};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tabled::{settings::Style, Table, Tabled};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

/// Timing and counts for one detector run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorRunResult {
    pub execution_time: Duration,
    pub components_found: usize,
    pub explicitly_referenced: usize,
    pub result_code: ProcessingResultCode,
    pub is_experimental: bool,
}

/// Output of [`DetectorProcessingService::process_detectors`].
pub struct DetectorProcessingResult {
    /// Worst result code among non-experimental detectors.
    pub result_code: ProcessingResultCode,
    /// Every detector with the recorder holding its contribution. Experimental
    /// and failed detectors carry an empty recorder.
    pub component_recorders: Vec<(Arc<dyn Detector>, Arc<ComponentRecorder>)>,
    /// Keyed by detector id, with ` (Beta)` appended for experimental detectors.
    pub detector_results: BTreeMap<String, DetectorRunResult>,
    pub detectors_in_scan: Vec<DetectorInfo>,
}

#[derive(Tabled)]
struct TimingRow {
    #[tabled(rename = "Component Detector Id")]
    id: String,
    #[tabled(rename = "Detection Time")]
    time: String,
    #[tabled(rename = "# Components Found")]
    components: usize,
    #[tabled(rename = "# Explicitly Referenced")]
    explicit: usize,
}

#[derive(Clone)]
struct RunContext {
    source_directory: PathBuf,
    exclusion: DirectoryExclusion,
    detector_args: BTreeMap<String, String>,
    max_threads: usize,
    experimental_timeout: Duration,
    merge_rule: DevDependencyMergeRule,
}

struct DetectorOutcome {
    detector: Arc<dyn Detector>,
    recorder: Arc<ComponentRecorder>,
    run: DetectorRunResult,
    skipped: BTreeSet<String>,
}

/// Builds the directory exclusion every detector of a scan shares.
pub fn directory_exclusion_predicate(args: &DetectionArguments) -> DirectoryExclusion {
    DirectoryExclusion::for_current_platform(&args.directory_exclusion_list)
}

/// True when `detector` should run under experimental guards.
pub fn is_experimental(detector: &dyn Detector, restrictions: &DetectorRestrictions) -> bool {
    detector.is_experimental() && !restrictions.is_explicitly_enabled(detector.id())
}

/// Runs detectors concurrently and collects their recorders.
pub struct DetectorProcessingService {
    telemetry: TelemetrySink,
}

impl DetectorProcessingService {
    pub fn new(telemetry: TelemetrySink) -> Self {
        Self { telemetry }
    }

    /// Runs every detector in `detectors` and waits for all of them.
    ///
    /// A detector that errors or panics gets `InputError` and contributes
    /// nothing; an experimental detector that exceeds its time budget is
    /// cancelled and gets `TimeoutError`. Neither stops the other detectors.
    pub async fn process_detectors(
        &self,
        args: &DetectionArguments,
        detectors: Vec<Arc<dyn Detector>>,
        restrictions: &DetectorRestrictions,
    ) -> DetectorProcessingResult {
        let started = Instant::now();
        let context = RunContext {
            source_directory: args.source_directory.clone(),
            exclusion: directory_exclusion_predicate(args),
            detector_args: args.detector_args.clone(),
            max_threads: args.max_threads,
            experimental_timeout: args.experimental_timeout,
            merge_rule: args.dev_dependency_merge,
        };

        let mut handles = Vec::with_capacity(detectors.len());
        for detector in &detectors {
            let experimental = is_experimental(detector.as_ref(), restrictions);
            let span = info_span!("detector", id = %detector.id(), experimental);
            let task = run_detector(
                Arc::clone(detector),
                context.clone(),
                experimental,
                self.telemetry.clone(),
            );
            handles.push(tokio::spawn(task.instrument(span)));
        }

        let joined = futures::future::join_all(handles).await;

        let mut outcomes = Vec::with_capacity(joined.len());
        for (detector, result) in detectors.iter().zip(joined) {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(detector = %detector.id(), error = %e, "Detector task failed");
                    outcomes.push(DetectorOutcome {
                        detector: Arc::clone(detector),
                        recorder: Arc::new(ComponentRecorder::default()),
                        run: DetectorRunResult {
                            execution_time: started.elapsed(),
                            components_found: 0,
                            explicitly_referenced: 0,
                            result_code: ProcessingResultCode::InputError,
                            is_experimental: is_experimental(detector.as_ref(), restrictions),
                        },
                        skipped: BTreeSet::new(),
                    });
                }
            }
        }

        let result_code = outcomes
            .iter()
            .filter(|o| !o.run.is_experimental)
            .map(|o| o.run.result_code)
            .max()
            .unwrap_or_default();

        let mut detector_results = BTreeMap::new();
        let mut detectors_in_scan = Vec::with_capacity(outcomes.len());
        for outcome in &outcomes {
            let id = outcome.detector.id();
            let key = if outcome.run.is_experimental {
                format!("{} (Beta)", id)
            } else {
                id.to_string()
            };
            detector_results.insert(key, outcome.run.clone());
            detectors_in_scan.push(detector_info(
                outcome.detector.as_ref(),
                outcome.run.is_experimental,
            ));
        }

        let total = started.elapsed();
        log_timing_table(&detector_results, total);
        log_skipped_components(&outcomes);
        info!(seconds = total.as_secs_f64(), "Detection time: {:.2} seconds", total.as_secs_f64());

        DetectorProcessingResult {
            result_code,
            component_recorders: outcomes
                .into_iter()
                .map(|o| (o.detector, o.recorder))
                .collect(),
            detector_results,
            detectors_in_scan,
        }
    }
}

async fn run_detector(
    detector: Arc<dyn Detector>,
    context: RunContext,
    experimental: bool,
    telemetry: TelemetrySink,
) -> DetectorOutcome {
    let started = Instant::now();
    let id = detector.id().to_string();
    let recorder = Arc::new(ComponentRecorder::with_merge_rule(
        !detector.needs_automatic_root_dependency_calculation(),
        context.merge_rule,
    ));
    let cancellation = CancellationToken::new();
    let request = ScanRequest {
        source_directory: context.source_directory,
        directory_exclusion: context.exclusion,
        detector_args: context.detector_args,
        component_recorder: Arc::clone(&recorder),
        max_threads: context.max_threads,
        cancellation: cancellation.clone(),
    };

    let mut record = telemetry.track(DetectorExecutionRecord::new(&id, experimental));

    let task = {
        let detector = Arc::clone(&detector);
        tokio::spawn(async move { detector.execute(request).await })
    };
    let abort = task.abort_handle();

    let joined = if experimental {
        tokio::time::timeout(context.experimental_timeout, task).await.ok()
    } else {
        Some(task.await)
    };

    let (result, failure) = match joined {
        None => {
            cancellation.cancel();
            abort.abort();
            warn!(
                detector = %id,
                timeout_secs = context.experimental_timeout.as_secs_f64(),
                "Experimental detector timed out"
            );
            (
                IndividualDetectorScanResult {
                    result_code: ProcessingResultCode::TimeoutError,
                    ..Default::default()
                },
                None,
            )
        }
        Some(Ok(Ok(result))) => (result, None),
        Some(Ok(Err(e))) => (
            IndividualDetectorScanResult {
                result_code: ProcessingResultCode::InputError,
                ..Default::default()
            },
            Some(format!("{:#}", e)),
        ),
        Some(Err(e)) => (
            IndividualDetectorScanResult {
                result_code: ProcessingResultCode::InputError,
                ..Default::default()
            },
            Some(join_error_message(e)),
        ),
    };

    if let Some(message) = &failure {
        if experimental {
            warn!(detector = %id, error = %message, "Experimental detector failed");
            record.experimental_information = Some(message.clone());
        } else {
            error!(detector = %id, error = %message, "Detector failed");
            record
                .additional_telemetry_details
                .insert("error".to_string(), message.clone());
        }
    }

    // Failed non-experimental detectors contribute nothing.
    let discard = failure.is_some() && !experimental;
    let (components_found, explicitly_referenced) = if discard {
        (0, 0)
    } else {
        let explicit: BTreeSet<String> = recorder
            .get_dependency_graphs_by_location()
            .values()
            .flat_map(|graph| graph.all_explicitly_referenced_components())
            .collect();
        (recorder.get_detected_components().len(), explicit.len())
    };
    let skipped = if discard {
        BTreeSet::new()
    } else {
        recorder.get_skipped_components()
    };

    record.detected_component_count = components_found;
    record.explicitly_referenced_component_count = explicitly_referenced;
    record.return_code = result.result_code;
    record
        .additional_telemetry_details
        .extend(result.additional_telemetry_details);
    drop(record);

    let execution_time = started.elapsed();
    info!(
        detector = %id,
        components = components_found,
        explicit = explicitly_referenced,
        result = %result.result_code,
        seconds = execution_time.as_secs_f64(),
        "Detector finished"
    );

    let recorder = if experimental || discard {
        Arc::new(ComponentRecorder::default())
    } else {
        recorder
    };

    DetectorOutcome {
        detector,
        recorder,
        run: DetectorRunResult {
            execution_time,
            components_found,
            explicitly_referenced,
            result_code: result.result_code,
            is_experimental: experimental,
        },
        skipped,
    }
}

fn join_error_message(error: JoinError) -> String {
    if error.is_cancelled() {
        return "detector task was cancelled".to_string();
    }
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("detector panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("detector panicked: {}", message)
    } else {
        "detector panicked".to_string()
    }
}

/// Renders the per-detector timing table, with a `Total` row.
pub fn timing_table(results: &BTreeMap<String, DetectorRunResult>, total: Duration) -> String {
    let mut rows: Vec<TimingRow> = results
        .iter()
        .map(|(id, run)| TimingRow {
            id: id.clone(),
            time: format!("{:.2} seconds", run.execution_time.as_secs_f64()),
            components: run.components_found,
            explicit: run.explicitly_referenced,
        })
        .collect();

    rows.push(TimingRow {
        id: "Total".to_string(),
        time: format!("{:.2} seconds", total.as_secs_f64()),
        components: results.values().map(|r| r.components_found).sum(),
        explicit: results.values().map(|r| r.explicitly_referenced).sum(),
    });

    Table::new(rows).with(Style::rounded()).to_string()
}

fn log_timing_table(results: &BTreeMap<String, DetectorRunResult>, total: Duration) {
    for line in timing_table(results, total).lines() {
        info!("{}", line);
    }
}

fn log_skipped_components(outcomes: &[DetectorOutcome]) {
    let mut warned = false;
    for outcome in outcomes.iter().filter(|o| !o.skipped.is_empty()) {
        if !warned {
            warn!("Some components or files were not detected due to parsing failures or connectivity issues.");
            warn!("Please review the logs above for more detailed information.");
            warned = true;
        }
        warn!(
            detector = %outcome.detector.id(),
            count = outcome.skipped.len(),
            "Components skipped for {} detector:",
            outcome.detector.id()
        );
        for skipped in &outcome.skipped {
            warn!("- {}", skipped);
        }
    }
}
