//! Turns per-detector recorders into the final [`ScanResult`].

use super::processing::DetectorProcessingResult;
use super::DetectionArguments;
use crate::graph::DependencyGraph;
use crate::model::{
    ComponentId, DependencyGraphContract, DetectedComponent, DevDependencyMergeRule, ScanResult,
};
use crate::pattern::matches_any;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Makes `location` relative to `root`, with forward slashes and a leading `/`.
///
/// Locations outside `root` are returned normalized but otherwise unchanged.
pub fn relative_location(root: &Path, location: &str) -> String {
    let normalized = location.replace('\\', "/");
    let root = root.to_string_lossy().replace('\\', "/");
    let root = root.trim_end_matches('/');

    let relative = if root.is_empty() {
        normalized.as_str()
    } else {
        match normalized.strip_prefix(root) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => return normalized,
        }
    };

    if relative.starts_with('/') {
        relative.to_string()
    } else {
        format!("/{}", relative)
    }
}

/// Builds the scan manifest from the processing result.
///
/// Components are merged by id across detectors. Ids matching any of
/// `args.ignored_components` are dropped from both the component list and the
/// graphs.
pub fn generate_scan_result(
    processing: &DetectorProcessingResult,
    args: &DetectionArguments,
    correlation_id: &str,
) -> ScanResult {
    let root = args.source_directory.as_path();
    let ignored = |id: &str| matches_any(&args.ignored_components, id);

    let mut unmerged = Vec::new();
    let mut graphs: BTreeMap<String, DependencyGraphContract> = BTreeMap::new();

    for (detector, recorder) in &processing.component_recorders {
        for mut component in recorder.get_detected_components() {
            let id = component.id();
            if ignored(&id) {
                debug!(component = %id, "Ignoring component");
                continue;
            }

            component.file_paths = component
                .file_paths
                .iter()
                .map(|path| relative_location(root, path))
                .collect();
            component.detector_ids.insert(detector.id().to_string());
            unmerged.push(component);
        }

        for (location, graph) in recorder.get_dependency_graphs_by_location() {
            let contract = graphs.entry(relative_location(root, &location)).or_default();
            accumulate_graph(contract, &graph, &ignored);
        }
    }

    ScanResult {
        correlation_id: correlation_id.to_string(),
        scan_time: Utc::now(),
        source_directory: args.source_directory.clone(),
        result_code: processing.result_code,
        components_found: merge_components(unmerged, args.dev_dependency_merge),
        detectors_in_scan: processing.detectors_in_scan.clone(),
        detectors_not_in_scan: Vec::new(),
        dependency_graphs: graphs,
    }
}

fn accumulate_graph<F>(contract: &mut DependencyGraphContract, graph: &DependencyGraph, ignored: &F)
where
    F: Fn(&str) -> bool,
{
    for id in graph.components() {
        if ignored(&id) {
            continue;
        }

        let children = graph.dependencies_for_component(&id).unwrap_or_default();
        contract
            .graph
            .entry(id.clone())
            .or_default()
            .extend(children.into_iter().filter(|child| !ignored(child)));

        if graph.is_component_explicitly_referenced(&id) {
            contract.explicitly_referenced_component_ids.insert(id.clone());
        }
        if graph.is_development_dependency(&id) == Some(true) {
            contract.development_dependencies.insert(id);
        }
    }
}

/// Merges components that share an id. The output is sorted by id.
pub fn merge_components<I>(components: I, rule: DevDependencyMergeRule) -> Vec<DetectedComponent>
where
    I: IntoIterator<Item = DetectedComponent>,
{
    let mut merged: BTreeMap<ComponentId, DetectedComponent> = BTreeMap::new();
    for component in components {
        match merged.get_mut(&component.id()) {
            Some(existing) => existing.merge(&component, rule),
            None => {
                merged.insert(component.id(), component);
            }
        }
    }
    merged.into_values().collect()
}
