use super::files::{process_component_streams, ComponentStream};
use super::{DetectorClass, IndividualDetectorScanResult, ScanRequest};
use crate::graph::recorder::{SingleFileComponentRecorder, Usage};
use crate::model::{ComponentType, DetectedComponent, PipComponent};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Reads pinned requirements from `requirements.txt` style files.
///
/// Only exact `==` pins are recorded; ranges need an index lookup and are
/// reported as skipped.
pub struct PipDetector;

#[derive(Debug, PartialEq, Eq)]
enum Requirement<'a> {
    Pinned { name: &'a str, version: &'a str },
    Unpinned(&'a str),
    Option,
}

fn parse_line(line: &str) -> Option<Requirement<'_>> {
    let line = match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    };
    // Environment markers
    let line = match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let line = line.trim();

    if line.is_empty() {
        return None;
    }
    if line.starts_with('-') {
        return Some(Requirement::Option);
    }

    let Some((spec, version)) = line.split_once("==") else {
        return Some(Requirement::Unpinned(line));
    };

    let name = match spec.find('[') {
        Some(idx) => &spec[..idx],
        None => spec,
    }
    .trim();
    let version = version.trim();

    if name.is_empty() || version.is_empty() || version.contains(',') || version.contains('*') {
        return Some(Requirement::Unpinned(line));
    }

    Some(Requirement::Pinned { name, version })
}

fn parse_requirements(stream: &ComponentStream, recorder: &SingleFileComponentRecorder) -> Result<()> {
    for raw in stream.contents.lines() {
        match parse_line(raw) {
            Some(Requirement::Pinned { name, version }) => {
                let component = PipComponent::new(name, version)?;
                recorder.register_usage(DetectedComponent::new(component), Usage::explicit());
            }
            Some(Requirement::Unpinned(requirement)) => {
                recorder.register_package_parse_failure(requirement);
            }
            Some(Requirement::Option) => {
                debug!(file = %stream.location.display(), line = raw, "Skipping pip option");
            }
            None => {}
        }
    }
    Ok(())
}

#[async_trait]
impl super::Detector for PipDetector {
    fn id(&self) -> &str {
        "Pip"
    }

    fn version(&self) -> u32 {
        1
    }

    fn categories(&self) -> &[DetectorClass] {
        &[DetectorClass::Pip]
    }

    fn supported_component_types(&self) -> &[ComponentType] {
        &[ComponentType::Pip]
    }

    async fn execute(&self, request: ScanRequest) -> Result<IndividualDetectorScanResult> {
        let files = process_component_streams(&request, &["*requirements.txt"], true, |stream, recorder: Arc<SingleFileComponentRecorder>| async move {
            parse_requirements(&stream, &recorder)
        })
        .await?;

        Ok(IndividualDetectorScanResult::success().with_detail("requirementFiles", files))
    }
}
