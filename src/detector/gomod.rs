use super::files::{process_component_streams, ComponentStream};
use super::{DetectorClass, IndividualDetectorScanResult, ScanRequest};
use crate::graph::recorder::{SingleFileComponentRecorder, Usage};
use crate::model::{ComponentType, DetectedComponent, GoComponent};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Reads `require` directives from `go.mod` files.
///
/// Requirements marked `// indirect` are recorded as transitive.
pub struct GoModDetector;

#[derive(Debug, PartialEq, Eq)]
struct GoRequirement<'a> {
    path: &'a str,
    version: &'a str,
    indirect: bool,
}

fn parse_requirement(line: &str) -> Option<GoRequirement<'_>> {
    let (body, comment) = match line.find("//") {
        Some(idx) => (&line[..idx], Some(&line[idx + 2..])),
        None => (line, None),
    };
    let mut fields = body.split_whitespace();
    let path = fields.next()?;
    let version = fields.next()?;
    if fields.next().is_some() {
        return None;
    }
    let indirect = comment
        .map(|c| c.split(';').any(|part| part.trim() == "indirect"))
        .unwrap_or(false);
    Some(GoRequirement {
        path,
        version,
        indirect,
    })
}

/// Collects every requirement line from single-line and block `require` directives.
fn requirement_lines(contents: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut in_block = false;

    for line in contents.lines() {
        let trimmed = line.trim();
        if in_block {
            if trimmed.starts_with(')') {
                in_block = false;
            } else if !trimmed.is_empty() && !trimmed.starts_with("//") {
                lines.push(trimmed);
            }
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("require") {
            let rest = rest.trim();
            if rest.starts_with('(') {
                in_block = true;
            } else if !rest.is_empty() {
                lines.push(rest);
            }
        }
    }

    lines
}

fn parse_go_mod(stream: &ComponentStream, recorder: &SingleFileComponentRecorder) -> Result<()> {
    for line in requirement_lines(&stream.contents) {
        let Some(requirement) = parse_requirement(line) else {
            recorder.register_package_parse_failure(line);
            continue;
        };
        let component = GoComponent::new(requirement.path, requirement.version)?;
        let usage = Usage {
            explicit: !requirement.indirect,
            ..Usage::default()
        };
        recorder.register_usage(DetectedComponent::new(component), usage);
    }

    if let Some(sum) = stream.location.parent().map(|dir| dir.join("go.sum")) {
        if sum.exists() {
            recorder.add_additional_related_file(sum.to_string_lossy());
        }
    }
    Ok(())
}

#[async_trait]
impl super::Detector for GoModDetector {
    fn id(&self) -> &str {
        "GoMod"
    }

    fn version(&self) -> u32 {
        1
    }

    fn categories(&self) -> &[DetectorClass] {
        &[DetectorClass::GoMod]
    }

    fn supported_component_types(&self) -> &[ComponentType] {
        &[ComponentType::Go]
    }

    async fn execute(&self, request: ScanRequest) -> Result<IndividualDetectorScanResult> {
        let files = process_component_streams(&request, &["go.mod"], true, |stream, recorder: Arc<SingleFileComponentRecorder>| async move {
            parse_go_mod(&stream, &recorder)
        })
        .await?;

        Ok(IndividualDetectorScanResult::success().with_detail("goModFiles", files))
    }
}
