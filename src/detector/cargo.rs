use super::files::{process_component_streams, ComponentStream};
use super::{DetectorClass, IndividualDetectorScanResult, ScanRequest};
use crate::graph::recorder::{SingleFileComponentRecorder, Usage};
use crate::model::{CargoComponent, ComponentType, DetectedComponent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Reads `Cargo.lock` files.
///
/// Packages without a `source` are workspace members; they are not reported
/// themselves, but their direct dependencies are explicit.
pub struct CargoDetector;

#[derive(Deserialize)]
struct CargoLock {
    #[serde(default)]
    package: Vec<LockPackage>,
}

#[derive(Deserialize)]
struct LockPackage {
    name: String,
    version: String,
    source: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

impl LockPackage {
    fn is_local(&self) -> bool {
        self.source.is_none()
    }

    fn key(&self) -> (String, String) {
        (self.name.clone(), self.version.clone())
    }
}

/// Resolves a lock file dependency entry (`name`, `name version` or
/// `name version (source)`) to a package index.
fn resolve(entry: &str, by_name: &HashMap<&str, Vec<usize>>, packages: &[LockPackage]) -> Option<usize> {
    let mut parts = entry.split_whitespace();
    let name = parts.next()?;
    let version = parts.next();
    let candidates = by_name.get(name)?;

    match version {
        None if candidates.len() == 1 => candidates.first().copied(),
        None => None,
        Some(version) => candidates
            .iter()
            .copied()
            .find(|&i| packages[i].version == version),
    }
}

fn parse_lock_file(stream: &ComponentStream, recorder: &SingleFileComponentRecorder) -> Result<()> {
    let lock: CargoLock = toml::from_str(&stream.contents)
        .with_context(|| format!("Failed to parse {}", stream.location.display()))?;
    let packages = lock.package;

    let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, pkg) in packages.iter().enumerate() {
        by_name.entry(pkg.name.as_str()).or_default().push(i);
    }

    let mut explicit: BTreeSet<usize> = BTreeSet::new();
    for pkg in packages.iter().filter(|p| p.is_local()) {
        for entry in &pkg.dependencies {
            match resolve(entry, &by_name, &packages) {
                Some(i) if !packages[i].is_local() => {
                    explicit.insert(i);
                }
                Some(_) => {}
                None => recorder.register_package_parse_failure(entry.clone()),
            }
        }
    }

    // First pass registers every node, second pass links them.
    let mut ids: HashMap<(String, String), String> = HashMap::new();
    for (i, pkg) in packages.iter().enumerate() {
        if pkg.is_local() {
            continue;
        }
        let mut component = match CargoComponent::new(&pkg.name, &pkg.version) {
            Ok(component) => component,
            Err(_) => {
                recorder.register_package_parse_failure(format!("{} {}", pkg.name, pkg.version));
                continue;
            }
        };
        if let Some(source) = &pkg.source {
            component = component.with_source(source);
        }
        let detected = DetectedComponent::new(component);
        ids.insert(pkg.key(), detected.id());

        let usage = Usage {
            explicit: explicit.contains(&i),
            development: Some(false),
            ..Usage::default()
        };
        recorder.register_usage(detected, usage);
    }

    for pkg in packages.iter().filter(|p| !p.is_local()) {
        let Some(parent_id) = ids.get(&pkg.key()) else {
            continue;
        };
        for entry in &pkg.dependencies {
            let Some(child) = resolve(entry, &by_name, &packages).map(|i| &packages[i]) else {
                recorder.register_package_parse_failure(entry.clone());
                continue;
            };
            let Some(child_id) = ids.get(&child.key()) else {
                continue;
            };
            if let Some(component) = recorder.get_component(child_id) {
                recorder.register_usage(
                    DetectedComponent::new(component),
                    Usage::transitive(parent_id.clone()),
                );
            }
        }
    }

    if let Some(manifest) = stream.location.parent().map(|dir| dir.join("Cargo.toml")) {
        if manifest.exists() {
            recorder.add_additional_related_file(manifest.to_string_lossy());
        }
    }

    Ok(())
}

#[async_trait]
impl super::Detector for CargoDetector {
    fn id(&self) -> &str {
        "Cargo"
    }

    fn version(&self) -> u32 {
        2
    }

    fn categories(&self) -> &[DetectorClass] {
        &[DetectorClass::Cargo]
    }

    fn supported_component_types(&self) -> &[ComponentType] {
        &[ComponentType::Cargo]
    }

    async fn execute(&self, request: ScanRequest) -> Result<IndividualDetectorScanResult> {
        let files = process_component_streams(&request, &["Cargo.lock"], true, |stream, recorder: Arc<SingleFileComponentRecorder>| async move {
            parse_lock_file(&stream, &recorder)
        })
        .await?;

        Ok(IndividualDetectorScanResult::success().with_detail("lockFiles", files))
    }
}
