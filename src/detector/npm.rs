use super::files::{process_component_streams, ComponentStream};
use super::{DetectorClass, IndividualDetectorScanResult, ScanRequest};
use crate::graph::recorder::{SingleFileComponentRecorder, Usage};
use crate::model::{ComponentType, DetectedComponent, NpmComponent};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

const NODE_MODULES: &str = "node_modules/";

/// Reads `package-lock.json` files (lockfile version 2 and 3).
pub struct NpmDetector;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageLock {
    lockfile_version: Option<u32>,
    #[serde(default)]
    packages: BTreeMap<String, LockEntry>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LockEntry {
    name: Option<String>,
    version: Option<String>,
    integrity: Option<String>,
    #[serde(default)]
    dev: bool,
    #[serde(default)]
    link: bool,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, String>,
}

impl LockEntry {
    fn all_dependencies(&self) -> impl Iterator<Item = &String> {
        self.dependencies
            .keys()
            .chain(self.dev_dependencies.keys())
            .chain(self.optional_dependencies.keys())
    }
}

/// Package name for a `packages` key such as `node_modules/a/node_modules/@scope/b`.
fn package_name(path: &str) -> &str {
    match path.rfind(NODE_MODULES) {
        Some(idx) => &path[idx + NODE_MODULES.len()..],
        None => path,
    }
}

/// The install path that contains `path`, or `""` for top-level packages.
fn parent_path(path: &str) -> &str {
    match path.rfind("/node_modules/") {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Resolves `name` as required from `from` the way Node does: the closest
/// `node_modules` directory up the tree wins.
fn resolve_install_path(
    packages: &BTreeMap<String, LockEntry>,
    from: &str,
    name: &str,
) -> Option<String> {
    let mut base = from;
    loop {
        let candidate = if base.is_empty() {
            format!("{}{}", NODE_MODULES, name)
        } else {
            format!("{}/{}{}", base, NODE_MODULES, name)
        };
        if packages.contains_key(&candidate) {
            return Some(candidate);
        }
        if base.is_empty() {
            return None;
        }
        base = parent_path(base);
    }
}

fn parse_package_lock(stream: &ComponentStream, recorder: &SingleFileComponentRecorder) -> Result<()> {
    let lock: PackageLock = serde_json::from_str(&stream.contents)
        .with_context(|| format!("Failed to parse {}", stream.location.display()))?;

    match lock.lockfile_version {
        Some(2) | Some(3) => {}
        other => bail!("unsupported lockfileVersion {:?}", other),
    }

    let root = lock.packages.get("").map(|entry| {
        entry
            .all_dependencies()
            .cloned()
            .collect::<std::collections::BTreeSet<String>>()
    });
    let root = root.unwrap_or_default();

    let mut ids: HashMap<&str, String> = HashMap::new();

    for (path, entry) in &lock.packages {
        if path.is_empty() || entry.link || !path.contains(NODE_MODULES) {
            continue;
        }

        let name = entry.name.as_deref().unwrap_or_else(|| package_name(path));
        let version = entry.version.as_deref().unwrap_or_default();
        let mut component = match NpmComponent::new(name, version) {
            Ok(component) => component,
            Err(_) => {
                recorder.register_package_parse_failure(path.clone());
                continue;
            }
        };
        if let Some(integrity) = &entry.integrity {
            component = component.with_hash(integrity);
        }

        let detected = DetectedComponent::new(component);
        ids.insert(path.as_str(), detected.id());

        let top_level = parent_path(path).is_empty();
        let usage = Usage {
            explicit: top_level && root.contains(package_name(path)),
            development: Some(entry.dev),
            ..Usage::default()
        };
        recorder.register_usage(detected, usage);
    }

    for (path, entry) in &lock.packages {
        let Some(parent_id) = ids.get(path.as_str()) else {
            continue;
        };
        for dependency in entry.all_dependencies() {
            let Some(child_path) = resolve_install_path(&lock.packages, path, dependency) else {
                // Unmet optional or peer dependency
                continue;
            };
            let Some(child_id) = ids.get(child_path.as_str()) else {
                continue;
            };
            if let Some(component) = recorder.get_component(child_id) {
                let child = &lock.packages[&child_path];
                recorder.register_usage(
                    DetectedComponent::new(component),
                    Usage::transitive(parent_id.clone()).with_development(child.dev),
                );
            }
        }
    }

    if let Some(manifest) = stream.location.parent().map(|dir| dir.join("package.json")) {
        if manifest.exists() {
            recorder.add_additional_related_file(manifest.to_string_lossy());
        }
    }

    Ok(())
}

/// True when `location` sits under a `node_modules` directory below `root`.
fn is_installed_package(root: &Path, location: &Path) -> bool {
    location
        .strip_prefix(root)
        .unwrap_or(location)
        .components()
        .any(|c| c.as_os_str() == "node_modules")
}

#[async_trait]
impl super::Detector for NpmDetector {
    fn id(&self) -> &str {
        "NpmWithRoots"
    }

    fn version(&self) -> u32 {
        3
    }

    fn categories(&self) -> &[DetectorClass] {
        &[DetectorClass::Npm]
    }

    fn supported_component_types(&self) -> &[ComponentType] {
        &[ComponentType::Npm]
    }

    async fn execute(&self, request: ScanRequest) -> Result<IndividualDetectorScanResult> {
        let root = request.source_directory.clone();
        let files = process_component_streams(&request, &["package-lock.json"], true, |stream, recorder: Arc<SingleFileComponentRecorder>| {
            let installed = is_installed_package(&root, &stream.location);
            async move {
                // Lock files inside installed packages describe those packages, not the project
                if installed {
                    return Ok(());
                }
                parse_package_lock(&stream, &recorder)
            }
        })
        .await?;

        Ok(IndividualDetectorScanResult::success().with_detail("lockFiles", files))
    }
}
