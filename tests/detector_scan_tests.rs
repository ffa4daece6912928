//! Scans of real manifest trees with the built-in detectors.

use compscan::detector::all_detectors;
use compscan::model::{ProcessingResultCode, ScanResult};
use compscan::orchestrator::{DetectionArguments, ScanExecutionService};
use compscan::output::write_manifest;
use compscan::telemetry::TelemetrySink;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

const CARGO_LOCK: &str = r#"version = 3

[[package]]
name = "tool"
version = "0.1.0"
dependencies = [
 "anyhow",
]

[[package]]
name = "anyhow"
version = "1.0.80"
source = "registry+https://github.com/rust-lang/crates.io-index"
"#;

const PACKAGE_LOCK: &str = r#"{
  "name": "web",
  "version": "1.0.0",
  "lockfileVersion": 3,
  "packages": {
    "": {
      "name": "web",
      "version": "1.0.0",
      "dependencies": { "react": "^18.2.0" },
      "devDependencies": { "vitest": "^1.0.0" }
    },
    "node_modules/react": {
      "version": "18.2.0",
      "dependencies": { "loose-envify": "^1.1.0" }
    },
    "node_modules/loose-envify": {
      "version": "1.4.0"
    },
    "node_modules/vitest": {
      "version": "1.2.0",
      "dev": true
    }
  }
}"#;

const GO_MOD: &str = r#"module example.com/svc

go 1.22

require (
	github.com/google/uuid v1.6.0
	golang.org/x/net v0.20.0 // indirect
)
"#;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn polyglot_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "tool/Cargo.lock", CARGO_LOCK);
    write(dir.path(), "tool/Cargo.toml", "[package]\nname = \"tool\"\n");
    write(dir.path(), "web/package-lock.json", PACKAGE_LOCK);
    write(dir.path(), "web/package.json", "{}");
    write(dir.path(), "svc/go.mod", GO_MOD);
    write(dir.path(), "ml/requirements.txt", "numpy==1.26.4\nscipy>=1.11\n");
    write(dir.path(), "vendor/legacy/requirements.txt", "django==2.2.0\n");
    dir
}

async fn scan(args: &DetectionArguments) -> ScanResult {
    ScanExecutionService::new(all_detectors(), TelemetrySink::disabled())
        .execute_scan(args)
        .await
        .unwrap()
}

fn find<'a>(result: &'a ScanResult, id: &str) -> &'a compscan::DetectedComponent {
    result
        .components_found
        .iter()
        .find(|c| c.id() == id)
        .unwrap_or_else(|| panic!("{} not found", id))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_polyglot_tree() {
    let dir = polyglot_tree();
    let mut args = DetectionArguments::new(dir.path());
    args.directory_exclusion_list = vec!["**/vendor/**".to_string()];

    let result = scan(&args).await;
    assert_eq!(result.result_code, ProcessingResultCode::Success);

    let anyhow = find(&result, "anyhow 1.0.80 - Cargo");
    assert!(anyhow.is_explicit_referenced_dependency);
    assert!(anyhow.file_paths.contains("/tool/Cargo.lock"));
    assert!(anyhow.file_paths.contains("/tool/Cargo.toml"));

    let react = find(&result, "react 18.2.0 - Npm");
    assert!(react.is_explicit_referenced_dependency);
    assert_eq!(react.development_dependency, Some(false));

    let envify = find(&result, "loose-envify 1.4.0 - Npm");
    assert!(!envify.is_explicit_referenced_dependency);
    assert!(envify.dependency_roots.iter().any(|r| r.id() == react.id()));

    let vitest = find(&result, "vitest 1.2.0 - Npm");
    assert_eq!(vitest.development_dependency, Some(true));

    let uuid = find(&result, "github.com/google/uuid v1.6.0 - Go");
    assert!(uuid.is_explicit_referenced_dependency);
    let net = find(&result, "golang.org/x/net v0.20.0 - Go");
    assert!(!net.is_explicit_referenced_dependency);

    find(&result, "numpy 1.26.4 - pip");
    assert!(!result
        .components_found
        .iter()
        .any(|c| c.component.name() == "django"));
}

#[tokio::test]
async fn test_category_scan_only_runs_selected_ecosystem() {
    let dir = polyglot_tree();
    let mut args = DetectionArguments::new(dir.path());
    args.detector_categories = vec!["Npm".to_string()];

    let result = scan(&args).await;
    assert_eq!(result.detectors_in_scan.len(), 1);
    assert!(result
        .components_found
        .iter()
        .all(|c| c.detector_ids.contains("NpmWithRoots")));
    assert_eq!(result.components_found.len(), 3);
}

#[tokio::test]
async fn test_ignored_components_are_dropped() {
    let dir = polyglot_tree();
    let mut args = DetectionArguments::new(dir.path());
    args.ignored_components = vec!["* - Go".to_string()];

    let result = scan(&args).await;
    assert!(result
        .components_found
        .iter()
        .all(|c| !c.id().ends_with(" - Go")));
    let graph = &result.dependency_graphs["/svc/go.mod"];
    assert!(graph.graph.is_empty());
}

#[tokio::test]
async fn test_manifest_file_round_trips() {
    let dir = polyglot_tree();
    let result = scan(&DetectionArguments::new(dir.path())).await;

    let out = TempDir::new().unwrap();
    let path = out.path().join("manifest.json");
    write_manifest(&result, &path).unwrap();

    let parsed: ScanResult = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed.components_found.len(), result.components_found.len());
    assert_eq!(parsed.correlation_id, result.correlation_id);
    assert!(parsed.dependency_graphs.contains_key("/web/package-lock.json"));
}

#[tokio::test]
async fn test_empty_directory() {
    let dir = TempDir::new().unwrap();
    let result = scan(&DetectionArguments::new(dir.path())).await;
    assert_eq!(result.result_code, ProcessingResultCode::Success);
    assert!(result.components_found.is_empty());
    assert!(result.dependency_graphs.is_empty());
}
