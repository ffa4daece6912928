//! Helpers for detectors that work off manifest files.

use super::ScanRequest;
use crate::graph::recorder::SingleFileComponentRecorder;
use crate::pattern::{glob_match, DirectoryExclusion};
use anyhow::{Context, Result};
use futures::StreamExt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A manifest file matched by a search pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedFile {
    pub path: PathBuf,
    pub pattern: String,
}

/// A matched manifest file together with its contents.
#[derive(Debug, Clone)]
pub struct ComponentStream {
    pub location: PathBuf,
    pub pattern: String,
    pub contents: String,
}

/// Walks `root` and returns every file whose name matches one of `patterns`.
///
/// Excluded directories are pruned, so nothing below them is visited.
/// Results are sorted by path.
pub fn find_component_streams(
    root: &Path,
    patterns: &[String],
    exclusion: &DirectoryExclusion,
) -> Vec<MatchedFile> {
    let walker = WalkDir::new(root).follow_links(false).into_iter();

    let mut matched: Vec<MatchedFile> = walker
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            !exclusion.is_path_excluded(entry.path())
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "Skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy();
            patterns
                .iter()
                .find(|pattern| glob_match(pattern, &name))
                .map(|pattern| MatchedFile {
                    path: entry.path().to_path_buf(),
                    pattern: pattern.clone(),
                })
        })
        .collect();

    matched.sort_by(|a, b| a.path.cmp(&b.path));
    matched
}

/// Number of files to process at once for a request.
pub fn parallelism(request: &ScanRequest, parallel: bool) -> usize {
    if !parallel {
        return 1;
    }
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores.min(request.max_threads).max(1)
}

/// Finds every file matching `patterns` and runs `handler` on each with
/// bounded concurrency.
///
/// Each handler receives the file contents and the single-file recorder for
/// that file. A failing handler or an unreadable file is logged and recorded
/// as a parse failure on that file's recorder; it never fails the whole run.
/// Once the request is cancelled no further files are started.
///
/// Returns the number of files processed.
pub async fn process_component_streams<F, Fut>(
    request: &ScanRequest,
    patterns: &[&str],
    parallel: bool,
    handler: F,
) -> Result<usize>
where
    F: Fn(ComponentStream, Arc<SingleFileComponentRecorder>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let root = request.source_directory.clone();
    let owned_patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
    let exclusion = request.directory_exclusion.clone();

    let files = tokio::task::spawn_blocking(move || {
        find_component_streams(&root, &owned_patterns, &exclusion)
    })
    .await
    .context("directory walk panicked")?;

    debug!(count = files.len(), "Matched manifest files");

    let limit = parallelism(request, parallel);
    let processed = AtomicUsize::new(0);
    let handler = &handler;
    let processed_ref = &processed;

    futures::stream::iter(files)
        .take_until(request.cancellation.cancelled())
        .for_each_concurrent(limit, |file| async move {
            if request.cancellation.is_cancelled() {
                return;
            }

            let location = file.path.to_string_lossy().to_string();
            let recorder = match request
                .component_recorder
                .create_single_file_component_recorder(&location)
            {
                Ok(recorder) => recorder,
                Err(e) => {
                    warn!(file = %location, error = %e, "Cannot record components for file");
                    return;
                }
            };

            let contents = match tokio::fs::read_to_string(&file.path).await {
                Ok(contents) => contents,
                Err(e) => {
                    warn!(file = %location, error = %e, "Failed to read manifest");
                    recorder.register_package_parse_failure(format!("{}: {}", location, e));
                    return;
                }
            };

            let stream = ComponentStream {
                location: file.path,
                pattern: file.pattern,
                contents,
            };

            if let Err(e) = handler(stream, Arc::clone(&recorder)).await {
                warn!(file = %location, error = %e, "Failed to process manifest");
                recorder.register_package_parse_failure(format!("{}: {}", location, e));
            }
            processed_ref.fetch_add(1, Ordering::Relaxed);
        })
        .await;

    Ok(processed.load(Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::recorder::{ComponentRecorder, Usage};
    use crate::model::{DetectedComponent, NpmComponent};
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_find_prunes_excluded_directories() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/package-lock.json", "{}");
        write(dir.path(), "node_modules/x/package-lock.json", "{}");
        write(dir.path(), "b/requirements.txt", "");

        let exclusion = DirectoryExclusion::new(&["**/node_modules/**".to_string()], false, false);
        let found = find_component_streams(
            dir.path(),
            &["package-lock.json".to_string()],
            &exclusion,
        );

        assert_eq!(found.len(), 1);
        assert!(found[0].path.ends_with("a/package-lock.json"));
        assert_eq!(found[0].pattern, "package-lock.json");
    }

    #[test]
    fn test_find_matches_wildcards() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "requirements.txt", "");
        write(dir.path(), "sub/dev-requirements.txt", "");
        write(dir.path(), "sub/readme.md", "");

        let found = find_component_streams(
            dir.path(),
            &["*requirements.txt".to_string()],
            &DirectoryExclusion::none(),
        );
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_handler_errors_become_parse_failures() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "good/manifest.txt", "lodash");
        write(dir.path(), "bad/manifest.txt", "boom");

        let recorder = Arc::new(ComponentRecorder::default());
        let request = ScanRequest::new(dir.path(), Arc::clone(&recorder));

        let processed = process_component_streams(&request, &["manifest.txt"], true, |stream, file| async move {
            if stream.contents == "boom" {
                anyhow::bail!("unexpected token");
            }
            file.register_usage(
                DetectedComponent::new(NpmComponent::new(stream.contents.trim(), "1.0.0")?),
                Usage::explicit(),
            );
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(processed, 2);
        assert_eq!(recorder.get_detected_components().len(), 1);
        let skipped = recorder.get_skipped_components();
        assert_eq!(skipped.len(), 1);
        assert!(skipped.iter().next().unwrap().contains("unexpected token"));
    }

    #[tokio::test]
    async fn test_cancelled_request_processes_nothing() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "manifest.txt", "lodash");

        let recorder = Arc::new(ComponentRecorder::default());
        let request = ScanRequest::new(dir.path(), Arc::clone(&recorder));
        request.cancellation.cancel();

        let processed = process_component_streams(&request, &["manifest.txt"], false, |_, _| async {
            Ok::<(), anyhow::Error>(())
        })
        .await
        .unwrap();

        assert_eq!(processed, 0);
    }

    #[test]
    fn test_parallelism_bounds() {
        let mut request = ScanRequest::new("/", Arc::new(ComponentRecorder::default()));
        assert_eq!(parallelism(&request, false), 1);
        request.max_threads = 1;
        assert_eq!(parallelism(&request, true), 1);
        request.max_threads = 0;
        assert_eq!(parallelism(&request, true), 1);
    }
}
