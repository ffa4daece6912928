//! File name patterns and directory exclusion.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::{debug, warn};

/// Simple glob matching (supports * as wildcard).
///
/// Used for manifest search patterns such as `*.csproj` and for ignore lists
/// of component ids.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    if parts.len() == 1 {
        return pattern == text;
    }

    let mut remaining = text;

    // Check prefix (before first *)
    if !parts[0].is_empty() {
        if !remaining.starts_with(parts[0]) {
            return false;
        }
        remaining = &remaining[parts[0].len()..];
    }

    // Check suffix (after last *)
    let last_part = parts[parts.len() - 1];
    if !last_part.is_empty() {
        if !remaining.ends_with(last_part) {
            return false;
        }
        remaining = &remaining[..remaining.len() - last_part.len()];
    }

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        if let Some(pos) = remaining.find(part) {
            remaining = &remaining[pos + part.len()..];
        } else {
            return false;
        }
    }

    true
}

/// True if `text` matches any of `patterns`; patterns without `*` must match exactly.
pub fn matches_any(patterns: &[String], text: &str) -> bool {
    patterns.iter().any(|pattern| glob_match(pattern, text))
}

/// Decides which directories are skipped while walking the source tree.
///
/// Patterns are globs over the full directory path (`**/node_modules/**`).
/// A pattern ending in `/**` also excludes the directory itself, so the walk
/// prunes it instead of descending into it.
#[derive(Debug, Clone, Default)]
pub struct DirectoryExclusion {
    set: Option<GlobSet>,
    patterns: Vec<String>,
}

impl DirectoryExclusion {
    /// An exclusion that never excludes anything.
    pub fn none() -> Self {
        Self::default()
    }

    /// Builds the exclusion from glob patterns.
    ///
    /// With `allow_windows_paths`, backslashes in patterns are treated as
    /// separators. Invalid patterns are logged and skipped.
    pub fn new(patterns: &[String], allow_windows_paths: bool, ignore_case: bool) -> Self {
        if patterns.is_empty() {
            return Self::none();
        }

        let mut builder = GlobSetBuilder::new();
        let mut accepted = Vec::new();

        for pattern in patterns {
            let normalized = if allow_windows_paths {
                pattern.replace('\\', "/")
            } else {
                pattern.clone()
            };

            let mut variants = vec![normalized.clone()];
            if let Some(dir) = normalized.strip_suffix("/**") {
                if !dir.is_empty() {
                    variants.push(dir.to_string());
                }
            }

            let mut ok = true;
            for variant in variants {
                match GlobBuilder::new(&variant)
                    .case_insensitive(ignore_case)
                    .literal_separator(true)
                    .backslash_escape(!allow_windows_paths)
                    .build()
                {
                    Ok(glob) => {
                        builder.add(glob);
                    }
                    Err(e) => {
                        warn!(pattern = %pattern, error = %e, "Ignoring invalid directory exclusion pattern");
                        ok = false;
                        break;
                    }
                }
            }
            if ok {
                accepted.push(pattern.clone());
            }
        }

        match builder.build() {
            Ok(set) => Self {
                set: Some(set),
                patterns: accepted,
            },
            Err(e) => {
                warn!(error = %e, "Failed to build directory exclusion set");
                Self::none()
            }
        }
    }

    /// Exclusion with the platform's defaults: case-insensitive with Windows
    /// separators on Windows, exact elsewhere.
    pub fn for_current_platform(patterns: &[String]) -> Self {
        let windows = cfg!(windows);
        Self::new(patterns, windows, windows)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True if the directory `name` inside `parent` should be skipped.
    pub fn is_excluded(&self, name: &str, parent: &Path) -> bool {
        self.is_path_excluded(&parent.join(name))
    }

    pub fn is_path_excluded(&self, path: &Path) -> bool {
        let Some(set) = &self.set else {
            return false;
        };

        let normalized = path.to_string_lossy().replace('\\', "/");
        if set.is_match(&normalized) {
            debug!(path = %normalized, "Excluding directory");
            return true;
        }
        false
    }
}
