//! Recorders that detectors register components through.

use super::{DependencyGraph, GraphNode};
use crate::error::DetectionError;
use crate::model::{
    ComponentId, DependencyScope, DetectedComponent, DevDependencyMergeRule, TypedComponent,
};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// How a component was used at the point a detector saw it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub explicit: bool,
    pub parent_id: Option<ComponentId>,
    pub development: Option<bool>,
    pub scope: Option<DependencyScope>,
    pub target_framework: Option<String>,
}

impl Usage {
    /// A direct reference from the manifest itself.
    pub fn explicit() -> Self {
        Self {
            explicit: true,
            ..Self::default()
        }
    }

    /// A dependency pulled in by `parent_id`.
    pub fn transitive(parent_id: impl Into<ComponentId>) -> Self {
        Self {
            parent_id: Some(parent_id.into()),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<ComponentId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_development(mut self, development: bool) -> Self {
        self.development = Some(development);
        self
    }

    pub fn with_scope(mut self, scope: DependencyScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_target_framework(mut self, framework: impl Into<String>) -> Self {
        self.target_framework = Some(framework.into());
        self
    }
}

/// Records the components found in a single manifest file.
#[derive(Debug)]
pub struct SingleFileComponentRecorder {
    location: String,
    components: DashMap<ComponentId, DetectedComponent>,
    graph: Arc<DependencyGraph>,
}

impl SingleFileComponentRecorder {
    fn new(location: String, manual_root_tracking: bool, rule: DevDependencyMergeRule) -> Self {
        Self {
            location,
            components: DashMap::new(),
            graph: Arc::new(DependencyGraph::with_merge_rule(manual_root_tracking, rule)),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Registers one observation of `detected`.
    ///
    /// The first registration of an id is the one stored; later ones only add
    /// target frameworks. Graph flags and edges always merge.
    pub fn register_usage(&self, detected: DetectedComponent, usage: Usage) {
        let id = detected.id();
        let Usage {
            explicit,
            parent_id,
            development,
            scope,
            target_framework,
        } = usage;

        let incoming_frameworks = detected.target_frameworks.clone();
        let mut stored = self.components.entry(id.clone()).or_insert(detected);
        stored.target_frameworks.extend(incoming_frameworks);
        if let Some(framework) = target_framework {
            stored.target_frameworks.insert(framework);
        }
        drop(stored);

        self.graph.add_component(
            GraphNode {
                id,
                is_explicit: explicit,
                development,
                scope,
            },
            parent_id.as_deref(),
        );
    }

    pub fn register_package_parse_failure(&self, raw: impl Into<String>) {
        self.graph.register_parse_failure(raw);
    }

    /// Adds a file that should be reported as a location of every component
    /// in this manifest, such as the manifest next to a lock file.
    pub fn add_additional_related_file(&self, path: impl Into<String>) {
        self.graph.add_additional_related_file(path);
    }

    pub fn get_component(&self, id: &str) -> Option<TypedComponent> {
        self.components.get(id).map(|c| c.component.clone())
    }

    /// Components registered in this file, sorted by id.
    pub fn detected_components(&self) -> Vec<DetectedComponent> {
        let mut components: Vec<DetectedComponent> =
            self.components.iter().map(|c| c.value().clone()).collect();
        components.sort_by_key(|c| c.id());
        components
    }

    pub fn dependency_graph(&self) -> &Arc<DependencyGraph> {
        &self.graph
    }
}

/// One component as seen across every file of a recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentGrouping {
    pub component_id: ComponentId,
    /// Locations whose graph contains the component.
    pub found_in_graphs: Vec<String>,
    /// Those locations plus their additional related files.
    pub all_file_locations: BTreeSet<String>,
    pub explicit_parent_ids: BTreeSet<ComponentId>,
}

/// Owns the single-file recorders of one detector run.
#[derive(Debug)]
pub struct ComponentRecorder {
    recorders: DashMap<String, Arc<SingleFileComponentRecorder>>,
    manual_root_tracking: bool,
    merge_rule: DevDependencyMergeRule,
}

impl Default for ComponentRecorder {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ComponentRecorder {
    pub fn new(manual_root_tracking: bool) -> Self {
        Self::with_merge_rule(manual_root_tracking, DevDependencyMergeRule::default())
    }

    pub fn with_merge_rule(manual_root_tracking: bool, merge_rule: DevDependencyMergeRule) -> Self {
        Self {
            recorders: DashMap::new(),
            manual_root_tracking,
            merge_rule,
        }
    }

    pub fn merge_rule(&self) -> DevDependencyMergeRule {
        self.merge_rule
    }

    /// Returns the recorder for `location`, creating it on first use.
    ///
    /// Concurrent callers asking for the same location get the same recorder.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidLocation`] if `location` is blank.
    pub fn create_single_file_component_recorder(
        &self,
        location: impl AsRef<str>,
    ) -> Result<Arc<SingleFileComponentRecorder>, DetectionError> {
        let location = location.as_ref();
        if location.trim().is_empty() {
            return Err(DetectionError::InvalidLocation(location.to_string()));
        }

        let recorder = self
            .recorders
            .entry(location.to_string())
            .or_insert_with(|| {
                Arc::new(SingleFileComponentRecorder::new(
                    location.to_string(),
                    self.manual_root_tracking,
                    self.merge_rule,
                ))
            })
            .clone();
        Ok(recorder)
    }

    /// Snapshot of every single-file recorder, sorted by location.
    fn snapshot(&self) -> Vec<Arc<SingleFileComponentRecorder>> {
        let mut recorders: Vec<_> = self.recorders.iter().map(|r| Arc::clone(r.value())).collect();
        recorders.sort_by(|a, b| a.location.cmp(&b.location));
        recorders
    }

    /// Looks a component up by id across every file.
    pub fn get_component(&self, id: &str) -> Option<TypedComponent> {
        self.snapshot().iter().find_map(|r| r.get_component(id))
    }

    /// One merged [`DetectedComponent`] per id, sorted by id.
    ///
    /// File paths, roots and target frameworks are unioned across files, the
    /// dev flag follows the recorder's merge rule and a component is explicit
    /// if any file references it explicitly.
    pub fn get_detected_components(&self) -> Vec<DetectedComponent> {
        let mut merged: BTreeMap<ComponentId, DetectedComponent> = BTreeMap::new();

        for recorder in self.snapshot() {
            let graph = recorder.dependency_graph();
            let related = graph.additional_related_files();

            for mut component in recorder.detected_components() {
                let id = component.id();
                if !graph.contains(&id) {
                    continue;
                }

                component.file_paths.insert(recorder.location.clone());
                component.file_paths.extend(related.iter().cloned());
                component.development_dependency = graph.is_development_dependency(&id);
                component.dependency_scope = graph.dependency_scope(&id);
                component.is_explicit_referenced_dependency =
                    graph.is_component_explicitly_referenced(&id);

                let roots = graph
                    .explicit_referenced_dependency_ids(&id)
                    .unwrap_or_default();
                component.dependency_roots.extend(
                    roots
                        .iter()
                        .filter_map(|root| recorder.get_component(root)),
                );

                match merged.get_mut(&id) {
                    Some(existing) => existing.merge(&component, self.merge_rule),
                    None => {
                        merged.insert(id, component);
                    }
                }
            }
        }

        merged.into_values().collect()
    }

    /// Distinct parse failures across every file.
    pub fn get_skipped_components(&self) -> BTreeSet<String> {
        self.snapshot()
            .iter()
            .flat_map(|r| r.dependency_graph().parse_failures())
            .collect()
    }

    /// Graphs that contain at least one component, keyed by location.
    pub fn get_dependency_graphs_by_location(&self) -> BTreeMap<String, Arc<DependencyGraph>> {
        self.snapshot()
            .into_iter()
            .filter(|r| r.dependency_graph().has_components())
            .map(|r| (r.location.clone(), Arc::clone(r.dependency_graph())))
            .collect()
    }

    /// The dev flag of `id` folded across every file that contains it.
    pub fn get_effective_dev_dependency_value(&self, id: &str) -> Option<bool> {
        let values: Vec<Option<bool>> = self
            .snapshot()
            .iter()
            .map(|r| r.dependency_graph())
            .filter(|g| g.contains(id))
            .map(|g| g.is_development_dependency(id))
            .collect();
        self.merge_rule.effective(values)
    }

    /// Calls `visitor` once per component id, in id order.
    pub fn for_all_components<F>(&self, mut visitor: F)
    where
        F: FnMut(&ComponentGrouping),
    {
        let mut groups: BTreeMap<ComponentId, ComponentGrouping> = BTreeMap::new();

        for recorder in self.snapshot() {
            let graph = recorder.dependency_graph();
            let related = graph.additional_related_files();
            for id in graph.components() {
                let group = groups
                    .entry(id.clone())
                    .or_insert_with(|| ComponentGrouping {
                        component_id: id.clone(),
                        found_in_graphs: Vec::new(),
                        all_file_locations: BTreeSet::new(),
                        explicit_parent_ids: BTreeSet::new(),
                    });
                group.found_in_graphs.push(recorder.location.clone());
                group.all_file_locations.insert(recorder.location.clone());
                group.all_file_locations.extend(related.iter().cloned());
                if let Ok(roots) = graph.explicit_referenced_dependency_ids(&id) {
                    group.explicit_parent_ids.extend(roots);
                }
            }
        }

        for group in groups.values() {
            visitor(group);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NpmComponent, NuGetComponent};

    fn npm(name: &str, version: &str) -> DetectedComponent {
        DetectedComponent::new(NpmComponent::new(name, version).unwrap())
    }

    #[test]
    fn test_blank_location_is_rejected() {
        let recorder = ComponentRecorder::default();
        assert!(matches!(
            recorder.create_single_file_component_recorder("   "),
            Err(DetectionError::InvalidLocation(_))
        ));
    }

    #[test]
    fn test_single_file_recorder_is_memoized() {
        let recorder = ComponentRecorder::default();
        let a = recorder
            .create_single_file_component_recorder("/p/package-lock.json")
            .unwrap();
        let b = recorder
            .create_single_file_component_recorder("/p/package-lock.json")
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_first_registration_is_kept() {
        let recorder = ComponentRecorder::default();
        let file = recorder.create_single_file_component_recorder("/p/a").unwrap();

        let mut first = npm("chalk", "5.0.0");
        first
            .additional_metadata
            .insert("origin".to_string(), "first".to_string());
        file.register_usage(first, Usage::explicit());

        let mut second = npm("chalk", "5.0.0");
        second
            .additional_metadata
            .insert("origin".to_string(), "second".to_string());
        file.register_usage(second, Usage::default());

        let stored = file.detected_components();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].additional_metadata["origin"], "first");
    }

    #[test]
    fn test_target_frameworks_union() {
        let recorder = ComponentRecorder::default();
        let file = recorder.create_single_file_component_recorder("/p/a.csproj").unwrap();
        let pkg = DetectedComponent::new(NuGetComponent::new("Newtonsoft.Json", "13.0.1").unwrap());

        file.register_usage(pkg.clone(), Usage::explicit().with_target_framework("net6.0"));
        file.register_usage(pkg, Usage::explicit().with_target_framework("net8.0"));

        let components = recorder.get_detected_components();
        assert_eq!(components.len(), 1);
        assert_eq!(
            components[0].target_frameworks,
            BTreeSet::from(["net6.0".to_string(), "net8.0".to_string()])
        );
    }

    #[test]
    fn test_detected_components_merge_across_files() {
        let recorder = ComponentRecorder::default();
        let a = recorder.create_single_file_component_recorder("/repo/a/package-lock.json").unwrap();
        let b = recorder.create_single_file_component_recorder("/repo/b/package-lock.json").unwrap();
        a.add_additional_related_file("/repo/a/package.json");

        let app = npm("app", "1.0.0");
        let app_id = app.id();
        a.register_usage(app.clone(), Usage::explicit());
        a.register_usage(npm("lodash", "4.17.21"), Usage::transitive(&app_id).with_development(true));

        b.register_usage(npm("lodash", "4.17.21"), Usage::explicit().with_development(false));

        let components = recorder.get_detected_components();
        let ids: Vec<String> = components.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["app 1.0.0 - Npm", "lodash 4.17.21 - Npm"]);

        let lodash = &components[1];
        assert_eq!(
            lodash.file_paths,
            BTreeSet::from([
                "/repo/a/package-lock.json".to_string(),
                "/repo/a/package.json".to_string(),
                "/repo/b/package-lock.json".to_string(),
            ])
        );
        assert!(lodash.is_explicit_referenced_dependency);
        assert_eq!(lodash.development_dependency, Some(false));
        assert!(lodash.dependency_roots.contains(&app.component));
        assert!(lodash.dependency_roots.contains(&lodash.component));
    }

    #[test]
    fn test_roots_deduplicated_by_identity_across_files() {
        let recorder = ComponentRecorder::default();
        let a = recorder.create_single_file_component_recorder("/a/package-lock.json").unwrap();
        let b = recorder.create_single_file_component_recorder("/b/package-lock.json").unwrap();

        let hashed_app = DetectedComponent::new(
            NpmComponent::new("app", "1.0.0").unwrap().with_hash("sha512-abc"),
        );
        let app_id = hashed_app.id();
        a.register_usage(hashed_app, Usage::explicit());
        a.register_usage(npm("dep", "2.0.0"), Usage::transitive(&app_id));

        b.register_usage(npm("app", "1.0.0"), Usage::explicit());
        b.register_usage(npm("dep", "2.0.0"), Usage::transitive(&app_id));

        let components = recorder.get_detected_components();
        let dep = components.iter().find(|c| c.id() == "dep 2.0.0 - Npm").unwrap();
        let roots: Vec<String> = dep.dependency_roots.iter().map(|r| r.id()).collect();
        assert_eq!(roots, vec!["app 1.0.0 - Npm"]);
    }

    #[test]
    fn test_effective_dev_dependency_value() {
        let recorder = ComponentRecorder::default();
        let a = recorder.create_single_file_component_recorder("a").unwrap();
        let b = recorder.create_single_file_component_recorder("b").unwrap();
        let c = recorder.create_single_file_component_recorder("c").unwrap();
        let pkg = npm("jest", "29.0.0");
        let id = pkg.id();

        a.register_usage(pkg.clone(), Usage::explicit());
        assert_eq!(recorder.get_effective_dev_dependency_value(&id), None);
        b.register_usage(pkg.clone(), Usage::explicit().with_development(true));
        assert_eq!(recorder.get_effective_dev_dependency_value(&id), Some(true));
        c.register_usage(pkg, Usage::explicit().with_development(false));
        assert_eq!(recorder.get_effective_dev_dependency_value(&id), Some(false));
        assert_eq!(recorder.get_effective_dev_dependency_value("missing"), None);
    }

    #[test]
    fn test_graphs_by_location_skip_empty_graphs() {
        let recorder = ComponentRecorder::default();
        let empty = recorder.create_single_file_component_recorder("/empty").unwrap();
        empty.register_package_parse_failure("garbage line");
        let full = recorder.create_single_file_component_recorder("/full").unwrap();
        full.register_usage(npm("a", "1.0.0"), Usage::explicit());

        let graphs = recorder.get_dependency_graphs_by_location();
        assert_eq!(graphs.keys().collect::<Vec<_>>(), vec!["/full"]);
        assert_eq!(
            recorder.get_skipped_components(),
            BTreeSet::from(["garbage line".to_string()])
        );
    }

    #[test]
    fn test_get_component_across_files() {
        let recorder = ComponentRecorder::default();
        let file = recorder.create_single_file_component_recorder("/x").unwrap();
        let pkg = npm("react", "18.2.0");
        let id = pkg.id();
        file.register_usage(pkg.clone(), Usage::explicit());

        assert_eq!(recorder.get_component(&id), Some(pkg.component));
        assert_eq!(recorder.get_component("nope"), None);
    }

    #[test]
    fn test_for_all_components_groups_by_id() {
        let recorder = ComponentRecorder::default();
        let a = recorder.create_single_file_component_recorder("/a").unwrap();
        let b = recorder.create_single_file_component_recorder("/b").unwrap();
        a.add_additional_related_file("/a.meta");

        let root = npm("root", "1.0.0");
        let root_id = root.id();
        a.register_usage(root, Usage::explicit());
        a.register_usage(npm("dep", "1.0.0"), Usage::transitive(&root_id));
        b.register_usage(npm("dep", "1.0.0"), Usage::default());

        let mut seen = Vec::new();
        recorder.for_all_components(|group| seen.push(group.clone()));

        assert_eq!(seen.len(), 2);
        let dep = &seen[0];
        assert_eq!(dep.component_id, "dep 1.0.0 - Npm");
        assert_eq!(dep.found_in_graphs, vec!["/a", "/b"]);
        assert!(dep.all_file_locations.contains("/a.meta"));
        assert_eq!(dep.explicit_parent_ids, BTreeSet::from([root_id]));
    }

    #[test]
    fn test_automatic_root_recorder() {
        let recorder = ComponentRecorder::new(false);
        let file = recorder.create_single_file_component_recorder("/lock").unwrap();
        let top = npm("top", "1.0.0");
        let top_id = top.id();
        file.register_usage(top, Usage::default());
        file.register_usage(npm("inner", "1.0.0"), Usage::explicit().with_parent(&top_id));

        let components = recorder.get_detected_components();
        let inner = components.iter().find(|c| c.id() == "inner 1.0.0 - Npm").unwrap();
        let top = components.iter().find(|c| c.id() == top_id).unwrap();
        assert!(top.is_explicit_referenced_dependency);
        assert!(!inner.is_explicit_referenced_dependency);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration_from_many_tasks() {
        let recorder = Arc::new(ComponentRecorder::default());
        let mut handles = Vec::new();

        for task in 0..16 {
            let recorder = Arc::clone(&recorder);
            handles.push(tokio::spawn(async move {
                let file = recorder
                    .create_single_file_component_recorder(format!("/files/{}", task % 4))
                    .unwrap();
                let root = npm("root", "1.0.0");
                let root_id = root.id();
                file.register_usage(root, Usage::explicit());
                for i in 0..25 {
                    file.register_usage(
                        npm(&format!("dep{}", i), "1.0.0"),
                        Usage::transitive(&root_id).with_development(task % 2 == 0),
                    );
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(recorder.get_dependency_graphs_by_location().len(), 4);
        let components = recorder.get_detected_components();
        assert_eq!(components.len(), 26);
        for c in components.iter().filter(|c| c.id() != "root 1.0.0 - Npm") {
            assert_eq!(c.file_paths.len(), 4);
            // Odd-numbered files only ever saw production registrations
            assert_eq!(c.development_dependency, Some(false));
        }
    }
}
