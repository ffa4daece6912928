//! Per-manifest dependency graphs and the recorders detectors write into.
//!
//! A [`DependencyGraph`] holds every component found in one manifest file,
//! keyed by component id, with parent/child edges between them. Detectors never
//! touch a graph directly; they go through a
//! [`SingleFileComponentRecorder`](recorder::SingleFileComponentRecorder)
//! obtained from the detector's [`ComponentRecorder`](recorder::ComponentRecorder).
//!
//! All mutation goes through `dashmap` entries, so a graph can be written from
//! many tasks at once. Edge insertion is two set inserts, which commute, so the
//! final graph does not depend on registration order.

pub mod recorder;

use crate::error::DetectionError;
use crate::model::{ComponentId, DependencyScope, DevDependencyMergeRule};
use dashmap::{DashMap, DashSet};
use std::collections::{BTreeSet, VecDeque};
use tracing::warn;

/// What a caller knows about a component when adding it to a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: ComponentId,
    pub is_explicit: bool,
    pub development: Option<bool>,
    pub scope: Option<DependencyScope>,
}

impl GraphNode {
    pub fn new(id: impl Into<ComponentId>) -> Self {
        Self {
            id: id.into(),
            is_explicit: false,
            development: None,
            scope: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Node {
    parents: BTreeSet<ComponentId>,
    children: BTreeSet<ComponentId>,
    is_explicit: bool,
    development: Option<bool>,
    scope: Option<DependencyScope>,
}

/// Directed dependency graph for a single manifest file.
#[derive(Debug)]
pub struct DependencyGraph {
    nodes: DashMap<ComponentId, Node>,
    parse_failures: DashSet<String>,
    additional_related_files: DashSet<String>,
    manual_root_tracking: bool,
    merge_rule: DevDependencyMergeRule,
}

impl DependencyGraph {
    /// Creates an empty graph.
    ///
    /// With `manual_root_tracking` disabled, the explicit flag passed by
    /// detectors is ignored and a component counts as explicitly referenced
    /// exactly when it has no parents.
    pub fn new(manual_root_tracking: bool) -> Self {
        Self::with_merge_rule(manual_root_tracking, DevDependencyMergeRule::default())
    }

    pub fn with_merge_rule(manual_root_tracking: bool, merge_rule: DevDependencyMergeRule) -> Self {
        Self {
            nodes: DashMap::new(),
            parse_failures: DashSet::new(),
            additional_related_files: DashSet::new(),
            manual_root_tracking,
            merge_rule,
        }
    }

    pub fn manual_root_tracking(&self) -> bool {
        self.manual_root_tracking
    }

    /// Inserts `node` or merges it into the existing node with the same id,
    /// then links it under `parent_id` if one is given.
    ///
    /// A parent that is not in the graph yet is reported as a parse failure
    /// and the edge is dropped; the child is kept.
    pub fn add_component(&self, node: GraphNode, parent_id: Option<&str>) {
        let GraphNode {
            id,
            is_explicit,
            development,
            scope,
        } = node;
        let rule = self.merge_rule;

        self.nodes
            .entry(id.clone())
            .and_modify(|existing| {
                existing.is_explicit |= is_explicit;
                existing.development = rule.merge(existing.development, development);
                existing.scope = DependencyScope::merge(existing.scope, scope);
            })
            .or_insert_with(|| Node {
                is_explicit,
                development,
                scope,
                ..Node::default()
            });

        let Some(parent_id) = parent_id else {
            return;
        };

        if parent_id == id {
            warn!(component = %id, "Ignoring self-referencing dependency edge");
            return;
        }

        // Only one map guard is held at a time; parent and child may share a shard.
        let linked = match self.nodes.get_mut(parent_id) {
            Some(mut parent) => {
                parent.children.insert(id.clone());
                true
            }
            None => false,
        };

        if !linked {
            warn!(
                parent = %parent_id,
                component = %id,
                "Parent component is not present in the dependency graph"
            );
            self.register_parse_failure(format!(
                "missing parent '{}' for '{}'",
                parent_id, id
            ));
            return;
        }

        if let Some(mut child) = self.nodes.get_mut(&id) {
            child.parents.insert(parent_id.to_string());
        }
    }

    pub fn register_parse_failure(&self, raw: impl Into<String>) {
        self.parse_failures.insert(raw.into());
    }

    pub fn add_additional_related_file(&self, path: impl Into<String>) {
        self.additional_related_files.insert(path.into());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn has_components(&self) -> bool {
        !self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All component ids, sorted.
    pub fn components(&self) -> Vec<ComponentId> {
        let mut ids: Vec<ComponentId> = self.nodes.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Direct dependencies of `id`, or `None` if it is not in the graph.
    pub fn dependencies_for_component(&self, id: &str) -> Option<Vec<ComponentId>> {
        self.nodes
            .get(id)
            .map(|node| node.children.iter().cloned().collect())
    }

    /// Direct dependents of `id`, or `None` if it is not in the graph.
    pub fn parents_of(&self, id: &str) -> Option<Vec<ComponentId>> {
        self.nodes
            .get(id)
            .map(|node| node.parents.iter().cloned().collect())
    }

    pub fn is_development_dependency(&self, id: &str) -> Option<bool> {
        self.nodes.get(id).and_then(|node| node.development)
    }

    pub fn dependency_scope(&self, id: &str) -> Option<DependencyScope> {
        self.nodes.get(id).and_then(|node| node.scope)
    }

    pub fn is_component_explicitly_referenced(&self, id: &str) -> bool {
        match self.nodes.get(id) {
            Some(node) if self.manual_root_tracking => node.is_explicit,
            Some(node) => node.parents.is_empty(),
            None => false,
        }
    }

    pub fn all_explicitly_referenced_components(&self) -> BTreeSet<ComponentId> {
        self.nodes
            .iter()
            .filter(|entry| {
                if self.manual_root_tracking {
                    entry.is_explicit
                } else {
                    entry.parents.is_empty()
                }
            })
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// The explicitly referenced components that `id` is reachable from,
    /// including `id` itself when it is explicit.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::MissingNode`] if `id` is empty or unknown.
    pub fn explicit_referenced_dependency_ids(
        &self,
        id: &str,
    ) -> Result<BTreeSet<ComponentId>, DetectionError> {
        if id.is_empty() || !self.contains(id) {
            return Err(DetectionError::MissingNode(id.to_string()));
        }

        let mut roots = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut stack = vec![id.to_string()];

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if self.is_component_explicitly_referenced(&current) {
                roots.insert(current.clone());
            }
            // Clone the parent set so no guard is held while walking further.
            let parents = self
                .nodes
                .get(&current)
                .map(|node| node.parents.clone())
                .unwrap_or_default();
            stack.extend(parents.into_iter().filter(|p| !visited.contains(p)));
        }

        Ok(roots)
    }

    /// Every transitive dependent of `id`, nearest first, excluding `id`.
    ///
    /// A component that is not in the graph has no ancestors.
    pub fn ancestors(&self, id: &str) -> Vec<ComponentId> {
        if !self.contains(id) {
            return Vec::new();
        }

        let mut ordered = Vec::new();
        let mut visited = BTreeSet::from([id.to_string()]);
        let mut queue = VecDeque::from([id.to_string()]);

        while let Some(current) = queue.pop_front() {
            let parents = self
                .nodes
                .get(&current)
                .map(|node| node.parents.clone())
                .unwrap_or_default();
            for parent in parents {
                if visited.insert(parent.clone()) {
                    ordered.push(parent.clone());
                    queue.push_back(parent);
                }
            }
        }

        ordered
    }

    pub fn additional_related_files(&self) -> BTreeSet<String> {
        self.additional_related_files
            .iter()
            .map(|f| f.key().clone())
            .collect()
    }

    pub fn parse_failures(&self) -> BTreeSet<String> {
        self.parse_failures.iter().map(|f| f.key().clone()).collect()
    }
}
