use super::component::{ComponentId, TypedComponent};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Maven dependency scope of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyScope {
    MavenCompile,
    MavenRuntime,
    MavenProvided,
    MavenSystem,
    MavenTest,
}

impl DependencyScope {
    /// Lower value means higher priority.
    fn priority(self) -> u8 {
        match self {
            DependencyScope::MavenCompile => 0,
            DependencyScope::MavenRuntime => 1,
            DependencyScope::MavenProvided => 2,
            DependencyScope::MavenSystem => 3,
            DependencyScope::MavenTest => 4,
        }
    }

    /// Merges two possibly-unknown scopes, keeping the higher-priority one.
    pub fn merge(current: Option<Self>, incoming: Option<Self>) -> Option<Self> {
        match (current, incoming) {
            (None, other) | (other, None) => other,
            (Some(a), Some(b)) => Some(if b.priority() < a.priority() { b } else { a }),
        }
    }
}

/// How conflicting development-dependency observations combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DevDependencyMergeRule {
    /// A single production observation makes the component production.
    #[default]
    ProductionWins,
    /// A single development observation makes the component development.
    DevelopmentWins,
}

impl DevDependencyMergeRule {
    /// Merges two tri-state dev flags. Unknown never overrides a known value.
    pub fn merge(self, current: Option<bool>, incoming: Option<bool>) -> Option<bool> {
        match (current, incoming) {
            (None, other) | (other, None) => other,
            (Some(a), Some(b)) => Some(match self {
                DevDependencyMergeRule::ProductionWins => a && b,
                DevDependencyMergeRule::DevelopmentWins => a || b,
            }),
        }
    }

    /// Folds every observation of a component into one effective value.
    pub fn effective<I>(self, values: I) -> Option<bool>
    where
        I: IntoIterator<Item = Option<bool>>,
    {
        values
            .into_iter()
            .fold(None, |acc, value| self.merge(acc, value))
    }
}

impl std::str::FromStr for DevDependencyMergeRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production-wins" | "production" => Ok(DevDependencyMergeRule::ProductionWins),
            "development-wins" | "development" => Ok(DevDependencyMergeRule::DevelopmentWins),
            _ => Err(format!("Unknown dev dependency merge rule: {}", s)),
        }
    }
}

/// Components keyed by identity.
///
/// Two observations of the same component that differ only in metadata such
/// as an integrity hash are one entry; the first one inserted is kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<TypedComponent>", into = "Vec<TypedComponent>")]
pub struct ComponentSet(BTreeMap<ComponentId, TypedComponent>);

impl ComponentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if a component with the same id was already present.
    pub fn insert(&mut self, component: TypedComponent) -> bool {
        match self.0.entry(component.id()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(component);
                true
            }
        }
    }

    pub fn contains(&self, component: &TypedComponent) -> bool {
        self.0.contains_key(&component.id())
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypedComponent> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Extend<TypedComponent> for ComponentSet {
    fn extend<I: IntoIterator<Item = TypedComponent>>(&mut self, iter: I) {
        for component in iter {
            self.insert(component);
        }
    }
}

impl FromIterator<TypedComponent> for ComponentSet {
    fn from_iter<I: IntoIterator<Item = TypedComponent>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl From<Vec<TypedComponent>> for ComponentSet {
    fn from(components: Vec<TypedComponent>) -> Self {
        components.into_iter().collect()
    }
}

impl From<ComponentSet> for Vec<TypedComponent> {
    fn from(set: ComponentSet) -> Self {
        set.0.into_values().collect()
    }
}

/// A component as observed by detectors, with the metadata that merges across
/// files and detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedComponent {
    pub component: TypedComponent,
    #[serde(default)]
    pub file_paths: BTreeSet<String>,
    #[serde(default)]
    pub dependency_roots: ComponentSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub development_dependency: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency_scope: Option<DependencyScope>,
    #[serde(default)]
    pub is_explicit_referenced_dependency: bool,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub target_frameworks: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub detector_ids: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_metadata: BTreeMap<String, String>,
}

impl DetectedComponent {
    pub fn new(component: impl Into<TypedComponent>) -> Self {
        Self {
            component: component.into(),
            file_paths: BTreeSet::new(),
            dependency_roots: ComponentSet::new(),
            development_dependency: None,
            dependency_scope: None,
            is_explicit_referenced_dependency: false,
            target_frameworks: BTreeSet::new(),
            detector_ids: BTreeSet::new(),
            additional_metadata: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> ComponentId {
        self.component.id()
    }

    /// Folds another observation of the same component into this one.
    ///
    /// Set-valued fields are unioned, the explicit flag is ORed, the dev flag
    /// follows `rule` and the scope keeps the higher-priority value.
    pub fn merge(&mut self, other: &DetectedComponent, rule: DevDependencyMergeRule) {
        debug_assert_eq!(self.id(), other.id());

        self.file_paths.extend(other.file_paths.iter().cloned());
        self.dependency_roots
            .extend(other.dependency_roots.iter().cloned());
        self.target_frameworks
            .extend(other.target_frameworks.iter().cloned());
        self.detector_ids.extend(other.detector_ids.iter().cloned());
        for (key, value) in &other.additional_metadata {
            self.additional_metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        self.development_dependency =
            rule.merge(self.development_dependency, other.development_dependency);
        self.dependency_scope = DependencyScope::merge(self.dependency_scope, other.dependency_scope);
        self.is_explicit_referenced_dependency |= other.is_explicit_referenced_dependency;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CargoComponent, NpmComponent};

    fn npm(name: &str) -> DetectedComponent {
        DetectedComponent::new(NpmComponent::new(name, "1.0.0").unwrap())
    }

    #[test]
    fn test_production_wins() {
        let rule = DevDependencyMergeRule::ProductionWins;
        assert_eq!(rule.merge(None, Some(true)), Some(true));
        assert_eq!(rule.merge(Some(true), None), Some(true));
        assert_eq!(rule.merge(Some(true), Some(false)), Some(false));
        assert_eq!(rule.merge(Some(false), Some(true)), Some(false));
        assert_eq!(rule.merge(None, None), None);
    }

    #[test]
    fn test_development_wins() {
        let rule = DevDependencyMergeRule::DevelopmentWins;
        assert_eq!(rule.merge(Some(false), Some(true)), Some(true));
        assert_eq!(rule.merge(Some(false), None), Some(false));
    }

    #[test]
    fn test_effective_tri_state_sequence() {
        let rule = DevDependencyMergeRule::default();
        assert_eq!(rule.effective([None, Some(true), Some(false)]), Some(false));
        assert_eq!(rule.effective([None, Some(true), None]), Some(true));
        assert_eq!(rule.effective([None, None]), None);
        assert_eq!(rule.effective(Vec::new()), None);
    }

    #[test]
    fn test_scope_priority() {
        use DependencyScope::*;
        assert_eq!(
            DependencyScope::merge(Some(MavenTest), Some(MavenCompile)),
            Some(MavenCompile)
        );
        assert_eq!(
            DependencyScope::merge(Some(MavenRuntime), Some(MavenProvided)),
            Some(MavenRuntime)
        );
        assert_eq!(DependencyScope::merge(None, Some(MavenTest)), Some(MavenTest));
        assert_eq!(DependencyScope::merge(Some(MavenSystem), None), Some(MavenSystem));
    }

    #[test]
    fn test_merge_unions_and_ors() {
        let root = TypedComponent::from(CargoComponent::new("app", "0.1.0").unwrap());

        let mut a = npm("chalk");
        a.file_paths.insert("/a/package-lock.json".to_string());
        a.development_dependency = Some(true);

        let mut b = npm("chalk");
        b.file_paths.insert("/b/package-lock.json".to_string());
        b.dependency_roots.insert(root.clone());
        b.development_dependency = Some(false);
        b.is_explicit_referenced_dependency = true;
        b.detector_ids.insert("NpmWithRoots".to_string());

        a.merge(&b, DevDependencyMergeRule::ProductionWins);

        assert_eq!(a.file_paths.len(), 2);
        assert!(a.dependency_roots.contains(&root));
        assert_eq!(a.development_dependency, Some(false));
        assert!(a.is_explicit_referenced_dependency);
        assert!(a.detector_ids.contains("NpmWithRoots"));
    }

    #[test]
    fn test_merge_rule_from_str() {
        assert_eq!(
            "production-wins".parse::<DevDependencyMergeRule>().unwrap(),
            DevDependencyMergeRule::ProductionWins
        );
        assert_eq!(
            "Development".parse::<DevDependencyMergeRule>().unwrap(),
            DevDependencyMergeRule::DevelopmentWins
        );
        assert!("sometimes".parse::<DevDependencyMergeRule>().is_err());
    }

    #[test]
    fn test_roots_are_unique_by_id() {
        let hashed = TypedComponent::from(
            NpmComponent::new("app", "1.0.0")
                .unwrap()
                .with_hash("sha512-abc"),
        );
        let plain = TypedComponent::from(NpmComponent::new("app", "1.0.0").unwrap());

        let mut a = npm("dep");
        a.dependency_roots.insert(hashed.clone());
        let mut b = npm("dep");
        b.dependency_roots.insert(plain.clone());

        a.merge(&b, DevDependencyMergeRule::ProductionWins);

        assert_eq!(a.dependency_roots.len(), 1);
        assert!(a.dependency_roots.contains(&plain));
        assert_eq!(a.dependency_roots.iter().next(), Some(&hashed));
    }

    #[test]
    fn test_roots_serialize_as_list() {
        let mut dep = npm("dep");
        dep.dependency_roots.insert(TypedComponent::from(NpmComponent::new("app", "1.0.0").unwrap()));

        let json = serde_json::to_value(&dep).unwrap();
        assert!(json["dependencyRoots"].is_array());
        assert_eq!(json["dependencyRoots"].as_array().unwrap().len(), 1);

        let back: DetectedComponent = serde_json::from_value(json).unwrap();
        assert!(back.dependency_roots.contains_id("app 1.0.0 - Npm"));
    }
}
