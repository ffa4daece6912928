use crate::error::DetectionError;
use serde::{Deserialize, Serialize};

/// Identifier of a component, unique across ecosystems.
pub type ComponentId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentType {
    Npm,
    NuGet,
    Pip,
    Go,
    Cargo,
    Maven,
    RubyGems,
    Other,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Npm => "Npm",
            ComponentType::NuGet => "NuGet",
            ComponentType::Pip => "Pip",
            ComponentType::Go => "Go",
            ComponentType::Cargo => "Cargo",
            ComponentType::Maven => "Maven",
            ComponentType::RubyGems => "RubyGems",
            ComponentType::Other => "Other",
        }
    }
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn require(
    value: impl Into<String>,
    field: &'static str,
    component_type: ComponentType,
) -> Result<String, DetectionError> {
    let value = value.into();
    if value.trim().is_empty() {
        return Err(DetectionError::InvalidComponent {
            field,
            component_type: component_type.as_str(),
        });
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NpmComponent {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl NpmComponent {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self, DetectionError> {
        Ok(Self {
            name: require(name, "name", ComponentType::Npm)?,
            version: require(version, "version", ComponentType::Npm)?,
            hash: None,
        })
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NuGetComponent {
    pub name: String,
    pub version: String,
}

impl NuGetComponent {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self, DetectionError> {
        Ok(Self {
            name: require(name, "name", ComponentType::NuGet)?,
            version: require(version, "version", ComponentType::NuGet)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PipComponent {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

impl PipComponent {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self, DetectionError> {
        Ok(Self {
            name: require(name, "name", ComponentType::Pip)?,
            version: require(version, "version", ComponentType::Pip)?,
            author: None,
            license: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GoComponent {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl GoComponent {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self, DetectionError> {
        Ok(Self {
            name: require(name, "name", ComponentType::Go)?,
            version: require(version, "version", ComponentType::Go)?,
            hash: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CargoComponent {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl CargoComponent {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self, DetectionError> {
        Ok(Self {
            name: require(name, "name", ComponentType::Cargo)?,
            version: require(version, "version", ComponentType::Cargo)?,
            source: None,
        })
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MavenComponent {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl MavenComponent {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self, DetectionError> {
        Ok(Self {
            group_id: require(group_id, "groupId", ComponentType::Maven)?,
            artifact_id: require(artifact_id, "artifactId", ComponentType::Maven)?,
            version: require(version, "version", ComponentType::Maven)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RubyGemsComponent {
    pub name: String,
    pub version: String,
}

impl RubyGemsComponent {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self, DetectionError> {
        Ok(Self {
            name: require(name, "name", ComponentType::RubyGems)?,
            version: require(version, "version", ComponentType::RubyGems)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtherComponent {
    pub name: String,
    pub version: String,
    pub download_url: String,
}

impl OtherComponent {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        download_url: impl Into<String>,
    ) -> Result<Self, DetectionError> {
        Ok(Self {
            name: require(name, "name", ComponentType::Other)?,
            version: require(version, "version", ComponentType::Other)?,
            download_url: require(download_url, "downloadUrl", ComponentType::Other)?,
        })
    }
}

/// The identity of one package in one ecosystem.
///
/// Two values with identical identity fields always yield the same [`id`](Self::id),
/// no matter which detector or which file produced them.
///
/// # Example
///
/// ```
/// use compscan::model::{CargoComponent, TypedComponent};
///
/// let serde = TypedComponent::from(CargoComponent::new("serde", "1.0.0").unwrap());
/// assert_eq!(serde.id(), "serde 1.0.0 - Cargo");
/// assert_eq!(serde.purl(), "pkg:cargo/serde@1.0.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TypedComponent {
    Npm(NpmComponent),
    NuGet(NuGetComponent),
    Pip(PipComponent),
    Go(GoComponent),
    Cargo(CargoComponent),
    Maven(MavenComponent),
    RubyGems(RubyGemsComponent),
    Other(OtherComponent),
}

impl TypedComponent {
    pub fn component_type(&self) -> ComponentType {
        match self {
            TypedComponent::Npm(_) => ComponentType::Npm,
            TypedComponent::NuGet(_) => ComponentType::NuGet,
            TypedComponent::Pip(_) => ComponentType::Pip,
            TypedComponent::Go(_) => ComponentType::Go,
            TypedComponent::Cargo(_) => ComponentType::Cargo,
            TypedComponent::Maven(_) => ComponentType::Maven,
            TypedComponent::RubyGems(_) => ComponentType::RubyGems,
            TypedComponent::Other(_) => ComponentType::Other,
        }
    }

    /// Deterministic id derived from the identity fields.
    ///
    /// Pip ids are lower-cased because package names are case-insensitive there.
    pub fn id(&self) -> ComponentId {
        let kind = self.component_type();
        match self {
            TypedComponent::Npm(c) => format!("{} {} - {}", c.name, c.version, kind),
            TypedComponent::NuGet(c) => format!("{} {} - {}", c.name, c.version, kind),
            TypedComponent::Pip(c) => {
                format!("{} {} - {}", c.name, c.version, kind).to_lowercase()
            }
            TypedComponent::Go(c) => format!("{} {} - {}", c.name, c.version, kind),
            TypedComponent::Cargo(c) => format!("{} {} - {}", c.name, c.version, kind),
            TypedComponent::Maven(c) => {
                format!("{} {} {} - {}", c.group_id, c.artifact_id, c.version, kind)
            }
            TypedComponent::RubyGems(c) => format!("{} {} - {}", c.name, c.version, kind),
            TypedComponent::Other(c) => {
                format!("{} {} {} - {}", c.name, c.version, c.download_url, kind)
            }
        }
    }

    /// Package URL for the component.
    pub fn purl(&self) -> String {
        match self {
            TypedComponent::Npm(c) => format!("pkg:npm/{}@{}", c.name, c.version),
            TypedComponent::NuGet(c) => format!("pkg:nuget/{}@{}", c.name, c.version),
            TypedComponent::Pip(c) => format!("pkg:pypi/{}@{}", c.name, c.version),
            // Go prefers the commit hash over the version when one is known
            TypedComponent::Go(c) => format!(
                "pkg:golang/{}@{}",
                c.name,
                c.hash.as_deref().unwrap_or(&c.version)
            ),
            TypedComponent::Cargo(c) => format!("pkg:cargo/{}@{}", c.name, c.version),
            TypedComponent::Maven(c) => {
                format!("pkg:maven/{}/{}@{}", c.group_id, c.artifact_id, c.version)
            }
            TypedComponent::RubyGems(c) => format!("pkg:gem/{}@{}", c.name, c.version),
            TypedComponent::Other(c) => format!(
                "pkg:generic/{}@{}?download_url={}",
                c.name, c.version, c.download_url
            ),
        }
    }

    pub fn name(&self) -> String {
        match self {
            TypedComponent::Npm(c) => c.name.clone(),
            TypedComponent::NuGet(c) => c.name.clone(),
            TypedComponent::Pip(c) => c.name.clone(),
            TypedComponent::Go(c) => c.name.clone(),
            TypedComponent::Cargo(c) => c.name.clone(),
            TypedComponent::Maven(c) => format!("{}:{}", c.group_id, c.artifact_id),
            TypedComponent::RubyGems(c) => c.name.clone(),
            TypedComponent::Other(c) => c.name.clone(),
        }
    }

    pub fn version(&self) -> &str {
        match self {
            TypedComponent::Npm(c) => &c.version,
            TypedComponent::NuGet(c) => &c.version,
            TypedComponent::Pip(c) => &c.version,
            TypedComponent::Go(c) => &c.version,
            TypedComponent::Cargo(c) => &c.version,
            TypedComponent::Maven(c) => &c.version,
            TypedComponent::RubyGems(c) => &c.version,
            TypedComponent::Other(c) => &c.version,
        }
    }
}

impl std::fmt::Display for TypedComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl From<NpmComponent> for TypedComponent {
    fn from(c: NpmComponent) -> Self {
        TypedComponent::Npm(c)
    }
}

impl From<NuGetComponent> for TypedComponent {
    fn from(c: NuGetComponent) -> Self {
        TypedComponent::NuGet(c)
    }
}

impl From<PipComponent> for TypedComponent {
    fn from(c: PipComponent) -> Self {
        TypedComponent::Pip(c)
    }
}

impl From<GoComponent> for TypedComponent {
    fn from(c: GoComponent) -> Self {
        TypedComponent::Go(c)
    }
}

impl From<CargoComponent> for TypedComponent {
    fn from(c: CargoComponent) -> Self {
        TypedComponent::Cargo(c)
    }
}

impl From<MavenComponent> for TypedComponent {
    fn from(c: MavenComponent) -> Self {
        TypedComponent::Maven(c)
    }
}

impl From<RubyGemsComponent> for TypedComponent {
    fn from(c: RubyGemsComponent) -> Self {
        TypedComponent::RubyGems(c)
    }
}

impl From<OtherComponent> for TypedComponent {
    fn from(c: OtherComponent) -> Self {
        TypedComponent::Other(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_deterministic() {
        let a = TypedComponent::from(NpmComponent::new("lodash", "4.17.21").unwrap());
        let b = TypedComponent::from(NpmComponent::new("lodash", "4.17.21").unwrap());
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id(), "lodash 4.17.21 - Npm");
    }

    #[test]
    fn test_id_ignores_non_identity_fields() {
        let plain = TypedComponent::from(NpmComponent::new("left-pad", "1.3.0").unwrap());
        let hashed = TypedComponent::from(
            NpmComponent::new("left-pad", "1.3.0")
                .unwrap()
                .with_hash("sha512-abc"),
        );
        assert_eq!(plain.id(), hashed.id());
    }

    #[test]
    fn test_pip_id_is_lowercase() {
        let upper = TypedComponent::from(PipComponent::new("Django", "4.2.0").unwrap());
        let lower = TypedComponent::from(PipComponent::new("django", "4.2.0").unwrap());
        assert_eq!(upper.id(), "django 4.2.0 - pip");
        assert_eq!(upper.id(), lower.id());
    }

    #[test]
    fn test_maven_id_includes_group() {
        let c = TypedComponent::from(
            MavenComponent::new("org.apache.commons", "commons-lang3", "3.12.0").unwrap(),
        );
        assert_eq!(c.id(), "org.apache.commons commons-lang3 3.12.0 - Maven");
        assert_eq!(c.name(), "org.apache.commons:commons-lang3");
    }

    #[test]
    fn test_same_name_different_ecosystem_differs() {
        let npm = TypedComponent::from(NpmComponent::new("yaml", "1.0.0").unwrap());
        let cargo = TypedComponent::from(CargoComponent::new("yaml", "1.0.0").unwrap());
        assert_ne!(npm.id(), cargo.id());
    }

    #[test]
    fn test_required_fields_are_validated() {
        assert!(CargoComponent::new("serde", "").is_err());
        assert!(CargoComponent::new("  ", "1.0.0").is_err());
        assert!(MavenComponent::new("", "a", "1").is_err());
        assert!(OtherComponent::new("x", "1", "").is_err());
    }

    #[test]
    fn test_go_purl_prefers_hash() {
        let mut go = GoComponent::new("github.com/pkg/errors", "v0.9.1").unwrap();
        assert_eq!(
            TypedComponent::from(go.clone()).purl(),
            "pkg:golang/github.com/pkg/errors@v0.9.1"
        );
        go.hash = Some("614d223910a1".to_string());
        assert_eq!(
            TypedComponent::from(go).purl(),
            "pkg:golang/github.com/pkg/errors@614d223910a1"
        );
    }

    #[test]
    fn test_serialization_is_tagged() {
        let c = TypedComponent::from(CargoComponent::new("tokio", "1.0.0").unwrap());
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "Cargo");
        assert_eq!(json["name"], "tokio");
        let back: TypedComponent = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }
}
