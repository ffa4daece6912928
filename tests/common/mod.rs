//! Shared detector doubles for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use compscan::detector::{Detector, DetectorClass, IndividualDetectorScanResult, ScanRequest};
use compscan::graph::recorder::Usage;
use compscan::model::{ComponentType, DetectedComponent, NpmComponent};
use std::time::Duration;

/// One registration a [`FakeDetector`] performs.
#[derive(Clone)]
pub struct Registration {
    pub location: &'static str,
    pub name: &'static str,
    pub version: &'static str,
    pub explicit: bool,
    pub development: Option<bool>,
    pub parent: Option<(&'static str, &'static str)>,
}

impl Registration {
    pub fn explicit(location: &'static str, name: &'static str, version: &'static str) -> Self {
        Self {
            location,
            name,
            version,
            explicit: true,
            development: None,
            parent: None,
        }
    }

    pub fn child_of(
        location: &'static str,
        name: &'static str,
        version: &'static str,
        parent: (&'static str, &'static str),
    ) -> Self {
        Self {
            location,
            name,
            version,
            explicit: false,
            development: None,
            parent: Some(parent),
        }
    }

    pub fn development(mut self, development: bool) -> Self {
        self.development = Some(development);
        self
    }
}

pub enum Behavior {
    Register(Vec<Registration>),
    Fail(&'static str),
    Hang,
}

pub struct FakeDetector {
    pub id: &'static str,
    pub categories: Vec<DetectorClass>,
    pub experimental: bool,
    pub default_off: bool,
    pub behavior: Behavior,
}

impl FakeDetector {
    pub fn new(id: &'static str, behavior: Behavior) -> Self {
        Self {
            id,
            categories: vec![DetectorClass::Npm],
            experimental: false,
            default_off: false,
            behavior,
        }
    }

    pub fn experimental(mut self) -> Self {
        self.experimental = true;
        self
    }

    pub fn default_off(mut self) -> Self {
        self.default_off = true;
        self
    }
}

pub fn npm_id(name: &str, version: &str) -> String {
    format!("{} {} - Npm", name, version)
}

#[async_trait]
impl Detector for FakeDetector {
    fn id(&self) -> &str {
        self.id
    }

    fn version(&self) -> u32 {
        1
    }

    fn categories(&self) -> &[DetectorClass] {
        &self.categories
    }

    fn supported_component_types(&self) -> &[ComponentType] {
        &[ComponentType::Npm]
    }

    fn is_experimental(&self) -> bool {
        self.experimental
    }

    fn is_default_off(&self) -> bool {
        self.default_off
    }

    async fn execute(&self, request: ScanRequest) -> anyhow::Result<IndividualDetectorScanResult> {
        match &self.behavior {
            Behavior::Register(registrations) => {
                for r in registrations {
                    let location = request.source_directory.join(r.location.trim_start_matches('/'));
                    let recorder = request
                        .component_recorder
                        .create_single_file_component_recorder(location.to_string_lossy())?;

                    let mut usage = match r.parent {
                        Some((name, version)) => Usage::transitive(npm_id(name, version)),
                        None if r.explicit => Usage::explicit(),
                        None => Usage::default(),
                    };
                    if let Some(development) = r.development {
                        usage = usage.with_development(development);
                    }
                    recorder.register_usage(
                        DetectedComponent::new(NpmComponent::new(r.name, r.version)?),
                        usage,
                    );
                }
                Ok(IndividualDetectorScanResult::success())
            }
            Behavior::Fail(message) => anyhow::bail!("{}", message),
            Behavior::Hang => {
                tokio::select! {
                    _ = request.cancellation.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_secs(60)) => {}
                }
                Ok(IndividualDetectorScanResult::success())
            }
        }
    }
}
