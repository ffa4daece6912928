pub mod config;
pub mod detector;
pub mod error;
pub mod graph;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod pattern;
pub mod telemetry;

pub use config::Config;
pub use detector::{all_detectors, get_detector, Detector, DetectorClass, ScanRequest};
pub use error::DetectionError;
pub use graph::recorder::{ComponentRecorder, SingleFileComponentRecorder, Usage};
pub use graph::DependencyGraph;
pub use model::{DetectedComponent, ProcessingResultCode, ScanResult, TypedComponent};
pub use orchestrator::{DetectionArguments, ScanExecutionService};
