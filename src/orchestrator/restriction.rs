//! Narrowing the detector registry to the detectors a scan should run.

use crate::detector::{Detector, DetectorClass};
use crate::error::DetectionError;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// Ids of detectors that were folded into [`REPLACEMENT_DETECTOR_ID`].
pub const RETIRED_DETECTOR_IDS: [&str; 4] = [
    "MSLicenseDevNpm",
    "MSLicenseDevNpmList",
    "MSLicenseNpm",
    "MSLicenseNpmList",
];

pub const REPLACEMENT_DETECTOR_ID: &str = "NpmWithRoots";

/// Which detectors a scan may run.
///
/// Empty lists mean "no restriction".
#[derive(Debug, Clone, Default)]
pub struct DetectorRestrictions {
    pub allowed_detector_ids: Vec<String>,
    pub allowed_detector_categories: Vec<String>,
    pub explicitly_enabled_detector_ids: BTreeSet<String>,
}

impl DetectorRestrictions {
    pub fn is_explicitly_enabled(&self, id: &str) -> bool {
        self.explicitly_enabled_detector_ids
            .iter()
            .any(|enabled| enabled.eq_ignore_ascii_case(id))
    }
}

fn is_retired(id: &str) -> bool {
    RETIRED_DETECTOR_IDS
        .iter()
        .any(|retired| retired.eq_ignore_ascii_case(id))
}

fn contains_ignore_case(list: &[String], id: &str) -> bool {
    list.iter().any(|item| item.eq_ignore_ascii_case(id))
}

/// Filters `detectors` by `restrictions`, keeping registry order.
///
/// Default-off detectors only survive when explicitly enabled, and explicit
/// enablement bypasses the category filter.
///
/// # Errors
///
/// - [`DetectionError::InvalidDetectorFilter`] if an allowed id matches no detector
/// - [`DetectionError::InvalidDetectorCategories`] if no detector is left after
///   category filtering
pub fn apply_restrictions(
    restrictions: &DetectorRestrictions,
    detectors: Vec<Arc<dyn Detector>>,
) -> Result<Vec<Arc<dyn Detector>>, DetectionError> {
    let (default_off, mut detectors): (Vec<_>, Vec<_>) =
        detectors.into_iter().partition(|d| d.is_default_off());

    if !restrictions.allowed_detector_ids.is_empty() {
        let mut allowed = restrictions.allowed_detector_ids.clone();
        if allowed.iter().any(|id| is_retired(id))
            && !contains_ignore_case(&allowed, REPLACEMENT_DETECTOR_ID)
        {
            allowed.push(REPLACEMENT_DETECTOR_ID.to_string());
        }

        detectors.retain(|d| contains_ignore_case(&allowed, d.id()));

        for id in &allowed {
            if detectors.iter().any(|d| d.id().eq_ignore_ascii_case(id)) {
                continue;
            }
            if !is_retired(id) {
                return Err(DetectionError::InvalidDetectorFilter(id.clone()));
            }
            warn!(
                retired = %id,
                replacement = REPLACEMENT_DETECTOR_ID,
                "Detector has been phased out, running its replacement instead"
            );
        }
    }

    let categories = &restrictions.allowed_detector_categories;
    if !categories.is_empty() && !categories.iter().any(|c| DetectorClass::All.matches(c)) {
        detectors.retain(|d| {
            d.categories().iter().any(|class| {
                *class == DetectorClass::All || categories.iter().any(|c| class.matches(c))
            })
        });
        if detectors.is_empty() {
            return Err(DetectionError::InvalidDetectorCategories(categories.clone()));
        }
    }

    for detector in default_off {
        if restrictions.is_explicitly_enabled(detector.id())
            && !detectors.iter().any(|d| d.id() == detector.id())
        {
            detectors.push(detector);
        }
    }

    Ok(detectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{IndividualDetectorScanResult, ScanRequest};
    use crate::model::ComponentType;
    use async_trait::async_trait;

    struct StubDetector {
        id: &'static str,
        categories: Vec<DetectorClass>,
        default_off: bool,
    }

    #[async_trait]
    impl Detector for StubDetector {
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
            &[ComponentType::Other]
        }

        fn is_default_off(&self) -> bool {
            self.default_off
        }

        async fn execute(&self, _request: ScanRequest) -> anyhow::Result<IndividualDetectorScanResult> {
            Ok(IndividualDetectorScanResult::success())
        }
    }

    fn stub(id: &'static str, categories: &[DetectorClass]) -> Arc<dyn Detector> {
        Arc::new(StubDetector {
            id,
            categories: categories.to_vec(),
            default_off: false,
        })
    }

    fn default_off(id: &'static str, categories: &[DetectorClass]) -> Arc<dyn Detector> {
        Arc::new(StubDetector {
            id,
            categories: categories.to_vec(),
            default_off: true,
        })
    }

    fn registry() -> Vec<Arc<dyn Detector>> {
        vec![
            stub("NpmWithRoots", &[DetectorClass::Npm]),
            stub("Go", &[DetectorClass::GoMod]),
            stub("Spdx", &[DetectorClass::All]),
            stub("Pip", &[DetectorClass::Pip]),
            default_off("Conda", &[DetectorClass::Conda]),
        ]
    }

    fn ids(detectors: &[Arc<dyn Detector>]) -> Vec<&str> {
        detectors.iter().map(|d| d.id()).collect()
    }

    #[test]
    fn test_no_restrictions_drops_default_off() {
        let result = apply_restrictions(&DetectorRestrictions::default(), registry()).unwrap();
        assert_eq!(ids(&result), vec!["NpmWithRoots", "Go", "Spdx", "Pip"]);
    }

    #[test]
    fn test_allow_list_is_case_insensitive() {
        let restrictions = DetectorRestrictions {
            allowed_detector_ids: vec!["go".to_string()],
            ..Default::default()
        };
        let result = apply_restrictions(&restrictions, registry()).unwrap();
        assert_eq!(ids(&result), vec!["Go"]);
    }

    #[test]
    fn test_retired_id_maps_to_replacement() {
        let restrictions = DetectorRestrictions {
            allowed_detector_ids: vec!["MSLicenseNpm".to_string()],
            ..Default::default()
        };
        let result = apply_restrictions(&restrictions, registry()).unwrap();
        assert_eq!(ids(&result), vec!["NpmWithRoots"]);
    }

    #[test]
    fn test_unknown_id_is_rejected() {
        let restrictions = DetectorRestrictions {
            allowed_detector_ids: vec!["Go".to_string(), "Bogus".to_string()],
            ..Default::default()
        };
        let err = apply_restrictions(&restrictions, registry()).err().unwrap();
        assert_eq!(err.to_string(), "detector 'Bogus' was not found");
    }

    #[test]
    fn test_category_filter_keeps_all_category() {
        let restrictions = DetectorRestrictions {
            allowed_detector_categories: vec!["pip".to_string()],
            ..Default::default()
        };
        let result = apply_restrictions(&restrictions, registry()).unwrap();
        assert_eq!(ids(&result), vec!["Spdx", "Pip"]);
    }

    #[test]
    fn test_all_category_disables_filter() {
        let restrictions = DetectorRestrictions {
            allowed_detector_categories: vec!["Npm".to_string(), "All".to_string()],
            ..Default::default()
        };
        let result = apply_restrictions(&restrictions, registry()).unwrap();
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_unmatched_categories_are_rejected() {
        let restrictions = DetectorRestrictions {
            allowed_detector_categories: vec!["Swift".to_string()],
            ..Default::default()
        };
        let detectors = vec![stub("Pip", &[DetectorClass::Pip])];
        let err = apply_restrictions(&restrictions, detectors).err().unwrap();
        assert!(matches!(err, DetectionError::InvalidDetectorCategories(_)));
        assert!(err.to_string().contains("Swift"));
    }

    #[test]
    fn test_explicit_enable_bypasses_categories() {
        let restrictions = DetectorRestrictions {
            allowed_detector_categories: vec!["Pip".to_string()],
            explicitly_enabled_detector_ids: BTreeSet::from(["conda".to_string()]),
            ..Default::default()
        };
        let result = apply_restrictions(&restrictions, registry()).unwrap();
        assert_eq!(ids(&result), vec!["Spdx", "Pip", "Conda"]);
    }

    #[test]
    fn test_default_off_not_in_allow_list_is_unknown() {
        let restrictions = DetectorRestrictions {
            allowed_detector_ids: vec!["Conda".to_string()],
            ..Default::default()
        };
        assert!(apply_restrictions(&restrictions, registry()).is_err());
    }
}
