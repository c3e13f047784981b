//! Turn report documents into artifact deltas. Shared by the parsers and the
//! fallbacks so both paths lay out files identically.

use serde_json::json;

use super::WorkerInput;
use super::documents::{
    ACCEPTANCE_REPORT_PATH, AcceptanceReport, DELIVERY_NOTES_PATH, DELIVERY_REPORT_PATH,
    DeliveryReport, INTEGRATION_REPORT_PATH, IntegrationReport, write_document,
};
use crate::artifact::ArtifactSet;

/// Test files, then fixes, then the summary report.
pub fn integration_delta(report: &IntegrationReport) -> ArtifactSet {
    let mut delta = ArtifactSet::new();
    for (path, content) in &report.test_files {
        delta.insert(path.clone(), content.clone());
    }
    for (path, content) in &report.fixes {
        delta.insert(path.clone(), content.clone());
    }
    let summary = json!({
        "test_files": report.test_files.keys().collect::<Vec<_>>(),
        "fixed_files": report.fixes.keys().collect::<Vec<_>>(),
        "test_results": report.test_results,
    });
    delta.insert(INTEGRATION_REPORT_PATH, write_document(&summary));
    delta
}

pub fn acceptance_delta(report: &AcceptanceReport) -> ArtifactSet {
    let mut delta = ArtifactSet::new();
    for (path, content) in &report.additional_tests {
        delta.insert(path.clone(), content.clone());
    }
    delta.insert(ACCEPTANCE_REPORT_PATH, write_document(report));
    delta
}

pub fn delivery_delta(input: &WorkerInput, report: &DeliveryReport) -> ArtifactSet {
    let mut notes = format!(
        "# Delivery: {}\n\nPackaging status: **{}**\n",
        input.request.title, report.packaging_status
    );

    match &input.acceptance {
        Some(a) => {
            let verdict = if a.ready_for_deployment {
                "ready for deployment"
            } else {
                "NOT ready for deployment"
            };
            notes.push_str(&format!("Acceptance review: {}\n", verdict));
            if !a.validation_results.is_empty() {
                notes.push_str("\n## Checks\n\n| Check | Status |\n|-------|--------|\n");
                for r in &a.validation_results {
                    notes.push_str(&format!("| {} | {} |\n", r.check, r.status));
                }
            }
            if !a.recommendations.is_empty() {
                notes.push_str("\n## Recommendations\n\n");
                for rec in &a.recommendations {
                    notes.push_str(&format!("- {}\n", rec));
                }
            }
        }
        None => notes.push_str("Acceptance review: not available\n"),
    }

    notes.push_str("\n## Deployment checklist\n\n");
    for item in &report.checklist {
        notes.push_str(&format!("- [ ] {}\n", item));
    }

    let mut delta = ArtifactSet::new();
    delta.insert(DELIVERY_NOTES_PATH, notes);
    delta.insert(DELIVERY_REPORT_PATH, write_document(report));
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProjectCategory, ProjectRequest, RunId};
    use crate::worker::documents::CheckResult;
    use std::collections::BTreeMap;

    #[test]
    fn fixes_override_test_files_at_same_path() {
        let report = IntegrationReport {
            test_files: BTreeMap::from([("tests/a.py".to_string(), "test".to_string())]),
            fixes: BTreeMap::from([("tests/a.py".to_string(), "fixed".to_string())]),
            test_results: serde_json::Value::Null,
        };
        let delta = integration_delta(&report);
        assert_eq!(delta.get("tests/a.py"), Some("fixed"));
        assert!(delta.get(INTEGRATION_REPORT_PATH).unwrap().contains("fixed_files"));
    }

    #[test]
    fn delivery_notes_record_negative_judgment() {
        let mut input = WorkerInput::new(
            RunId::new(),
            ProjectRequest::new("Shop", "Sell things", ProjectCategory::FullStack),
        );
        input.acceptance = Some(AcceptanceReport {
            validation_results: vec![CheckResult {
                check: "Security".into(),
                status: "FAIL".into(),
            }],
            additional_tests: BTreeMap::new(),
            recommendations: vec!["Hash passwords".into()],
            ready_for_deployment: false,
        });
        let report = DeliveryReport {
            checklist: vec!["Ship it".into()],
            validation_report: serde_json::json!({}),
            packaging_status: "Ready".into(),
        };
        let delta = delivery_delta(&input, &report);
        let notes = delta.get(DELIVERY_NOTES_PATH).unwrap();
        assert!(notes.contains("NOT ready for deployment"));
        assert!(notes.contains("| Security | FAIL |"));
        assert!(notes.contains("- Hash passwords"));
        assert!(notes.contains("- [ ] Ship it"));
        assert!(delta.contains(DELIVERY_REPORT_PATH));
    }
}
