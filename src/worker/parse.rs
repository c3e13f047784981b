//! Parse and structurally validate generator responses.
//!
//! Every function returns `WorkerError::Invalid` when the response does not
//! have the expected shape; the executor then substitutes the fallback.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;

use super::WorkerInput;
use super::documents::{
    AcceptanceReport, DeliveryReport, IntegrationReport, PLAN_PATH, Plan, PlanTask,
    RESERVED_PATHS, STRATEGY_PATH, Strategy, write_document,
};
use super::render;
use crate::artifact::{ArtifactSet, normalize_path, validate_path};
use crate::errors::WorkerError;
use crate::util::{extract_json_object, strip_code_fences};

fn parse_json<T: DeserializeOwned>(text: &str, what: &str) -> Result<T, WorkerError> {
    let json = extract_json_object(text)
        .ok_or_else(|| WorkerError::invalid(format!("no JSON object in {} response", what)))?;
    serde_json::from_str(&json)
        .map_err(|e| WorkerError::invalid(format!("malformed {}: {}", what, e)))
}

/// Normalize and check generated file paths; reject reserved paths.
fn checked_files(
    files: BTreeMap<String, String>,
    what: &str,
) -> Result<BTreeMap<String, String>, WorkerError> {
    files
        .into_iter()
        .map(|(path, content)| {
            let path = normalize_path(&path);
            validate_path(&path).map_err(|e| WorkerError::invalid(format!("{}: {}", what, e)))?;
            if RESERVED_PATHS.contains(&path.as_str()) {
                return Err(WorkerError::invalid(format!(
                    "{} writes reserved path {}",
                    what, path
                )));
            }
            Ok((path, content))
        })
        .collect()
}

pub fn strategy(text: &str) -> Result<ArtifactSet, WorkerError> {
    let doc: Strategy = parse_json(text, "strategy")?;
    doc.validate().map_err(WorkerError::invalid)?;
    let mut delta = ArtifactSet::new();
    delta.insert(STRATEGY_PATH, write_document(&doc));
    Ok(delta)
}

pub fn plan(text: &str) -> Result<ArtifactSet, WorkerError> {
    let mut doc: Plan = parse_json(text, "plan")?;
    doc.assign_missing_ids();
    doc.validate().map_err(WorkerError::invalid)?;
    let mut delta = ArtifactSet::new();
    delta.insert(PLAN_PATH, write_document(&doc));
    Ok(delta)
}

/// A `{ "path": "content", ... }` object with at least one entry. Non-string
/// values are rejected.
pub fn file_map(text: &str, what: &str) -> Result<ArtifactSet, WorkerError> {
    let files: BTreeMap<String, String> = parse_json(text, what)?;
    if files.is_empty() {
        return Err(WorkerError::invalid(format!("{} produced no files", what)));
    }
    Ok(checked_files(files, what)?.into_iter().collect())
}

/// Source for one plan task. Python files without a leading docstring or
/// comment get a header naming the task.
pub fn module_source(text: &str, task: &PlanTask) -> Result<String, WorkerError> {
    let code = strip_code_fences(text);
    if code.is_empty() {
        return Err(WorkerError::invalid(format!(
            "empty source for task {}",
            task.id
        )));
    }
    let target = task.target_path();
    if target.ends_with(".py") && !code.starts_with("\"\"\"") && !code.starts_with('#') {
        return Ok(format!(
            "\"\"\"\nModule: {}\nDescription: {}\n\"\"\"\n\n{}\n",
            target, task.description, code
        ));
    }
    Ok(format!("{}\n", code))
}

pub fn integration_tests(text: &str) -> Result<ArtifactSet, WorkerError> {
    let mut report: IntegrationReport = parse_json(text, "integration report")?;
    if report.test_files.is_empty() {
        return Err(WorkerError::invalid("integration report has no test files"));
    }
    report.test_files = checked_files(report.test_files, "test_files")?;
    report.fixes = checked_files(report.fixes, "fixes")?;
    Ok(render::integration_delta(&report))
}

pub fn acceptance(text: &str) -> Result<ArtifactSet, WorkerError> {
    let mut report: AcceptanceReport = parse_json(text, "acceptance report")?;
    report.additional_tests = checked_files(report.additional_tests, "additional_tests")?;
    Ok(render::acceptance_delta(&report))
}

pub fn release(text: &str, input: &WorkerInput) -> Result<ArtifactSet, WorkerError> {
    let report: DeliveryReport = parse_json(text, "delivery report")?;
    report.validate().map_err(WorkerError::invalid)?;
    Ok(render::delivery_delta(input, &report))
}
