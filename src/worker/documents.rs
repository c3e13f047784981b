//! Structured documents exchanged between phases, and where they live in the
//! artifact set.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactSet, normalize_path, validate_path};
use crate::util::slugify;

pub const STRATEGY_PATH: &str = "docs/strategy.json";
pub const PLAN_PATH: &str = "docs/plan.json";
pub const INTEGRATION_REPORT_PATH: &str = "reports/integration.json";
pub const ACCEPTANCE_REPORT_PATH: &str = "reports/acceptance.json";
pub const DELIVERY_REPORT_PATH: &str = "reports/delivery.json";
pub const DELIVERY_NOTES_PATH: &str = "DELIVERY.md";

/// Paths only the pipeline itself writes. Generated file maps may not touch them.
pub const RESERVED_PATHS: [&str; 6] = [
    STRATEGY_PATH,
    PLAN_PATH,
    INTEGRATION_REPORT_PATH,
    ACCEPTANCE_REPORT_PATH,
    DELIVERY_REPORT_PATH,
    DELIVERY_NOTES_PATH,
];

/// Files a deliverable project is expected to carry.
pub const REQUIRED_FILES: [&str; 3] = ["README.md", "requirements.txt", "main.py"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub components: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub name: String,
    #[serde(default)]
    pub purpose: String,
}

/// Output of the strategize phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub vision: String,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub architecture: Architecture,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
    #[serde(default)]
    pub risks: Vec<String>,
}

impl Strategy {
    pub fn validate(&self) -> Result<(), String> {
        if self.vision.trim().is_empty() {
            return Err("strategy has an empty vision".to_string());
        }
        if self.tech_stack.iter().all(|t| t.trim().is_empty()) {
            return Err("strategy names no technologies".to_string());
        }
        if self.modules.iter().any(|m| m.name.trim().is_empty()) {
            return Err("strategy lists a module without a name".to_string());
        }
        Ok(())
    }
}

/// One unit of implementation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTask {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub description: String,
    pub assigned_to: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub estimated_hours: f64,
    /// Explicit output file; derived from the title when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl PlanTask {
    /// Relative path of the file this task produces.
    pub fn target_path(&self) -> String {
        if let Some(file) = &self.file {
            let file = normalize_path(file);
            if !file.is_empty() {
                return file;
            }
        }
        let slug = slugify(&self.title, '_', 48);
        if slug.is_empty() {
            format!("modules/task_{}.py", slugify(&self.id, '_', 16))
        } else {
            format!("modules/{}.py", slug)
        }
    }
}

/// Output of the plan phase: an ordered task list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub tasks: Vec<PlanTask>,
}

impl Plan {
    /// Give every task without an id a positional `T<n>` id.
    pub fn assign_missing_ids(&mut self) {
        for (idx, task) in self.tasks.iter_mut().enumerate() {
            if task.id.trim().is_empty() {
                task.id = format!("T{}", idx + 1);
            }
        }
    }

    /// Structural checks: at least one task, required fields present, ids
    /// and target paths unique, and every dependency referring to a task in
    /// this plan.
    pub fn validate(&self) -> Result<(), String> {
        if self.tasks.is_empty() {
            return Err("plan has no tasks".to_string());
        }

        let mut ids = HashSet::new();
        let mut targets = HashSet::new();
        for task in &self.tasks {
            for (field, value) in [
                ("id", &task.id),
                ("title", &task.title),
                ("description", &task.description),
                ("assigned_to", &task.assigned_to),
            ] {
                if value.trim().is_empty() {
                    return Err(format!("task '{}' has an empty {}", task.id, field));
                }
            }
            if !ids.insert(task.id.as_str()) {
                return Err(format!("duplicate task id '{}'", task.id));
            }
            let target = task.target_path();
            validate_path(&target).map_err(|e| format!("task '{}': {}", task.id, e))?;
            if RESERVED_PATHS.contains(&target.as_str()) {
                return Err(format!("task '{}' targets reserved path {}", task.id, target));
            }
            if !targets.insert(target.clone()) {
                return Err(format!("two tasks write {}", target));
            }
        }

        // Targets must form one file tree together with the pipeline's own documents.
        let reserved: ArtifactSet = RESERVED_PATHS
            .iter()
            .map(|p| (p.to_string(), String::new()))
            .collect();
        let layout: ArtifactSet = targets.into_iter().map(|t| (t, String::new())).collect();
        if let Some((target, existing)) = reserved.find_clash(&layout) {
            return Err(format!("task target {} clashes with {}", target, existing));
        }

        for task in &self.tasks {
            for dep in &task.dependencies {
                if !ids.contains(dep.as_str()) {
                    return Err(format!(
                        "task '{}' depends on unknown task '{}'",
                        task.id, dep
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationReport {
    #[serde(default)]
    pub test_files: BTreeMap<String, String>,
    #[serde(default)]
    pub fixes: BTreeMap<String, String>,
    #[serde(default)]
    pub test_results: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: String,
    pub status: String,
}

/// Pass/fail judgment from acceptance verification. Recorded, never enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceReport {
    #[serde(default)]
    pub validation_results: Vec<CheckResult>,
    #[serde(default)]
    pub additional_tests: BTreeMap<String, String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub ready_for_deployment: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub checklist: Vec<String>,
    #[serde(default)]
    pub validation_report: serde_json::Value,
    pub packaging_status: String,
}

impl DeliveryReport {
    pub fn validate(&self) -> Result<(), String> {
        if self.checklist.is_empty() {
            return Err("delivery checklist is empty".to_string());
        }
        if self.packaging_status.trim().is_empty() {
            return Err("delivery report has no packaging status".to_string());
        }
        Ok(())
    }
}

/// Read a JSON document back out of an artifact set.
pub fn read_document<T: serde::de::DeserializeOwned>(
    artifacts: &ArtifactSet,
    path: &str,
) -> Option<T> {
    artifacts
        .get(path)
        .and_then(|content| serde_json::from_str(content).ok())
}

/// Serialize a document for storage. These types always serialize.
pub fn write_document<T: Serialize>(doc: &T) -> String {
    serde_json::to_string_pretty(doc).unwrap_or_else(|_| "{}".to_string())
}
