use super::WorkerInput;
use super::documents::{PlanTask, Strategy};

fn requirement_list(input: &WorkerInput) -> String {
    if input.request.requirements.is_empty() {
        "(none stated)".to_string()
    } else {
        input.request.requirements.join(", ")
    }
}

fn file_list(input: &WorkerInput) -> String {
    let paths: Vec<&str> = input.artifacts.paths().collect();
    if paths.is_empty() {
        "(no files yet)".to_string()
    } else {
        paths.join("\n- ")
    }
}

fn strategy_summary(strategy: Option<&Strategy>) -> String {
    match strategy {
        Some(s) => format!(
            "Vision: {}\nArchitecture: {} ({})\nTech stack: {}\nModules: {}",
            s.vision,
            s.architecture.pattern,
            s.architecture.components.join(", "),
            s.tech_stack.join(", "),
            s.modules
                .iter()
                .map(|m| format!("{} - {}", m.name, m.purpose))
                .collect::<Vec<_>>()
                .join("; ")
        ),
        None => "(no strategy available)".to_string(),
    }
}

pub fn strategist(input: &WorkerInput) -> String {
    format!(
        r#"You are a senior project manager. Analyze this project request and produce a strategy.

Title: {title}
Description: {description}
Type: {category}
Requirements: {requirements}

Respond with ONLY a JSON object with these keys:
- "vision": one paragraph
- "goals": list of strings
- "architecture": {{"pattern": string, "components": list of strings}}
- "tech_stack": list of technologies
- "modules": list of {{"name": string, "purpose": string}}
- "risks": list of strings"#,
        title = input.request.title,
        description = input.request.description,
        category = input.request.category.label(),
        requirements = requirement_list(input),
    )
}

pub fn planner(input: &WorkerInput) -> String {
    format!(
        r#"You are a project manager. Turn this strategy into an ordered implementation plan.

{strategy}

Respond with ONLY a JSON object {{"tasks": [...]}}. Each task has:
- "id": short unique identifier such as "T1"
- "title", "description": non-empty strings
- "assigned_to": the role doing the work
- "dependencies": list of ids of other tasks in THIS list
- "estimated_hours": number
- "file": relative path of the single source file the task produces"#,
        strategy = strategy_summary(input.strategy.as_ref()),
    )
}

pub fn architect(input: &WorkerInput) -> String {
    let tasks = input
        .plan
        .as_ref()
        .map(|p| {
            p.tasks
                .iter()
                .map(|t| format!("- {} {}", t.id, t.title))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();
    format!(
        r#"You are a senior developer. Implement the core architecture for "{title}".

{strategy}

Planned tasks (implemented separately, do not write them):
{tasks}

Create the main application entry point, core configuration, base models, the main
API structure, requirements.txt and a README.md.

Respond with ONLY a JSON object mapping relative file paths to complete file contents."#,
        title = input.request.title,
        strategy = strategy_summary(input.strategy.as_ref()),
    )
}

pub fn implementer(input: &WorkerInput, task: &PlanTask) -> String {
    format!(
        r#"You are a developer on "{title}". Implement this module.

File: {file}
Task: {task_title}
Details: {task_description}

Write complete, working code with error handling and docstrings.
Respond with ONLY the file content, no explanations."#,
        title = input.request.title,
        file = task.target_path(),
        task_title = task.title,
        task_description = task.description,
    )
}

pub fn integrator(input: &WorkerInput) -> String {
    format!(
        r#"You are an integration engineer for a {category}. Review these files:
- {files}

Create or modify files so that the frontend calls the backend correctly, imports
resolve, configuration is set up, and error handling is consistent.

Respond with ONLY a JSON object mapping relative file paths to complete file contents."#,
        category = input.request.category.label(),
        files = file_list(input),
    )
}

pub fn integration_verifier(input: &WorkerInput) -> String {
    format!(
        r#"You are an integration tester. Write integration tests for these files:
- {files}

Cover API endpoints, frontend/backend communication, data flow and error handling.
Fix any integration issues you find.

Respond with ONLY a JSON object with keys:
- "test_files": object mapping test file paths to content
- "fixes": object mapping file paths to corrected content (may be empty)
- "test_results": list of expected results"#,
        files = file_list(input),
    )
}

pub fn acceptance_verifier(input: &WorkerInput) -> String {
    format!(
        r#"You are a QA lead. Review this {category} for code quality, error handling,
documentation, security and performance. Files:
- {files}

Respond with ONLY a JSON object with keys:
- "validation_results": list of {{"check": string, "status": "PASS" | "FAIL" | "REVIEW"}}
- "additional_tests": object mapping test file paths to content
- "recommendations": list of strings
- "ready_for_deployment": boolean"#,
        category = input.request.category.label(),
        files = file_list(input),
    )
}

pub fn release_preparer(input: &WorkerInput) -> String {
    let judgment = match &input.acceptance {
        Some(a) if a.ready_for_deployment => "accepted".to_string(),
        Some(a) => format!("not accepted ({})", a.recommendations.join("; ")),
        None => "unknown".to_string(),
    };
    format!(
        r#"You are a release engineer preparing "{title}" for delivery.
Acceptance review: {judgment}
Files:
- {files}

Check that README, requirements and configuration are present, then write a
deployment checklist.

Respond with ONLY a JSON object with keys:
- "checklist": list of deployment steps
- "validation_report": object
- "packaging_status": string"#,
        title = input.request.title,
        files = file_list(input),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProjectCategory, ProjectRequest, RunId};

    fn input() -> WorkerInput {
        WorkerInput::new(
            RunId::new(),
            ProjectRequest::new("Todo", "Track todos", ProjectCategory::WebApp)
                .with_requirements(vec!["auth".into(), "sqlite".into()]),
        )
    }

    #[test]
    fn strategist_prompt_carries_request() {
        let prompt = strategist(&input());
        assert!(prompt.contains("Title: Todo"));
        assert!(prompt.contains("web application"));
        assert!(prompt.contains("auth, sqlite"));
        assert!(prompt.contains("\"tech_stack\""));
    }

    #[test]
    fn planner_prompt_degrades_without_strategy() {
        assert!(planner(&input()).contains("(no strategy available)"));
    }

    #[test]
    fn integrator_prompt_lists_files() {
        let mut input = input();
        let mut files = crate::artifact::ArtifactSet::new();
        files.insert("main.py", "");
        files.insert("modules/auth.py", "");
        input.artifacts = std::sync::Arc::new(files);
        let prompt = integrator(&input);
        assert!(prompt.contains("- main.py\n- modules/auth.py"));
    }
}
