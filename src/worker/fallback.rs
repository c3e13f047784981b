//! Deterministic default outputs, one per worker kind.
//!
//! Every function here is pure: the result depends only on the worker input,
//! never on a generator, the clock, or the filesystem.

use std::collections::BTreeMap;

use serde_json::json;

use super::WorkerInput;
use super::documents::{
    ACCEPTANCE_REPORT_PATH, AcceptanceReport, Architecture, CheckResult, DeliveryReport,
    INTEGRATION_REPORT_PATH, IntegrationReport, ModuleSpec, PLAN_PATH, Plan, PlanTask,
    REQUIRED_FILES, STRATEGY_PATH, Strategy, write_document,
};
use super::render;
use crate::artifact::ArtifactSet;

pub fn strategy(input: &WorkerInput) -> ArtifactSet {
    let request = &input.request;
    let doc = Strategy {
        vision: format!("{}: {}", request.title, request.description),
        goals: vec![format!("Build a functional {}", request.category.label())],
        architecture: Architecture {
            pattern: "MVC".to_string(),
            components: vec![
                "Frontend".to_string(),
                "Backend".to_string(),
                "Database".to_string(),
            ],
        },
        tech_stack: ["Python", "FastAPI", "HTML", "CSS", "JavaScript"]
            .into_iter()
            .map(String::from)
            .collect(),
        modules: vec![ModuleSpec {
            name: "Core".to_string(),
            purpose: "Main logic".to_string(),
        }],
        risks: ["Timeline", "Integration", "Complexity"]
            .into_iter()
            .map(String::from)
            .collect(),
    };
    let mut delta = ArtifactSet::new();
    delta.insert(STRATEGY_PATH, write_document(&doc));
    delta
}

/// The minimal plan: exactly one setup task.
pub fn default_plan() -> Plan {
    Plan {
        tasks: vec![PlanTask {
            id: "T1".to_string(),
            title: "Setup Project".to_string(),
            description: "Initialize repo".to_string(),
            assigned_to: "senior_dev".to_string(),
            dependencies: Vec::new(),
            estimated_hours: 2.0,
            file: None,
        }],
    }
}

pub fn plan(_input: &WorkerInput) -> ArtifactSet {
    let mut delta = ArtifactSet::new();
    delta.insert(PLAN_PATH, write_document(&default_plan()));
    delta
}

const MAIN_PY: &str = r#"from typing import Optional

import uvicorn
from fastapi import FastAPI, HTTPException
from fastapi.middleware.cors import CORSMiddleware
from pydantic import BaseModel

app = FastAPI(title="Generated Project")

app.add_middleware(
    CORSMiddleware,
    allow_origins=["*"],
    allow_credentials=True,
    allow_methods=["*"],
    allow_headers=["*"],
)


class RequestModel(BaseModel):
    data: str
    options: Optional[dict] = {}


class ResponseModel(BaseModel):
    status: str
    result: Optional[dict] = None
    error: Optional[str] = None


@app.get("/")
async def root():
    return {"message": "API is running"}


@app.get("/health")
async def health_check():
    return {"status": "healthy"}


@app.post("/process", response_model=ResponseModel)
async def process_data(request: RequestModel):
    try:
        return ResponseModel(status="success", result={"processed": request.data})
    except Exception as e:
        raise HTTPException(status_code=500, detail=str(e))


if __name__ == "__main__":
    uvicorn.run(app, host="0.0.0.0", port=8000)
"#;

const REQUIREMENTS_TXT: &str = "fastapi>=0.110\nuvicorn>=0.29\npydantic>=2.0\nhttpx>=0.27\npytest>=8.0\n";

pub fn core(input: &WorkerInput) -> ArtifactSet {
    let request = &input.request;
    let mut readme = format!("# {}\n\n{}\n", request.title, request.description);
    if !request.requirements.is_empty() {
        readme.push_str("\n## Requirements\n\n");
        for req in &request.requirements {
            readme.push_str(&format!("- {}\n", req));
        }
    }
    if let Some(strategy) = &input.strategy {
        readme.push_str(&format!("\n## Tech stack\n\n{}\n", strategy.tech_stack.join(", ")));
    }
    readme.push_str(
        "\n## Running\n\n```\npip install -r requirements.txt\npython main.py\n```\n",
    );

    let mut delta = ArtifactSet::new();
    delta.insert("main.py", MAIN_PY);
    delta.insert("requirements.txt", REQUIREMENTS_TXT);
    delta.insert("README.md", readme);
    delta
}

/// One documented stub per assigned task.
pub fn modules(input: &WorkerInput) -> ArtifactSet {
    input
        .tasks
        .iter()
        .map(|task| {
            let body = format!(
                "\"\"\"\nModule: {file}\nTask {id}: {title}\n\n{description}\n\"\"\"\n\n\ndef run():\n    \"\"\"Entry point for {title}.\"\"\"\n    raise NotImplementedError(\"{id}: {title}\")\n",
                file = task.target_path(),
                id = task.id,
                title = task.title.replace('"', "'"),
                description = task.description,
            );
            (task.target_path(), body)
        })
        .collect()
}

const API_CLIENT_JS: &str = r#"class APIClient {
    constructor(baseURL = 'http://localhost:8000') {
        this.baseURL = baseURL;
    }

    async request(endpoint, options = {}) {
        const response = await fetch(`${this.baseURL}${endpoint}`, {
            ...options,
            headers: { 'Content-Type': 'application/json', ...options.headers },
        });
        const data = await response.json();
        if (!response.ok) {
            throw new Error(data.detail || 'API request failed');
        }
        return data;
    }

    get(endpoint) {
        return this.request(endpoint, { method: 'GET' });
    }

    post(endpoint, data) {
        return this.request(endpoint, { method: 'POST', body: JSON.stringify(data) });
    }

    put(endpoint, data) {
        return this.request(endpoint, { method: 'PUT', body: JSON.stringify(data) });
    }

    delete(endpoint) {
        return this.request(endpoint, { method: 'DELETE' });
    }
}

const apiClient = new APIClient();
"#;

const CONFIG_MANAGER_PY: &str = r#"import json
import os
from typing import Any, Dict


class ConfigManager:
    def __init__(self, config_file: str = "config.json"):
        self.config_file = config_file
        self.config = self.load_config()

    def load_config(self) -> Dict[str, Any]:
        if os.path.exists(self.config_file):
            with open(self.config_file, "r") as f:
                return json.load(f)
        return {
            "api_host": os.getenv("API_HOST", "0.0.0.0"),
            "api_port": int(os.getenv("API_PORT", "8000")),
            "debug": os.getenv("DEBUG", "false").lower() == "true",
        }

    def get(self, key: str, default: Any = None) -> Any:
        return self.config.get(key, default)

    def set(self, key: str, value: Any) -> None:
        self.config[key] = value

    def save_config(self) -> None:
        with open(self.config_file, "w") as f:
            json.dump(self.config, f, indent=2)


config = ConfigManager()
"#;

pub fn integration(_input: &WorkerInput) -> ArtifactSet {
    let mut delta = ArtifactSet::new();
    delta.insert("api_client.js", API_CLIENT_JS);
    delta.insert("config_manager.py", CONFIG_MANAGER_PY);
    delta
}

const TEST_API_INTEGRATION_PY: &str = r#"from fastapi.testclient import TestClient

from main import app

client = TestClient(app)


def test_root_endpoint():
    response = client.get("/")
    assert response.status_code == 200


def test_health_endpoint():
    response = client.get("/health")
    assert response.status_code == 200
    assert response.json()["status"] == "healthy"


def test_process_endpoint_valid_data():
    response = client.post("/process", json={"data": "test", "options": {"key": "value"}})
    assert response.status_code == 200
    assert response.json()["status"] == "success"


def test_process_endpoint_invalid_data():
    response = client.post("/process", json={})
    assert response.status_code == 422
"#;

const RUN_INTEGRATION_TESTS_PY: &str = r#"import subprocess
import sys


def main() -> int:
    return subprocess.call([sys.executable, "-m", "pytest", "-q", "tests"])


if __name__ == "__main__":
    sys.exit(main())
"#;

pub fn integration_tests(_input: &WorkerInput) -> ArtifactSet {
    let mut test_files = BTreeMap::new();
    test_files.insert(
        "tests/test_api_integration.py".to_string(),
        TEST_API_INTEGRATION_PY.to_string(),
    );
    test_files.insert(
        "tests/run_integration_tests.py".to_string(),
        RUN_INTEGRATION_TESTS_PY.to_string(),
    );
    test_files.insert(
        "tests/test_requirements.txt".to_string(),
        "pytest>=8.0\nhttpx>=0.27\n".to_string(),
    );
    let report = IntegrationReport {
        test_files,
        fixes: BTreeMap::new(),
        test_results: json!({ "status": "pending" }),
    };
    render::integration_delta(&report)
}

pub fn default_acceptance() -> AcceptanceReport {
    let checks = [
        ("Project Structure", "PASS"),
        ("Code Quality", "PASS"),
        ("Error Handling", "PASS"),
        ("Documentation", "PASS"),
        ("Testing", "PASS"),
        ("Security", "REVIEW"),
        ("Performance", "PASS"),
    ];
    AcceptanceReport {
        validation_results: checks
            .into_iter()
            .map(|(check, status)| CheckResult {
                check: check.to_string(),
                status: status.to_string(),
            })
            .collect(),
        additional_tests: BTreeMap::new(),
        recommendations: ["Add logging", "Implement rate limiting", "Add monitoring"]
            .into_iter()
            .map(String::from)
            .collect(),
        ready_for_deployment: true,
    }
}

pub fn acceptance(_input: &WorkerInput) -> ArtifactSet {
    let mut delta = ArtifactSet::new();
    delta.insert(ACCEPTANCE_REPORT_PATH, write_document(&default_acceptance()));
    delta
}

pub fn release(input: &WorkerInput) -> ArtifactSet {
    let present: Vec<&str> = REQUIRED_FILES
        .into_iter()
        .filter(|f| input.artifacts.contains(f))
        .collect();
    let missing: Vec<&str> = REQUIRED_FILES
        .into_iter()
        .filter(|f| !input.artifacts.contains(f))
        .collect();
    let deployment_ready = missing.is_empty();
    let test_status = match &input.acceptance {
        Some(a) if a.ready_for_deployment => "passed",
        Some(_) => "failed",
        None => "pending",
    };

    let report = DeliveryReport {
        checklist: [
            "Code reviewed for structure and standards",
            "Unit and integration tests written",
            "Dependencies listed in requirements.txt",
            "Configuration validated",
            "README.md prepared with instructions",
            "Final build packaged for deployment",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
        validation_report: json!({
            "required_files_present": present,
            "missing_files": missing,
            "test_status": test_status,
            "deployment_ready": deployment_ready,
        }),
        packaging_status: if deployment_ready { "Ready" } else { "Incomplete" }.to_string(),
    };
    render::delivery_delta(input, &report)
}
