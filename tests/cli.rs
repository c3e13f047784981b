//! CLI tests for foundry.
//!
//! Runs use the offline backend so every worker takes its fallback and no
//! model is needed.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a foundry Command isolated in `dir`
fn foundry(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("foundry");
    cmd.current_dir(dir.path())
        .env("FOUNDRY_LLM_BACKEND", "offline")
        .env("FOUNDRY_GENERATED_DIR", dir.path().join("generated"))
        .env_remove("FOUNDRY_LLM_COMMAND")
        .env_remove("RUST_LOG");
    cmd
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_foundry_help() {
        let dir = TempDir::new().unwrap();
        foundry(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"));
    }

    #[test]
    fn test_foundry_version() {
        let dir = TempDir::new().unwrap();
        foundry(&dir).arg("--version").assert().success();
    }
}

mod run_command {
    use super::*;

    #[test]
    fn test_offline_run_produces_archive() {
        let dir = TempDir::new().unwrap();

        foundry(&dir)
            .args(["run", "--title", "Todo", "--description", "Track todos"])
            .args(["--requirement", "auth", "--category", "full-stack"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[1/7] strategize"))
            .stdout(predicate::str::contains("[7/7] release"))
            .stdout(predicate::str::contains("Status: succeeded"))
            .stdout(predicate::str::contains(".tar.gz"));

        let archives: Vec<_> = fs::read_dir(dir.path().join("generated/archives"))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(archives.len(), 1);

        let runs: Vec<_> = fs::read_dir(dir.path().join("generated/runs"))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].path().join("docs/plan.json").exists());
        assert!(runs[0].path().join("main.py").exists());
    }

    #[test]
    fn test_run_reports_fallbacks() {
        let dir = TempDir::new().unwrap();
        foundry(&dir)
            .args(["run", "-t", "T", "-d", "D"])
            .assert()
            .success()
            .stdout(predicate::str::contains("strategist used its fallback"));
    }

    #[test]
    fn test_run_rejects_unknown_category() {
        let dir = TempDir::new().unwrap();
        foundry(&dir)
            .args(["run", "-t", "T", "-d", "D", "-c", "spaceship"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid project category"));
    }

    #[test]
    fn test_run_rejects_blank_title() {
        let dir = TempDir::new().unwrap();
        foundry(&dir)
            .args(["run", "-t", "  ", "-d", "D"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("title must not be empty"));
    }

    #[test]
    fn test_non_recoverable_phase_fails_run() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("foundry.toml"),
            "[phases.core_build]\nrecoverable = false\n",
        )
        .unwrap();

        foundry(&dir)
            .args(["run", "-t", "T", "-d", "D"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("Status: failed"))
            .stderr(predicate::str::contains("core_build"));
    }
}

mod config_command {
    use super::*;

    #[test]
    fn test_config_init_then_show() {
        let dir = TempDir::new().unwrap();

        foundry(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created foundry.toml"));
        assert!(dir.path().join("foundry.toml").exists());

        foundry(&dir)
            .args(["config", "init"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));

        foundry(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Config file: foundry.toml"))
            .stdout(predicate::str::contains("module_build"))
            .stdout(predicate::str::contains("implementers = 5"));
    }

    #[test]
    fn test_config_validate_warns() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("foundry.toml"),
            "[pipeline]\nimplementers = 0\n\n[phases.bogus]\ntimeout_secs = 5\n",
        )
        .unwrap();

        foundry(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("implementers is 0"))
            .stdout(predicate::str::contains("Unknown phase 'bogus'"));
    }

    #[test]
    fn test_config_validate_clean() {
        let dir = TempDir::new().unwrap();
        foundry(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));
    }

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        foundry(&dir)
            .args(["--config", "nope.toml", "run", "-t", "T", "-d", "D"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("nope.toml"));
    }
}
