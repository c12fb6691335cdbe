//! Smoke tests -- verify the binary runs and each subcommand produces JSON.

use std::io::Write;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

/// 40 daily records at $100 with a $900 spike on day 21.
fn cost_records(dir: &TempDir) -> PathBuf {
    let records: Vec<String> = (0..40)
        .map(|i| {
            let cost = if i == 20 { 900.0 } else { 100.0 };
            format!(
                r#"{{"timestamp":"2024-{:02}-{:02}","cost":{},"service":"ec2","region":"us-east-1"}}"#,
                1 + i / 28,
                1 + i % 28,
                cost
            )
        })
        .collect();
    write_file(dir, "costs.json", &format!("[{}]", records.join(",")))
}

fn costpulse(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("costpulse").unwrap();
    cmd.current_dir(dir.path()).env_remove("COSTPULSE_CONFIG");
    cmd
}

#[test]
fn test_cli_help() {
    Command::cargo_bin("costpulse")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cloud cost baselines"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("costpulse")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("costpulse"));
}

#[test]
fn test_subcommands_exist() {
    for sub in ["baseline", "detect", "forecast", "variance"] {
        Command::cargo_bin("costpulse")
            .unwrap()
            .args([sub, "--help"])
            .assert()
            .success();
    }
}

#[test]
fn test_baseline_reports_established() {
    let dir = TempDir::new().unwrap();
    let input = cost_records(&dir);
    costpulse(&dir)
        .arg("baseline")
        .arg("--input")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""established": true"#));
}

#[test]
fn test_detect_flags_spike() {
    let dir = TempDir::new().unwrap();
    let input = cost_records(&dir);
    let resources = write_file(
        &dir,
        "resources.json",
        r#"[{"resource_id":"i-1","resource_type":"ec2","current_cost":700.0,"historical_average_cost":90.0}]"#,
    );
    costpulse(&dir)
        .args(["detect", "--input"])
        .arg(&input)
        .arg("--resources")
        .arg(&resources)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""actual_cost": 900.0"#))
        .stdout(predicate::str::contains("CRITICAL"));
}

#[test]
fn test_forecast_prints_requested_months() {
    let dir = TempDir::new().unwrap();
    let input = cost_records(&dir);
    costpulse(&dir)
        .args(["forecast", "--months", "6", "--growth", "0.1", "--budget-id", "team-a", "--input"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""months": 6"#))
        .stdout(predicate::str::contains(r#""budget_id": "team-a""#));
}

#[test]
fn test_variance_reports_exceeded_budget() {
    let dir = TempDir::new().unwrap();
    let input = cost_records(&dir);
    costpulse(&dir)
        .args(["variance", "--actual", "1500", "--budget", "1000", "--budget-id", "ops", "--input"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("EXCEEDED"))
        .stdout(predicate::str::contains("ops:100"));
}

#[test]
fn test_variance_compares_against_monthly_spend() {
    let dir = TempDir::new().unwrap();
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let records: Vec<String> = (0..90)
        .map(|i| {
            let day = start + chrono::Duration::days(i);
            format!(r#"{{"timestamp":"{}","cost":100.0,"service":"ec2","region":"us-east-1"}}"#, day)
        })
        .collect();
    let input = write_file(&dir, "daily.json", &format!("[{}]", records.join(",")));

    // Jan, Feb (leap year) and Mar total 3100, 2900 and 3000.
    costpulse(&dir)
        .args(["variance", "--actual", "3000", "--budget", "3500", "--input"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""predicted_spend": 3000.0"#))
        .stdout(predicate::str::contains(r#""category": "minimal""#));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = cost_records(&dir);
    let config = write_file(&dir, "bad.toml", "[thresholds]\nhigh_threshold = 9.0\n");
    costpulse(&dir)
        .arg("--config")
        .arg(&config)
        .args(["baseline", "--input"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn test_missing_input_fails() {
    let dir = TempDir::new().unwrap();
    costpulse(&dir)
        .args(["detect", "--input", "does-not-exist.json"])
        .assert()
        .failure();
}
