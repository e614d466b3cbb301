use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn write_job_file(dir: &Path, script: &str) -> std::path::PathBuf {
    let job_path = dir.join("job.toml");
    let content = format!(
        r#"
[job]
id = "si-scf"
kind = "plane-wave"
pseudo_family = "pbe-v1"

[job.structure]
elements = ["Si"]

[job.parameters]
electron_maxstep = 40

[resources]
num_machines = 1
max_wallclock_seconds = 600

[execution]
command = "sh"
args = ["-c", {script:?}]
"#
    );
    std::fs::write(&job_path, content).unwrap();
    job_path
}

#[test]
fn test_help_mentions_the_restart_loop() {
    Command::cargo_bin("relaunch")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("restart"));
}

#[test]
fn test_successful_job_reports_succeeded() {
    let dir = tempfile::tempdir().unwrap();
    let job = write_job_file(
        dir.path(),
        r#"echo '{"total_energy": -31.2}' > results.json && touch SUCCESS"#,
    );
    let workdir = dir.path().join("work");

    Command::cargo_bin("relaunch")
        .unwrap()
        .arg("run")
        .arg(&job)
        .arg("--workdir")
        .arg(&workdir)
        .assert()
        .success()
        .stdout(predicate::str::contains("SUCCEEDED"));

    assert!(workdir.join("report.json").exists());
}

#[test]
fn test_convergence_failure_is_retried_to_success() {
    let dir = tempfile::tempdir().unwrap();
    // Fails while the iteration cap is still at its initial value; the
    // corrected second attempt succeeds.
    let job = write_job_file(
        dir.path(),
        r#"if grep -q '"electron_maxstep": 40' inputs.json; then printf convergence-not-reached > FAIL; else touch SUCCESS; fi"#,
    );
    let workdir = dir.path().join("work");

    Command::cargo_bin("relaunch")
        .unwrap()
        .arg("run")
        .arg(&job)
        .arg("--workdir")
        .arg(&workdir)
        .assert()
        .success()
        .stdout(predicate::str::contains("attempt  2: ok"));
}

#[test]
fn test_unhandled_failure_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let job = write_job_file(dir.path(), "printf disk-on-fire > FAIL; exit 1");
    let workdir = dir.path().join("work");

    Command::cargo_bin("relaunch")
        .unwrap()
        .arg("run")
        .arg(&job)
        .arg("--workdir")
        .arg(&workdir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed with status"));
}
