use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// End-to-end runs of the `bosc` binary over small traces written to a temp dir.
///
/// The trace alternates `read`/`write` with a periodic `close`; an `#attack` section of
/// `execve` calls sits at the end so the detection counters have something to find.

fn write_fixture(dir: &Path) -> (PathBuf, PathBuf) {
    let index = dir.join("syscalls");
    fs::write(&index, "read\nwrite\nclose\nexecve\n").unwrap();

    let mut trace = String::new();
    for i in 0..200 {
        trace.push_str(match i % 5 {
            4 => "close\n",
            n if n % 2 == 0 => "read\n",
            _ => "write\n",
        });
    }
    trace.push_str("#attack\n");
    for _ in 0..40 {
        trace.push_str("execve\n");
    }
    let trace_path = dir.join("trace");
    fs::write(&trace_path, trace).unwrap();
    (index, trace_path)
}

fn bosc() -> Command {
    Command::cargo_bin("bosc").unwrap()
}

#[test]
fn help_exits_zero() {
    bosc()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--input-file"));
}

#[test]
fn help_with_input_file_is_usage_error() {
    bosc()
        .args(["-i", "trace", "-h"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn missing_input_is_usage_error() {
    bosc().args(["-e", "10"]).assert().failure().code(2);
}

#[test]
fn malformed_range_is_usage_error() {
    bosc()
        .args(["-i", "trace", "-e", "ten"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn missing_training_bound_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let (index, trace) = write_fixture(dir.path());
    bosc()
        .arg("-i")
        .arg(&trace)
        .arg("-s")
        .arg(&index)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("training epochs"));
}

#[test]
fn missing_index_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let (_, trace) = write_fixture(dir.path());
    bosc()
        .arg("-i")
        .arg(&trace)
        .arg("-s")
        .arg(dir.path().join("absent"))
        .args(["-n", "5"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("syscall index"));
}

#[test]
fn missing_trace_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let (index, _) = write_fixture(dir.path());
    bosc()
        .arg("-i")
        .arg(dir.path().join("absent"))
        .arg("-s")
        .arg(&index)
        .args(["-n", "5", "-e", "10"])
        .assert()
        .failure()
        .code(3);
}

#[test]
fn malformed_database_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let (index, trace) = write_fixture(dir.path());
    let database = dir.path().join("normal.tsv");
    fs::write(&database, "0,1\tlots\n").unwrap();

    bosc()
        .arg("-i")
        .arg(&trace)
        .arg("-s")
        .arg(&index)
        .arg("-b")
        .arg(&database)
        .args(["-n", "5", "-e", "10"])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("malformed record"));
}

#[test]
fn sweep_reports_each_combination() {
    let dir = tempfile::tempdir().unwrap();
    let (index, trace) = write_fixture(dir.path());

    bosc()
        .arg("-i")
        .arg(&trace)
        .arg("-s")
        .arg(&index)
        .args(["-n", "8", "-w", "2", "-e", "10:20:10", "-t", "0.5", "-d", "0.5", "-v", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Epoch size: 10"))
        .stdout(predicate::str::contains("Epoch size: 20"))
        .stdout(predicate::str::contains("Summary: 2 evaluated, 0 skipped"));
}

#[test]
fn attack_epochs_are_detected() {
    let dir = tempfile::tempdir().unwrap();
    let (index, trace) = write_fixture(dir.path());
    let output = dir.path().join("report.json");

    bosc()
        .arg("-i")
        .arg(&trace)
        .arg("-s")
        .arg(&index)
        .arg("-o")
        .arg(&output)
        .args(["-n", "10", "-w", "1", "-e", "10", "-t", "0.5", "-d", "0.5"])
        .args(["--format", "json"])
        .assert()
        .success();

    let text = fs::read_to_string(&output).unwrap();
    let summary: serde_json::Value = serde_json::from_str(text.lines().last().unwrap()).unwrap();
    let result = &summary["results"][0];
    // 20 normal epochs, 10 train + 10 test, then 4 attack epochs
    assert_eq!(result["tested_epochs"], 14);
    assert_eq!(result["confusion"]["true_positives"], 4);
    assert_eq!(result["confusion"]["false_positives"], 0);
    assert_eq!(result["detection_rate"], 1.0);
}

#[test]
fn dumped_profile_can_seed_a_run() {
    let dir = tempfile::tempdir().unwrap();
    let (index, trace) = write_fixture(dir.path());
    let dumps = dir.path().join("profiles");

    bosc()
        .arg("-i")
        .arg(&trace)
        .arg("-s")
        .arg(&index)
        .arg("--dump-dir")
        .arg(&dumps)
        .args(["-n", "10", "-w", "3", "-e", "20", "-t", "0.5", "-d", "0.5"])
        .assert()
        .success();

    let profile = dumps.join("normal-e20-t0.5-d0.5.tsv");
    let dump = fs::read_to_string(&profile).unwrap();
    assert!(dump.lines().all(|line| line.split('\t').count() == 2));

    bosc()
        .arg("-i")
        .arg(&trace)
        .arg("-s")
        .arg(&index)
        .arg("-b")
        .arg(&profile)
        .args(["-n", "0", "-w", "3", "-e", "20", "-t", "0.5", "-d", "0.5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Summary: 1 evaluated"));
}

#[test]
fn config_file_supplies_settings() {
    let dir = tempfile::tempdir().unwrap();
    let (index, trace) = write_fixture(dir.path());
    let config = dir.path().join("bosc.json");
    fs::write(
        &config,
        format!(
            r#"{{
                "syscalls": {:?},
                "pattern_width": 2,
                "train_epochs": 5,
                "epoch_size": {{ "min": 10, "max": 30, "step": 10 }},
                "format": "json"
            }}"#,
            index.display().to_string()
        ),
    )
    .unwrap();

    let assert = bosc()
        .arg("-i")
        .arg(&trace)
        .arg("-c")
        .arg(&config)
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let summary: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(summary["evaluated"], 3);
}
