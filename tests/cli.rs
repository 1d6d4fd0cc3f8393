use assert_cmd::Command;

#[test]
fn test_help_lists_options() {
    let output = Command::cargo_bin("perf-collector")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("--sampler-interval-ms"));
    assert!(text.contains("--monitored-pids"));
}

#[test]
fn test_version() {
    Command::cargo_bin("perf-collector")
        .unwrap()
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn test_bad_metric_filter_fails() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("perf-collector")
        .unwrap()
        .args(["--metrics", "CPU/Load:median", "--net-interfaces", "eth0"])
        .arg("--proc-root")
        .arg(dir.path())
        .arg("--sys-root")
        .arg(dir.path())
        .assert()
        .failure();
}
