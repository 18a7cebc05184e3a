use assert_cmd::Command;
use std::fs;
use std::path::Path;
use tempfile::{TempDir, tempdir};

const APP_LOG_WAIT: &str =
    "for i in 1 2 3 4 5 6 7 8 9 10; do test -s app.log && exit 0; sleep 0.2; done; exit 1";

// 在临时目录中写入配置文件和制品
fn workspace(scripts: &str) -> TempDir {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("artifact.txt"), "payload\n").unwrap();
    let config = format!(
        r#"
[environment]
environment_type = "local"
count = 2
dir_prefix = "distestor-cli"

[preparator]
artifacts = ["artifact.txt"]
output_files = ["app.log"]
base_port = 20000

[app]
command = "echo {{port}} > app.log; sleep 30"
{scripts}
"#
    );
    fs::write(dir.path().join("distestor.toml"), config).unwrap();
    dir
}

fn distestor(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
    cmd.current_dir(dir).env("RUST_LOG", "debug");
    cmd
}

#[test]
fn passing_run_exits_zero_and_collects_output() {
    let dir = workspace(&format!(
        r#"
[[scripts]]
name = "artifact-installed"
command = "test -f artifact.txt"

[[scripts]]
name = "app-started"
command = "{APP_LOG_WAIT}"
"#
    ));
    let reports = dir.path().join("out");

    distestor(dir.path())
        .arg("--report-dir")
        .arg(&reports)
        .assert()
        .code(0);

    assert_eq!(
        fs::read_to_string(reports.join("report.txt")).unwrap(),
        "[SUCCESS] artifact-installed\n[SUCCESS] app-started\n"
    );
    assert_eq!(
        fs::read_to_string(reports.join("app-started/report.txt")).unwrap(),
        "[SUCCESS] app-started passed\n"
    );
    assert_eq!(
        fs::read_to_string(reports.join("app-started/0/app.log")).unwrap(),
        "20000\n"
    );
    assert_eq!(
        fs::read_to_string(reports.join("app-started/1/app.log")).unwrap(),
        "20001\n"
    );
}

#[test]
fn failing_script_exits_one() {
    let dir = workspace(
        r#"
[[scripts]]
name = "broken"
command = "exit 3"
start_apps = false

[[scripts]]
name = "fine"
start_apps = false
"#,
    );
    let reports = dir.path().join("out");

    distestor(dir.path())
        .arg("--report-dir")
        .arg(&reports)
        .assert()
        .code(1);

    assert_eq!(
        fs::read_to_string(reports.join("report.txt")).unwrap(),
        "[FAILURE] broken\n[SUCCESS] fine\n"
    );
    let report = fs::read_to_string(reports.join("broken/report.txt")).unwrap();
    assert!(report.starts_with("[FAILURE] `exit 3` exited with 3 in environment"));
}

#[test]
fn script_filter_runs_only_named_scripts() {
    let dir = workspace(
        r#"
[[scripts]]
name = "broken"
command = "exit 3"
start_apps = false

[[scripts]]
name = "fine"
start_apps = false
"#,
    );
    let reports = dir.path().join("out");

    distestor(dir.path())
        .args(["--script", "fine", "--report-dir"])
        .arg(&reports)
        .assert()
        .code(0);

    assert_eq!(
        fs::read_to_string(reports.join("report.txt")).unwrap(),
        "[SUCCESS] fine\n"
    );
}

#[test]
fn unusable_configuration_exits_two() {
    let dir = tempdir().unwrap();
    distestor(dir.path())
        .args(["-c", "missing.toml"])
        .assert()
        .code(2);

    fs::write(
        dir.path().join("distestor.toml"),
        "[environment]\nenvironment_type = \"qemu\"\n\n[[scripts]]\nname = \"x\"\n",
    )
    .unwrap();
    distestor(dir.path()).assert().code(2);

    fs::write(dir.path().join("distestor.toml"), "").unwrap();
    distestor(dir.path()).assert().code(2);
}
