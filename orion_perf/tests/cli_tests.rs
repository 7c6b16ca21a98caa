use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::{tempdir, TempDir};

const DATA_SOURCE: &str = "https://opensearch.example.com:9200";

const RUNS: &str = r#"[
  {"timestamp": "t1", "metrics": {"podReadyLatency": {"value": 2000}, "cpu": {"value": 10}}},
  {"timestamp": "t2", "metrics": {"podReadyLatency": {"value": 2300}, "cpu": {"value": null}}}
]"#;

const CHANGEPOINTS: &str = r##"[
  {"is_changepoint": false, "ocpVersion": "4.19.1", "uuid": "u1", "prs": [], "metrics": {"metric": {"percentage_change": 0}}},
  {"is_changepoint": true, "ocpVersion": "4.19.2", "uuid": "u2", "prs": ["#7"], "metrics": {"metric": {"percentage_change": 15}}}
]"##;

/// Workspace with a fake orion executable and a configuration directory.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(script: &str) -> Fixture {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("configs")).unwrap();
        fs::create_dir(dir.path().join("home")).unwrap();

        let orion = dir.path().join("orion");
        fs::write(
            &orion,
            format!(
                "#!/bin/sh\nwhile [ $# -gt 0 ]; do\n  [ \"$1\" = --config ] && config=$(basename \"$2\")\n  shift\ndone\n{script}\n"
            ),
        )
        .unwrap();
        fs::set_permissions(&orion, fs::Permissions::from_mode(0o755)).unwrap();

        Fixture { dir }
    }

    fn add_config(&self, name: &str) {
        fs::write(self.dir.path().join("configs").join(name), "tests: []\n").unwrap();
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_orion-perf"));
        cmd.env("HOME", self.path().join("home"))
            .env_remove("XDG_CONFIG_HOME")
            .env_remove("RUST_LOG")
            .env("ES_SERVER", DATA_SOURCE)
            .env("ORION_PERF_ORION_BINARY", self.path().join("orion"))
            .env("ORION_PERF_CONFIGS_DIR", self.path().join("configs"))
            .env("ORION_PERF_TIMEOUT_SECONDS", "30");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.command().args(args).output().unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn heredoc(text: &str) -> String {
    format!("cat <<'ORION_OUTPUT'\n{text}\nORION_OUTPUT")
}

#[test]
fn has_regressed_reports_changepoints_and_failures_separately() {
    let fixture = Fixture::new(&format!(
        "case \"$config\" in\n  one.yaml) echo boom >&2; exit 1 ;;\n  two.yaml)\n{}\n  exit 3 ;;\nesac",
        heredoc(CHANGEPOINTS)
    ));
    fixture.add_config("one.yaml");
    fixture.add_config("two.yaml");

    let output = fixture.run(&["has-regressed", "--version", "4.19"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let stdout = stdout(&output);
    let (report, diagnostics) = stdout.split_once("Diagnostics:").unwrap();
    assert!(report.contains("two.yaml"));
    assert!(report.contains("metric increased by 15.00%"));
    assert!(!report.contains("one.yaml"));
    assert!(diagnostics.contains("one.yaml: orion exited with code 1: boom"));
}

#[test]
fn json_responses_are_tagged() {
    let fixture = Fixture::new("exit 0");
    fixture.add_config("b.yaml");
    fixture.add_config("a.yaml");

    let output = fixture.run(&["--json", "list-configs"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(
        value,
        serde_json::json!([{"type": "text", "value": "a.yaml\nb.yaml"}])
    );
}

#[test]
fn detailed_performance_writes_png_files_and_html() {
    let fixture = Fixture::new(&heredoc(RUNS));
    fixture.add_config("small.yaml");

    let charts_dir: PathBuf = fixture.path().join("charts");
    let report = fixture.path().join("report.html");
    let output = fixture.run(&[
        "detailed-performance",
        "--lookback",
        "7d",
        "--output-dir",
        charts_dir.to_str().unwrap(),
        "--html",
        report.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let stdout = stdout(&output);
    assert_eq!(stdout.matches("data:image/png;base64,").count(), 2);

    for name in ["chart-1.png", "chart-2.png"] {
        let bytes = fs::read(charts_dir.join(name)).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
    }
    assert!(!charts_dir.join("chart-3.png").exists());

    let html = fs::read_to_string(report).unwrap();
    assert!(html.contains("podReadyLatency (small.yaml)"));
}

#[test]
fn missing_data_source_is_a_one_line_error() {
    let fixture = Fixture::new("exit 0");
    fixture.add_config("a.yaml");

    let output = fixture
        .command()
        .env_remove("ES_SERVER")
        .args(["has-regressed"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert_eq!(
        stderr(&output).trim(),
        "Error: ES_SERVER environment variable is not set"
    );
}

#[test]
fn unknown_configuration_name_is_rejected() {
    let fixture = Fixture::new("exit 0");

    let output = fixture.run(&[
        "metrics-correlation",
        "--metric1",
        "cpu",
        "--metric2",
        "podReadyLatency",
        "--config",
        "../outside.yaml",
    ]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid configuration name '../outside.yaml'"));
}

#[test]
fn config_file_and_environment_layering() {
    let fixture = Fixture::new("exit 0");
    let settings = fixture.path().join("settings.toml");
    fs::write(&settings, "container_runtime = \"docker\"\ntimeout_seconds = 5\n").unwrap();

    let output = fixture.run(&["--config-file", settings.to_str().unwrap(), "config"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let shown = stdout(&output);
    assert!(shown.contains("container_runtime = \"docker\""));
    // The environment wins over the settings file
    assert!(shown.contains("timeout_seconds = 30"));
    assert!(shown.contains(&format!("data_source = \"{DATA_SOURCE}\"")));
}

#[test]
fn data_source_is_printed() {
    let fixture = Fixture::new("exit 0");
    let output = fixture.run(&["data-source"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), DATA_SOURCE);
}
