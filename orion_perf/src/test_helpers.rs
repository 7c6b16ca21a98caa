//! Test fixtures for orion-perf.
//!
//! [`FakeOrion`] installs a shell script standing in for the orion executable
//! together with a configuration directory. Before running the test body the
//! script parses orion's arguments and exposes them as shell variables:
//!
//! - `$config`: basename of the `--config` argument
//! - `$lookback`: the `--lookback` argument, e.g. `15d`
//! - `$pr`: `1` when `--pr-analysis` was passed
//! - `$input_vars`: the `--input-vars` argument
//!
//! The child environment (`$version`, `$ES_SERVER`, ...) is available as is.

use std::{fs, os::unix::fs::PermissionsExt, path::PathBuf};

use tempfile::{tempdir, TempDir};

use crate::config::Settings;

pub const FAKE_DATA_SOURCE: &str = "https://opensearch.example.com:9200";

const ARGUMENT_PARSER: &str = r#"#!/bin/sh
config=""
lookback=""
pr=""
input_vars=""
while [ $# -gt 0 ]; do
  case "$1" in
    --config) config=$(basename "$2"); shift ;;
    --lookback) lookback="$2"; shift ;;
    --input-vars) input_vars="$2"; shift ;;
    --pr-analysis) pr=1 ;;
  esac
  shift
done
"#;

pub struct FakeOrion {
    dir: TempDir,
}

impl FakeOrion {
    /// Install a fake orion running `body` after argument parsing.
    pub fn new(body: &str) -> FakeOrion {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("configs")).unwrap();

        let binary = dir.path().join("orion");
        fs::write(&binary, format!("{ARGUMENT_PARSER}{body}\n")).unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();

        FakeOrion { dir }
    }

    pub fn binary(&self) -> PathBuf {
        self.dir.path().join("orion")
    }

    pub fn configs_dir(&self) -> PathBuf {
        self.dir.path().join("configs")
    }

    /// Create an (empty) configuration file and return its path.
    pub fn add_config(&self, name: &str) -> PathBuf {
        let path = self.configs_dir().join(name);
        fs::write(&path, "tests: []\n").unwrap();
        path
    }

    /// Settings pointing at this fake with a data source configured.
    pub fn settings(&self) -> Settings {
        Settings {
            data_source: Some(FAKE_DATA_SOURCE.to_string()),
            configs_dir: self.configs_dir(),
            fallback_configs: Vec::new(),
            orion_binary: self.binary().display().to_string(),
            timeout_seconds: 30,
            ..Settings::default()
        }
    }
}

/// Orion JSON output with one run per `(timestamp, metrics)` entry, where
/// metrics are `(name, value)` pairs.
pub fn runs_json(runs: Vec<(&str, Vec<(&str, Option<f64>)>)>) -> String {
    let runs: Vec<serde_json::Value> = runs
        .into_iter()
        .map(|(timestamp, metrics)| {
            let metrics: serde_json::Map<String, serde_json::Value> = metrics
                .iter()
                .map(|(name, value)| (name.to_string(), serde_json::json!({ "value": value })))
                .collect();
            serde_json::json!({ "timestamp": timestamp, "metrics": metrics })
        })
        .collect();
    serde_json::Value::Array(runs).to_string()
}

/// Shell snippet printing `text` verbatim to stdout.
pub fn print_verbatim(text: &str) -> String {
    format!("cat <<'ORION_OUTPUT'\n{text}\nORION_OUTPUT\n")
}
