//! Building and running orion invocations.

use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
};

use log::debug;

use crate::{
    config::{Settings, SettingsError, DATA_SOURCE_ENV},
    process::{run_command, ProcessResult},
};

/// Locate `name` the way a shell would: a name containing a path separator
/// must exist, anything else is looked up on `PATH`.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    if name.contains('/') {
        let path = PathBuf::from(name);
        return is_executable(&path).then_some(path);
    }

    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths)
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate))
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Arguments of a regression analysis over the last `lookback` days.
pub fn analysis_args(config: &Path, lookback: u32) -> Vec<String> {
    vec![
        "--lookback".to_string(),
        format!("{lookback}d"),
        "--hunter-analyze".to_string(),
        "--config".to_string(),
        config.display().to_string(),
        "-o".to_string(),
        "json".to_string(),
    ]
}

/// Extra arguments restricting the analysis to a single pull request.
pub fn pr_analysis_args(organization: &str, repository: &str, pull_request: u64) -> Vec<String> {
    let input_vars = serde_json::json!({
        "jobtype": "pull",
        "pull_number": pull_request,
        "organization": organization,
        "repository": repository,
    });
    vec![
        "--pr-analysis".to_string(),
        "--input-vars".to_string(),
        input_vars.to_string(),
    ]
}

/// Full command line for `args`, falling back to the orion container image
/// when no orion executable is available.
pub fn orion_command(settings: &Settings, args: Vec<String>) -> Vec<String> {
    match find_executable(&settings.orion_binary) {
        Some(path) => {
            debug!("Using orion from {}", path.display());
            std::iter::once(settings.orion_binary.clone())
                .chain(args)
                .collect()
        }
        None => {
            debug!(
                "'{}' not found, using orion from {} image '{}'",
                settings.orion_binary, settings.container_runtime, settings.container_image
            );
            [
                settings.container_runtime.clone(),
                "run".to_string(),
                "--env-host".to_string(),
                settings.container_image.clone(),
                "orion".to_string(),
            ]
            .into_iter()
            .chain(args)
            .collect()
        }
    }
}

/// Child environment for analysing `version`.
pub fn orion_env(settings: &Settings, version: &str) -> Result<HashMap<String, String>, SettingsError> {
    Ok(HashMap::from([
        (DATA_SOURCE_ENV.to_string(), settings.data_source()?.to_string()),
        ("version".to_string(), version.to_string()),
        ("es_metadata_index".to_string(), settings.metadata_index.clone()),
        ("es_benchmark_index".to_string(), settings.benchmark_index.clone()),
    ]))
}

/// A single orion run: one configuration, one version.
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub config: &'a Path,
    pub version: &'a str,
    pub lookback: u32,
    pub extra_args: Vec<String>,
}

impl<'a> Invocation<'a> {
    pub fn new(config: &'a Path, version: &'a str, lookback: u32) -> Self {
        Invocation {
            config,
            version,
            lookback,
            extra_args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args.extend(args);
        self
    }
}

/// Run orion for `invocation`. Only a missing data source is an error; every
/// other failure is carried by the returned [`ProcessResult`].
pub async fn run_orion(
    settings: &Settings,
    invocation: Invocation<'_>,
) -> Result<ProcessResult, SettingsError> {
    let env = orion_env(settings, invocation.version)?;
    let mut args = analysis_args(invocation.config, invocation.lookback);
    args.extend(invocation.extra_args);
    let command = orion_command(settings, args);
    let result = run_command(&command, &env, false, settings.timeout()).await;
    debug!(
        "orion for {} ({}) returned {}",
        config_display_name(invocation.config),
        invocation.version,
        result.exit_code()
    );
    Ok(result)
}

/// Basename of a configuration path, for display.
pub fn config_display_name(config: &Path) -> String {
    config
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| config.display().to_string())
}
