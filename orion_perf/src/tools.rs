//! The analysis tools offered to callers.
//!
//! Every tool is stateless: it launches orion for the configurations or
//! versions it needs, normalizes the output, and answers with a list of
//! [`ToolResponse`]s. Orion failures and unparsable output are answered with
//! text; only missing settings abort a tool with an error.

use std::path::PathBuf;

use anyhow::Result;
use futures::future::join_all;
use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;

use crate::{
    charts::{self, Chart, EncodedImage, SeriesCollection},
    config::Settings,
    orion::{config_display_name, pr_analysis_args, run_orion, Invocation},
    process::{Outcome, ProcessResult},
    regression::{extract_details, RegressionDetail},
    stats::{aggregate_measurements, pearson},
    summary::{summarize, summarize_delimited},
    tabular::to_rows,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolResponse {
    /// Base64 encoded image.
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Text { value: String },
}

impl ToolResponse {
    pub fn text(value: impl Into<String>) -> Self {
        ToolResponse::Text {
            value: value.into(),
        }
    }
}

impl From<EncodedImage> for ToolResponse {
    fn from(image: EncodedImage) -> Self {
        ToolResponse::Image {
            data: image.data,
            mime_type: image.mime_type.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ToolOutput {
    pub responses: Vec<ToolResponse>,
    /// Models of the rendered charts, in the order of the image responses.
    pub charts: Vec<Chart>,
}

impl ToolOutput {
    fn text(value: impl Into<String>) -> Self {
        ToolOutput {
            responses: vec![ToolResponse::text(value)],
            charts: Vec::new(),
        }
    }

    async fn with_charts(charts: Vec<Chart>) -> Result<Self> {
        let images = charts::encode_all(charts.clone()).await?;
        Ok(ToolOutput {
            responses: images.into_iter().map(ToolResponse::from).collect(),
            charts,
        })
    }

    fn push_text(&mut self, value: impl Into<String>) {
        self.responses.push(ToolResponse::text(value));
    }
}

fn failure_text(name: &str, result: &ProcessResult) -> String {
    format!("{name}: orion {}", result.diagnostic())
}

fn indented(lines: &[String]) -> String {
    lines.iter().map(|line| format!("  {line}")).join("\n")
}

fn regression_report(
    version: &str,
    evaluated: usize,
    regressions: &[(String, Vec<RegressionDetail>)],
) -> String {
    if regressions.is_empty() {
        return format!("No regressions found for version {version} in {evaluated} configurations");
    }

    let mut report = format!(
        "Regressions found for version {version} in {} of {evaluated} configurations",
        regressions.len()
    );
    for (name, details) in regressions {
        report.push_str(&format!("\n{name}:"));
        if details.is_empty() {
            report.push_str("\n  changepoint reported without details");
        }
        for line in details.iter().flat_map(|d| {
            d.to_string()
                .lines()
                .map(str::to_string)
                .collect::<Vec<_>>()
        }) {
            report.push_str(&format!("\n  {line}"));
        }
    }
    report
}

pub struct Tools {
    settings: Settings,
    configs: Vec<PathBuf>,
}

impl Tools {
    pub fn new(settings: Settings, configs: Vec<PathBuf>) -> Self {
        Tools { settings, configs }
    }

    /// Resolve the configuration list once from `settings`.
    pub fn from_settings(settings: Settings) -> Self {
        let configs = settings.resolve_configs();
        info!("Using {} orion configurations", configs.len());
        Tools::new(settings, configs)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn configs(&self) -> &[PathBuf] {
        &self.configs
    }

    fn outcome(&self, result: &ProcessResult) -> Outcome {
        result.outcome(self.settings.changepoint_exit_code)
    }

    /// Run every configuration concurrently. Results keep configuration order.
    async fn run_all(&self, version: &str, lookback: u32) -> Result<Vec<(String, ProcessResult)>> {
        self.settings.data_source()?;

        let runs = join_all(
            self.configs
                .iter()
                .map(|config| run_orion(&self.settings, Invocation::new(config, version, lookback))),
        )
        .await;

        self.configs
            .iter()
            .map(|config| config_display_name(config))
            .zip(runs)
            .map(|(name, run)| -> Result<(String, ProcessResult)> { Ok((name, run?)) })
            .collect()
    }

    pub fn data_source(&self) -> Result<ToolOutput> {
        Ok(ToolOutput::text(self.settings.data_source()?))
    }

    pub fn list_configs(&self) -> ToolOutput {
        if self.configs.is_empty() {
            return ToolOutput::text("No orion configurations found");
        }
        ToolOutput::text(
            self.configs
                .iter()
                .map(|config| config_display_name(config))
                .join("\n"),
        )
    }

    /// Metric names each configuration reports for the default version.
    pub async fn list_metrics(&self) -> Result<ToolOutput> {
        let runs = self
            .run_all(&self.settings.default_version, self.settings.default_lookback)
            .await?;

        let lines = runs
            .iter()
            .map(|(name, result)| {
                if self.outcome(result) == Outcome::ExecutionError {
                    return failure_text(name, result);
                }
                match summarize(result, None) {
                    Ok(summary) if summary.is_empty() => format!("{name}: no metrics"),
                    Ok(summary) => format!("{name}: {}", summary.metric_names().join(", ")),
                    Err(e) => format!("{name}: {e}"),
                }
            })
            .join("\n");

        Ok(ToolOutput::text(lines))
    }

    /// One chart per configuration and metric. The first failing
    /// configuration turns the answer into its diagnostic.
    pub async fn detailed_performance(&self, version: &str, lookback: u32) -> Result<ToolOutput> {
        let runs = self.run_all(version, lookback).await?;

        let mut batch = Vec::with_capacity(runs.len());
        for (name, result) in runs {
            if self.outcome(&result) == Outcome::ExecutionError {
                warn!("orion failed for {name}: {}", result.diagnostic());
                return Ok(ToolOutput::text(failure_text(&name, &result)));
            }
            match summarize(&result, None) {
                Ok(summary) => batch.push((name, summary)),
                Err(e) => return Ok(ToolOutput::text(format!("{name}: {e}"))),
            }
        }

        let charts = charts::single_series_charts(&to_rows(&batch));
        if charts.is_empty() {
            return Ok(ToolOutput::text(format!(
                "No performance data found for version {version} in the last {lookback} days"
            )));
        }
        ToolOutput::with_charts(charts).await
    }

    /// Changepoints across all configurations. Configurations orion could not
    /// evaluate are listed in a separate diagnostics response.
    pub async fn has_regressed(&self, version: &str, lookback: u32) -> Result<ToolOutput> {
        let runs = self.run_all(version, lookback).await?;

        let mut regressions = Vec::new();
        let mut diagnostics = Vec::new();
        for (name, result) in &runs {
            match self.outcome(result) {
                Outcome::NoChange => {}
                Outcome::ChangeDetected => match extract_details(result.stdout()) {
                    Ok(details) => regressions.push((name.clone(), details)),
                    Err(e) => diagnostics.push(format!("{name}: {e}")),
                },
                Outcome::ExecutionError => diagnostics.push(failure_text(name, result)),
            }
        }

        let mut output = ToolOutput::text(regression_report(version, runs.len(), &regressions));
        if !diagnostics.is_empty() {
            output.push_text(format!("Diagnostics:\n{}", indented(&diagnostics)));
        }
        Ok(output)
    }

    /// Overlay `metric` of one configuration across `versions`.
    pub async fn performance_trend(
        &self,
        versions: &[String],
        metric: &str,
        config: &str,
        lookback: u32,
    ) -> Result<ToolOutput> {
        let config_path = self.settings.config_path(config)?;
        self.settings.data_source()?;

        let runs = join_all(versions.iter().map(|version| {
            run_orion(&self.settings, Invocation::new(&config_path, version, lookback))
        }))
        .await;

        let mut collection = SeriesCollection::default();
        let mut missing = Vec::new();
        for (version, run) in versions.iter().zip(runs) {
            let result = run?;
            if self.outcome(&result) == Outcome::ExecutionError {
                missing.push(format!("{version}: orion {}", result.diagnostic()));
                continue;
            }
            match summarize(&result, Some(metric)) {
                Ok(summary) => match summary.get(metric) {
                    Some(series) if series.present().next().is_some() => {
                        collection.insert(version.as_str(), series.value.iter().copied())
                    }
                    _ => missing.push(format!("{version}: no data for {metric}")),
                },
                Err(e) => missing.push(format!("{version}: {e}")),
            }
        }

        let name = config_display_name(&config_path);
        if collection.is_empty() {
            return Ok(ToolOutput::text(format!(
                "No data for {metric} in {name} for versions {}:\n{}",
                versions.join(", "),
                indented(&missing)
            )));
        }

        let chart = charts::multi_series_chart(&collection, metric, &format!("{name}: "))?;
        let mut output = ToolOutput::with_charts(vec![chart]).await?;
        if !missing.is_empty() {
            output.push_text(format!("Versions without {metric}:\n{}", indented(&missing)));
        }
        Ok(output)
    }

    /// Scatter `metric1` against `metric2` and report their Pearson
    /// correlation. Runs missing either value are left out.
    pub async fn metrics_correlation(
        &self,
        metric1: &str,
        metric2: &str,
        config: &str,
        version: &str,
        lookback: u32,
    ) -> Result<ToolOutput> {
        let config_path = self.settings.config_path(config)?;
        let result = run_orion(&self.settings, Invocation::new(&config_path, version, lookback)).await?;
        let name = config_display_name(&config_path);

        if self.outcome(&result) == Outcome::ExecutionError {
            return Ok(ToolOutput::text(failure_text(&name, &result)));
        }
        let summary = match summarize(&result, None) {
            Ok(summary) => summary,
            Err(e) => return Ok(ToolOutput::text(format!("{name}: {e}"))),
        };

        let (Some(series1), Some(series2)) = (summary.get(metric1), summary.get(metric2)) else {
            let absent = [metric1, metric2]
                .into_iter()
                .filter(|m| summary.get(m).is_none())
                .join(", ");
            return Ok(ToolOutput::text(format!("{name} does not report {absent}")));
        };

        let (values1, values2): (Vec<f64>, Vec<f64>) = series1
            .value
            .iter()
            .zip(&series2.value)
            .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
            .unzip();

        let pairs = values1.len();
        if pairs < 2 {
            return Ok(ToolOutput::text(format!(
                "Not enough paired samples ({pairs}) to correlate {metric1} and {metric2} in {name}"
            )));
        }

        let r = pearson(&values1, &values2);
        let chart = charts::correlation_chart(&values1, &values2, metric1, metric2, &format!("{name}: "));
        let mut output = ToolOutput::with_charts(vec![chart]).await?;
        if r.is_nan() {
            output.push_text(format!(
                "Pearson correlation between {metric1} and {metric2} in {name} is undefined: one of the metrics is constant (n = {pairs})"
            ));
        } else {
            output.push_text(format!(
                "Pearson correlation between {metric1} and {metric2} in {name}: r = {r:.3} (n = {pairs})"
            ));
        }
        Ok(output)
    }

    /// Latest value and distribution of every metric of a pull request run.
    pub async fn pr_performance(
        &self,
        organization: &str,
        repository: &str,
        pull_request: u64,
        config: &str,
        version: &str,
        lookback: u32,
    ) -> Result<ToolOutput> {
        let config_path = self.settings.config_path(config)?;
        let invocation = Invocation::new(&config_path, version, lookback)
            .with_args(pr_analysis_args(organization, repository, pull_request));
        let result = run_orion(&self.settings, invocation).await?;
        let name = config_display_name(&config_path);

        if self.outcome(&result) == Outcome::ExecutionError {
            return Ok(ToolOutput::text(failure_text(&name, &result)));
        }
        let summary = match summarize_delimited(&result, None) {
            Ok(summary) => summary,
            Err(e) => return Ok(ToolOutput::text(format!("{name}: {e}"))),
        };

        let header = format!(
            "Performance of {organization}/{repository}#{pull_request} with {name} (version {version})"
        );
        if summary.is_empty() {
            return Ok(ToolOutput::text(format!("{header}: no metrics reported")));
        }

        let lines = summary
            .iter()
            .map(|(metric, series)| {
                let present: Vec<f64> = series.present().collect();
                match present.last() {
                    Some(latest) => format!(
                        "  {metric}: latest {latest}, {}",
                        aggregate_measurements(present.iter())
                    ),
                    None => format!("  {metric}: no values"),
                }
            })
            .join("\n");

        Ok(ToolOutput::text(format!("{header}\n{lines}")))
    }
}
