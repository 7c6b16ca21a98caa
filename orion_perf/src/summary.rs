//! Normalization of orion's JSON output into per-metric time series.
//!
//! Orion prints one record per run:
//!
//! ```json
//! [
//!   {"timestamp": 1718000000, "metrics": {"podReadyLatency": {"value": 2100.0}}},
//!   {"timestamp": 1718086400, "metrics": {"podReadyLatency": {"value": null}}}
//! ]
//! ```
//!
//! [`summarize`] folds these records into a [`MetricSummary`]: one ordered list
//! of values per metric plus the timestamp of the latest run. A `null` value
//! is kept as an absent placeholder so that every list stays aligned with the
//! run order.

use log::{trace, warn};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::process::ProcessResult;

/// Reserved key holding the latest run timestamp in the serialized summary.
pub const TIMESTAMP_KEY: &str = "timestamp";

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("Error : {0}")]
    Json(#[from] serde_json::Error),

    #[error("Error : expected a JSON array of runs, found {0}")]
    NotAnArray(&'static str),

    #[error("Error : run {index} is missing '{key}'")]
    MissingKey { index: usize, key: String },

    #[error("Error : value of metric '{metric}' is not a number: {value}")]
    InvalidValue { metric: String, value: String },

    #[error("Error : no delimiter line found in orion output")]
    NoDelimiter,

    #[error("Error : no JSON payload after the delimiter line")]
    EmptyPayload,
}

/// Values of one metric in run order; `None` marks a run without a value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSeries {
    pub value: Vec<Option<f64>>,
}

impl MetricSeries {
    /// Present values only, in run order.
    pub fn present(&self) -> impl Iterator<Item = f64> + '_ {
        self.value.iter().flatten().copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSummary {
    timestamp: Option<String>,
    metrics: Vec<(String, MetricSeries)>,
}

impl MetricSummary {
    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    pub fn set_timestamp(&mut self, timestamp: impl Into<String>) {
        self.timestamp = Some(timestamp.into());
    }

    /// True if no metric was recorded, regardless of the timestamp.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn get(&self, metric: &str) -> Option<&MetricSeries> {
        self.metrics
            .iter()
            .find(|(name, _)| name == metric)
            .map(|(_, series)| series)
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricSeries)> {
        self.metrics
            .iter()
            .map(|(name, series)| (name.as_str(), series))
    }

    /// Append a value to `metric`, creating the series on first occurrence.
    pub fn push_value(&mut self, metric: &str, value: Option<f64>) {
        match self.metrics.iter_mut().find(|(name, _)| name == metric) {
            Some((_, series)) => series.value.push(value),
            None => self.metrics.push((
                metric.to_string(),
                MetricSeries { value: vec![value] },
            )),
        }
    }
}

impl Serialize for MetricSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.metrics.len() + usize::from(self.timestamp.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(timestamp) = &self.timestamp {
            map.serialize_entry(TIMESTAMP_KEY, timestamp)?;
        }
        for (name, series) in &self.metrics {
            map.serialize_entry(name, &serde_json::json!({ "value": series.value }))?;
        }
        map.end()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn timestamp_text(timestamp: &Value) -> String {
    match timestamp {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn metric_value(metric: &str, value: &Value) -> Result<Option<f64>, SummaryError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        other => Err(SummaryError::InvalidValue {
            metric: metric.to_string(),
            value: other.to_string(),
        }),
    }
}

/// Summarize a JSON array of runs, keeping only `isolate` if given.
pub fn summarize_json(payload: &str, isolate: Option<&str>) -> Result<MetricSummary, SummaryError> {
    let runs = match serde_json::from_str(payload)? {
        Value::Array(runs) => runs,
        other => return Err(SummaryError::NotAnArray(json_kind(&other))),
    };

    let mut summary = MetricSummary::default();

    for (index, run) in runs.iter().enumerate() {
        let missing = |key: &str| SummaryError::MissingKey {
            index,
            key: key.to_string(),
        };

        let metrics = run
            .get("metrics")
            .and_then(Value::as_object)
            .ok_or_else(|| missing("metrics"))?;

        // Runs without metrics leave the timestamp alone
        if !metrics.is_empty() {
            let timestamp = run.get(TIMESTAMP_KEY).ok_or_else(|| missing(TIMESTAMP_KEY))?;
            summary.set_timestamp(timestamp_text(timestamp));
        }

        for (name, data) in metrics {
            if isolate.is_some_and(|wanted| wanted != name.as_str()) {
                trace!("Skipping {name} because it is not {}", isolate.unwrap_or_default());
                continue;
            }
            if name == TIMESTAMP_KEY {
                warn!("Ignoring metric named '{TIMESTAMP_KEY}', the key is reserved");
                continue;
            }
            let value = data
                .get("value")
                .ok_or_else(|| missing(&format!("metrics.{name}.value")))?;
            summary.push_value(name, metric_value(name, value)?);
        }
    }

    Ok(summary)
}

/// Summarize the JSON printed by an orion invocation.
pub fn summarize(result: &ProcessResult, isolate: Option<&str>) -> Result<MetricSummary, SummaryError> {
    summarize_json(result.stdout(), isolate)
}

/// Return the text following the first line whose trimmed content starts with `=`.
pub fn extract_delimited_payload(text: &str) -> Result<&str, SummaryError> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        offset += line.len();
        if line.trim().starts_with('=') {
            let payload = text[offset..].trim();
            if payload.is_empty() {
                return Err(SummaryError::EmptyPayload);
            }
            return Ok(payload);
        }
    }
    Err(SummaryError::NoDelimiter)
}

/// Summarize orion output where the JSON follows a human readable header
/// terminated by a `=====` line.
pub fn summarize_delimited(
    result: &ProcessResult,
    isolate: Option<&str>,
) -> Result<MetricSummary, SummaryError> {
    let payload = extract_delimited_payload(result.stdout())?;
    summarize_json(payload, isolate)
}
